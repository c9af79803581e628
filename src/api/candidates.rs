use log::info;
use mongodb::{
    bson::{doc, to_bson},
    options::{FindOneAndUpdateOptions, ReturnDocument},
    Client,
};
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        auth::{AdminIdentity, Identity},
        candidate::{Candidate, CandidatePatch, CandidateSpec, CandidateSummary, NewCandidate, VoteRecord},
        mongodb::{Coll, Id},
        user::User,
    },
};

use super::Message;

pub fn routes() -> Vec<Route> {
    routes![
        create_candidate,
        update_candidate,
        delete_candidate,
        list_candidates,
        vote,
    ]
}

#[post("/candidates", data = "<spec>", format = "json")]
async fn create_candidate(
    admin: AdminIdentity,
    spec: Json<CandidateSpec>,
    candidates: Coll<Candidate>,
    new_candidates: Coll<NewCandidate>,
) -> Result<Json<Candidate>> {
    let new_id: Id = new_candidates
        .insert_one(NewCandidate::from(spec.0), None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Safe because the ID comes directly from the database.
        .into();

    let candidate = candidates
        .find_one(new_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Candidate {new_id}")))?;
    info!("Admin {} created candidate {}", admin.id(), new_id);

    Ok(Json(candidate))
}

#[put("/candidates/<candidate_id>", data = "<patch>", format = "json")]
async fn update_candidate(
    admin: AdminIdentity,
    candidate_id: Id,
    patch: Json<CandidatePatch>,
    candidates: Coll<Candidate>,
) -> Result<Json<Candidate>> {
    if patch.is_empty() {
        return Err(Error::BadRequest("No fields to update".to_string()));
    }

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let updated = candidates
        .find_one_and_update(candidate_id.as_doc(), patch.as_update(), options)
        .await?
        .ok_or_else(|| Error::not_found(format!("Candidate {candidate_id}")))?;
    info!("Admin {} updated candidate {}", admin.id(), candidate_id);

    Ok(Json(updated))
}

#[delete("/candidates/<candidate_id>")]
async fn delete_candidate(
    admin: AdminIdentity,
    candidate_id: Id,
    candidates: Coll<Candidate>,
) -> Result<Json<Candidate>> {
    let deleted = candidates
        .find_one_and_delete(candidate_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Candidate {candidate_id}")))?;
    info!("Admin {} deleted candidate {}", admin.id(), candidate_id);

    Ok(Json(deleted))
}

#[get("/candidates")]
async fn list_candidates(candidates: Coll<Candidate>) -> Result<Json<Vec<CandidateSummary>>> {
    let all: Vec<Candidate> = candidates.find(None, None).await?.try_collect().await?;
    Ok(Json(all.into_iter().map(Into::into).collect()))
}

#[get("/candidates/vote/<candidate_id>")]
async fn vote(
    identity: Identity,
    candidate_id: Id,
    users: Coll<User>,
    candidates: Coll<Candidate>,
    db_client: &State<Client>,
) -> Result<Json<Message>> {
    // Admins run the election; they do not take part in it.
    if identity.is_admin() {
        return Err(Error::Forbidden("Admins are not allowed to vote".to_string()));
    }

    let candidate = candidates
        .find_one(candidate_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Candidate {candidate_id}")))?;

    // All three vote effects (vote record, vote count, has-voted flag) land
    // in one transaction. The flag is checked and set by a single
    // conditional update, so two concurrent votes by the same user cannot
    // both succeed.
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    let not_yet_voted = doc! { "_id": *identity.id, "has_voted": false };
    let set_voted = doc! { "$set": { "has_voted": true } };
    let claimed = users
        .find_one_and_update_with_session(not_yet_voted, set_voted, None, &mut session)
        .await?;
    if claimed.is_none() {
        session.abort_transaction().await?;
        // Distinguish a vanished user from a double vote.
        return Err(match users.find_one(identity.id.as_doc(), None).await? {
            Some(_) => Error::Conflict("You have already voted".to_string()),
            None => Error::not_found(format!("User {}", identity.id)),
        });
    }

    let vote = VoteRecord::new(identity.id);
    let record_vote = doc! {
        "$push": { "votes": to_bson(&vote).expect("Serialisation is infallible") },
        "$inc": { "vote_count": 1 },
    };
    let result = candidates
        .update_one_with_session(candidate.id.as_doc(), record_vote, None, &mut session)
        .await?;
    if result.matched_count == 0 {
        // The candidate was deleted between our read and the write.
        session.abort_transaction().await?;
        return Err(Error::not_found(format!("Candidate {candidate_id}")));
    }

    session.commit_transaction().await?;
    info!("User {} voted for candidate {}", identity.id, candidate_id);

    Ok(Json(Message::new("Voted successfully")))
}
