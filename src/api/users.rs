use log::info;
use mongodb::bson::doc;
use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::{
        auth::{AuthToken, Identity},
        mongodb::{Coll, Id},
        user::{
            LoginRequest, NewUser, PasswordChangeRequest, Role, SignupRequest, User, UserProfile,
        },
    },
    Config,
};

use super::Message;

pub fn routes() -> Vec<Route> {
    routes![signup, login, profile, change_password]
}

#[post("/users/signup", data = "<request>", format = "json")]
async fn signup(
    request: Json<SignupRequest>,
    users: Coll<User>,
    new_users: Coll<NewUser>,
    config: &State<Config>,
) -> Result<Json<SignupResponse>> {
    let request = request.0;

    // Pre-checks for friendly error messages. Under a race these are not
    // authoritative; the unique indexes are, and a losing insert surfaces
    // as a duplicate-key error below.
    if request.role == Role::Admin {
        let existing_admin = users.find_one(doc! { "role": "admin" }, None).await?;
        if existing_admin.is_some() {
            return Err(Error::BadRequest(
                "An admin already exists; only one admin may exist".to_string(),
            ));
        }
    }
    let with_national_id = doc! { "national_id": &request.national_id };
    if users.find_one(with_national_id, None).await?.is_some() {
        return Err(Error::BadRequest(
            "National ID already registered".to_string(),
        ));
    }

    // Validates the request and hashes the password.
    let new_user = NewUser::try_from(request)?;

    let new_id: Id = match new_users.insert_one(&new_user, None).await {
        Ok(result) => result
            .inserted_id
            .as_object_id()
            .unwrap() // Safe because the ID comes directly from the database.
            .into(),
        Err(err) => {
            let err = Error::from(err);
            if err.is_duplicate_key() {
                // Lost a race against a concurrent signup.
                return Err(Error::BadRequest(
                    "National ID or admin role already taken".to_string(),
                ));
            }
            return Err(err);
        }
    };
    info!("New {} signed up with ID {}", new_user.role, new_id);

    // Read back the full record and log the new user straight in.
    let user = users
        .find_one(new_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {new_id}")))?;
    let token = AuthToken::new(new_id).into_bearer(config);

    Ok(Json(SignupResponse {
        user: user.into(),
        token,
    }))
}

#[post("/users/login", data = "<credentials>", format = "json")]
async fn login(
    credentials: Json<LoginRequest>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<Json<TokenResponse>> {
    let (national_id, password) = credentials.require()?;

    let with_national_id = doc! { "national_id": national_id };
    // The same error for an unknown ID and a wrong password, so a caller
    // cannot probe which national IDs are registered.
    let user = users
        .find_one(with_national_id, None)
        .await?
        .filter(|user| user.verify_password(password))
        .ok_or_else(|| Error::Unauthorized("Invalid national ID or password".to_string()))?;

    let token = AuthToken::new(user.id).into_bearer(config);
    Ok(Json(TokenResponse { token }))
}

#[get("/users/profile")]
async fn profile(identity: Identity, users: Coll<User>) -> Result<Json<UserProfile>> {
    let user = users
        .find_one(identity.id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {}", identity.id)))?;
    Ok(Json(user.into()))
}

#[put("/users/profile/password", data = "<request>", format = "json")]
async fn change_password(
    identity: Identity,
    request: Json<PasswordChangeRequest>,
    users: Coll<User>,
) -> Result<Json<Message>> {
    let (current_password, new_password) = request.require()?;

    let mut user = users
        .find_one(identity.id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {}", identity.id)))?;
    if !user.verify_password(current_password) {
        return Err(Error::Unauthorized("Invalid current password".to_string()));
    }

    user.set_password(new_password);
    let update = doc! { "$set": { "password_hash": &user.password_hash } };
    users.update_one(identity.id.as_doc(), update, None).await?;
    info!("User {} changed their password", identity.id);

    Ok(Json(Message::new("Password updated")))
}

/// Successful signup: the created user (hash omitted) plus a token for them.
#[derive(Debug, Serialize, Deserialize)]
struct SignupResponse {
    user: UserProfile,
    token: String,
}

/// Successful login.
#[derive(Debug, Serialize, Deserialize)]
struct TokenResponse {
    token: String,
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        serde::json::json,
    };

    use crate::testing;

    use super::*;

    #[rocket::async_test]
    async fn second_admin_signup_conflict() {
        let (client, db) = match testing::client_and_db().await {
            Some(pair) => pair,
            None => return,
        };

        assert!(testing::signup(&client, &SignupRequest::example_admin())
            .await
            .is_some());

        // A second admin must be rejected even with a fresh national ID.
        let mut rival = SignupRequest::example_admin();
        rival.national_id = "111122223333".to_string();
        let response = client
            .post("/users/signup")
            .header(ContentType::JSON)
            .body(json!(rival).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        // Exactly one admin stored.
        let users = Coll::<User>::from_db(&db);
        let admins = users
            .count_documents(doc! { "role": "admin" }, None)
            .await
            .unwrap();
        assert_eq!(1, admins);

        db.drop(None).await.unwrap();
    }

    #[rocket::async_test]
    async fn duplicate_national_id_conflict() {
        let (client, db) = match testing::client_and_db().await {
            Some(pair) => pair,
            None => return,
        };

        assert!(testing::signup(&client, &SignupRequest::example())
            .await
            .is_some());

        let response = client
            .post("/users/signup")
            .header(ContentType::JSON)
            .body(json!(SignupRequest::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        let users = Coll::<User>::from_db(&db);
        let registered = users
            .count_documents(
                doc! { "national_id": &SignupRequest::example().national_id },
                None,
            )
            .await
            .unwrap();
        assert_eq!(1, registered);

        db.drop(None).await.unwrap();
    }

    #[rocket::async_test]
    async fn login_round_trip() {
        let (client, db) = match testing::client_and_db().await {
            Some(pair) => pair,
            None => return,
        };

        let request = SignupRequest::example();
        testing::signup(&client, &request).await.unwrap();

        // Correct credentials: token works against an authenticated route.
        let response = client
            .post("/users/login")
            .header(ContentType::JSON)
            .body(
                json!({ "national_id": &request.national_id, "password": &request.password })
                    .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        // Wrong password and unknown ID fail identically.
        let wrong_password = client
            .post("/users/login")
            .header(ContentType::JSON)
            .body(json!({ "national_id": &request.national_id, "password": "nope" }).to_string())
            .dispatch()
            .await;
        let unknown_id = client
            .post("/users/login")
            .header(ContentType::JSON)
            .body(
                json!({ "national_id": "000000000001", "password": &request.password }).to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, wrong_password.status());
        assert_eq!(Status::Unauthorized, unknown_id.status());
        assert_eq!(
            wrong_password.into_string().await,
            unknown_id.into_string().await
        );

        db.drop(None).await.unwrap();
    }
}
