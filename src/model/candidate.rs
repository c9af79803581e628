use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// A single cast vote: which user voted, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter: Id,
    pub voted_at: DateTime<Utc>,
}

impl VoteRecord {
    pub fn new(voter: Id) -> Self {
        Self {
            voter,
            voted_at: Utc::now(),
        }
    }
}

/// Core candidate data, as stored in the database.
///
/// Invariant: `vote_count` always equals `votes.len()`. Both are only ever
/// mutated together, in a single `$push` + `$inc` document update.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCore {
    pub name: String,
    pub party: String,
    pub votes: Vec<VoteRecord>,
    pub vote_count: u32,
}

/// A candidate without an ID.
pub type NewCandidate = CandidateCore;

/// A candidate from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}

impl DerefMut for Candidate {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.candidate
    }
}

/// Admin-suppliable candidate data; everything except the vote state.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CandidateSpec {
    pub name: String,
    pub party: String,
}

impl From<CandidateSpec> for NewCandidate {
    /// A freshly created candidate has no votes.
    fn from(spec: CandidateSpec) -> Self {
        Self {
            name: spec.name,
            party: spec.party,
            votes: Vec::new(),
            vote_count: 0,
        }
    }
}

/// Field updates for an existing candidate. Vote data is not patchable.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CandidatePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub party: Option<String>,
}

impl CandidatePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.party.is_none()
    }

    /// Build the `$set` update document for the supplied fields.
    pub fn as_update(&self) -> Document {
        let mut set = Document::new();
        if let Some(ref name) = self.name {
            set.insert("name", name.as_str());
        }
        if let Some(ref party) = self.party {
            set.insert("party", party.as_str());
        }
        doc! { "$set": set }
    }
}

/// The public view of a candidate: name and party only, never vote data
/// or voter references.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub name: String,
    pub party: String,
}

impl From<Candidate> for CandidateSummary {
    fn from(candidate: Candidate) -> Self {
        Self {
            name: candidate.candidate.name,
            party: candidate.candidate.party,
        }
    }
}
