use rocket::{
    http::Status,
    serde::json::{json, Json, Value},
    Catcher, Request, Route,
};
use serde::{Deserialize, Serialize};

mod candidates;
mod users;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(users::routes());
    routes.extend(candidates::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![fallback]
}

/// Render every unhandled error (including request guard failures) in the
/// same JSON shape the route handlers use.
#[catch(default)]
fn fallback(status: Status, _request: &Request) -> Json<Value> {
    Json(json!({ "error": status.reason_lossy() }))
}

/// A human-readable success message.
#[derive(Debug, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
