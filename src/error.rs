use std::io::Cursor;

use argon2::Error as Argon2Error;
use jsonwebtoken::errors::Error as JwtError;
use log::{error, warn};
use mongodb::error::{Error as DbError, ErrorKind as DbErrorKind, WriteFailure};
use rocket::{
    http::{ContentType, Status},
    response::Responder,
    serde::json::serde_json::json,
    Request, Response,
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// MongoDB's error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl Error {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    /// Was this caused by a unique index rejecting a write?
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            Self::Db(err) => match err.kind.as_ref() {
                DbErrorKind::Write(WriteFailure::WriteError(write_err)) => {
                    write_err.code == DUPLICATE_KEY
                }
                _ => false,
            },
            _ => false,
        }
    }

    fn status(&self) -> Status {
        match self {
            Self::BadRequest(_) => Status::BadRequest,
            Self::Unauthorized(_) | Self::Jwt(_) => Status::Unauthorized,
            Self::Forbidden(_) => Status::Forbidden,
            Self::NotFound(_) => Status::NotFound,
            Self::Conflict(_) => Status::Conflict,
            Self::Db(_) | Self::Argon2(_) => Status::InternalServerError,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    /// Convert into `status` + JSON `{"error": message}`, logging internal
    /// failures and leaking no detail about them to the caller.
    fn respond_to(self, _: &'r Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        let message = match &self {
            Self::Db(err) => {
                error!("Database failure: {err}");
                "Internal server error".to_string()
            }
            Self::Argon2(err) => {
                error!("Password hashing failure: {err}");
                "Internal server error".to_string()
            }
            Self::Jwt(err) => {
                warn!("Rejected token: {err}");
                "Invalid or expired token".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({ "error": message }).to_string();
        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}
