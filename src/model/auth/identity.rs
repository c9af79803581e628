use log::{error, warn};
use mongodb::Database;
use rocket::{
    http::Status,
    outcome::try_outcome,
    request::{FromRequest, Outcome},
    Request, State,
};

use crate::config::Config;
use crate::error::Error;
use crate::model::{
    auth::AuthToken,
    mongodb::{Coll, Id},
    user::{Role, User},
};

const AUTHORIZATION_HEADER: &str = "Authorization";
const BEARER_PREFIX: &str = "Bearer ";

/// A verified identity: the bearer token checked out and its subject still
/// exists in the user store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub id: Id,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Identity {
    type Error = Error;

    /// Authenticate the request from its `Authorization: Bearer <token>`
    /// header, resolving the subject against the user store for the current
    /// role. Fails closed: a store failure during lookup denies access
    /// rather than guessing.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` is always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();

        let header = match req.headers().get_one(AUTHORIZATION_HEADER) {
            Some(header) => header,
            None => {
                return Outcome::Failure((
                    Status::Unauthorized,
                    Error::Unauthorized("Missing authorization header".to_string()),
                ))
            }
        };
        let bearer = match header.strip_prefix(BEARER_PREFIX) {
            Some(token) => token.trim(),
            None => {
                return Outcome::Failure((
                    Status::Unauthorized,
                    Error::Unauthorized("Expected a bearer token".to_string()),
                ))
            }
        };

        let token = match AuthToken::from_bearer(bearer, config) {
            Ok(token) => token,
            Err(err) => return Outcome::Failure((Status::Unauthorized, err)),
        };

        // Unwrap is safe as the `Database` is always managed.
        let db = req.guard::<&State<Database>>().await.unwrap();
        let user = Coll::<User>::from_db(db)
            .find_one(token.id.as_doc(), None)
            .await;
        match user {
            Ok(Some(user)) => Outcome::Success(Identity {
                id: user.id,
                role: user.role,
            }),
            Ok(None) => {
                warn!("Valid token for missing user {}", token.id);
                Outcome::Failure((
                    Status::Unauthorized,
                    Error::Unauthorized("Token subject no longer exists".to_string()),
                ))
            }
            Err(err) => {
                error!("Store lookup failed during authentication: {err}");
                Outcome::Failure((Status::InternalServerError, err.into()))
            }
        }
    }
}

/// An [`Identity`] that is guaranteed to hold the admin role.
///
/// Using this as a request guard is the single authorization predicate for
/// admin-only routes; no handler re-implements the role check.
#[derive(Debug, Clone, Copy)]
pub struct AdminIdentity(Identity);

impl AdminIdentity {
    pub fn id(&self) -> Id {
        self.0.id
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminIdentity {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let identity = try_outcome!(req.guard::<Identity>().await);
        if identity.is_admin() {
            Outcome::Success(AdminIdentity(identity))
        } else {
            Outcome::Failure((
                Status::Forbidden,
                Error::Forbidden("You do not have the admin role".to_string()),
            ))
        }
    }
}
