use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::mongodb::Id;

/// An authentication token representing a specific user.
///
/// Only the subject ID is embedded; the user's role is resolved against the
/// store on every request, so a role change takes effect immediately rather
/// than at token expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    #[serde(rename = "sub")]
    pub id: Id,
}

impl AuthToken {
    /// Create a new [`AuthToken`] for the given user.
    pub fn new(id: Id) -> Self {
        Self { id }
    }

    /// Serialize into a signed bearer token with the configured lifetime.
    pub fn into_bearer(self, config: &Config) -> String {
        self.into_bearer_at(Utc::now() + config.auth_ttl(), config)
    }

    /// Verify a bearer token's signature and expiry, and deserialize it.
    pub fn from_bearer(token: &str, config: &Config) -> Result<Self, Error> {
        let data: TokenData<Claims> = jsonwebtoken::decode(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )?;
        Ok(data.claims.token)
    }

    fn into_bearer_at(self, expire_at: DateTime<Utc>, config: &Config) -> String {
        let claims = Claims {
            token: self,
            expire_at,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .expect("JWT encoding is infallible with default settings")
    }
}

/// Token claims: the subject plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    token: AuthToken,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}
