use std::fmt::Display;
use std::ops::{Deref, DerefMut};

use argon2::Config as HashConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::mongodb::Id;

/// Length of a valid national ID.
pub const NATIONAL_ID_LENGTH: usize = 12;

/// What a user is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Voter,
}

impl Default for Role {
    fn default() -> Self {
        Self::Voter
    }
}

impl Display for Role {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Admin => "admin",
                Self::Voter => "voter",
            }
        )
    }
}

/// Core user data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCore {
    /// Unique 12-digit national ID.
    pub national_id: String,
    /// Argon2-encoded password hash; the plaintext is never stored.
    pub password_hash: String,
    pub role: Role,
    /// Set once true when the user casts their vote, never reset.
    pub has_voted: bool,
    pub name: String,
    pub age: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserCore {
    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        // Hashes are only ever written via `TryFrom<SignupRequest>` or
        // `set_password`, so a malformed one means the stored record was
        // tampered with; fail closed rather than panic.
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap_or(false)
    }

    /// Replace the stored hash with one of the given password.
    pub fn set_password(&mut self, password: &str) {
        self.password_hash = hash_password(password);
    }
}

/// A user without an ID.
pub type NewUser = UserCore;

/// A user from the database, with their unique ID.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub user: UserCore,
}

impl Deref for User {
    type Target = UserCore;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl DerefMut for User {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.user
    }
}

/// Raw signup data, received from a user. Never stored directly, since the
/// password is in plaintext.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignupRequest {
    pub national_id: String,
    pub password: String,
    pub name: String,
    pub age: u32,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Role,
}

impl TryFrom<SignupRequest> for NewUser {
    type Error = Error;

    /// Convert a [`SignupRequest`] to a new [`User`] by hashing the password.
    /// This enforces the national ID format and that the password is non-empty.
    fn try_from(request: SignupRequest) -> Result<Self, Self::Error> {
        if !is_valid_national_id(&request.national_id) {
            return Err(Error::BadRequest(format!(
                "National ID must be exactly {NATIONAL_ID_LENGTH} digits"
            )));
        }
        if request.password.is_empty() {
            return Err(Error::BadRequest("Password must not be empty".to_string()));
        }

        Ok(Self {
            national_id: request.national_id,
            password_hash: hash_password(&request.password),
            role: request.role,
            has_voted: false,
            name: request.name,
            age: request.age,
            email: request.email,
        })
    }
}

/// Is this a well-formed national ID, i.e. exactly 12 ASCII digits?
pub fn is_valid_national_id(id: &str) -> bool {
    id.len() == NATIONAL_ID_LENGTH && id.bytes().all(|b| b.is_ascii_digit())
}

/// Hash a password with a fresh random salt.
fn hash_password(password: &str) -> String {
    // 16 bytes is recommended for password hashing:
    //  https://en.wikipedia.org/wiki/Argon2
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill(&mut salt);
    argon2::hash_encoded(password.as_bytes(), &salt, &HashConfig::default()).unwrap() // Safe because the default `Config` is valid.
}

/// Raw login credentials. Fields are optional at the serde level so that an
/// absent field reports the same validation failure as an empty one, rather
/// than dying in deserialization.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginRequest {
    pub national_id: Option<String>,
    pub password: Option<String>,
}

impl LoginRequest {
    /// Both fields are required; absent and empty are the same failure.
    pub fn require(&self) -> Result<(&str, &str), Error> {
        match (self.national_id.as_deref(), self.password.as_deref()) {
            (Some(id), Some(password)) if !id.is_empty() && !password.is_empty() => {
                Ok((id, password))
            }
            _ => Err(Error::BadRequest(
                "Both national_id and password are required".to_string(),
            )),
        }
    }
}

/// A password change for the authenticated user. Optional fields for the
/// same reason as [`LoginRequest`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PasswordChangeRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

impl PasswordChangeRequest {
    /// Both fields are required; absent and empty are the same failure.
    pub fn require(&self) -> Result<(&str, &str), Error> {
        match (self.current_password.as_deref(), self.new_password.as_deref()) {
            (Some(current), Some(new)) if !current.is_empty() && !new.is_empty() => {
                Ok((current, new))
            }
            _ => Err(Error::BadRequest(
                "Both current_password and new_password are required".to_string(),
            )),
        }
    }
}

/// A user as returned over the API: everything except the password hash.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Id,
    pub national_id: String,
    pub role: Role,
    pub has_voted: bool,
    pub name: String,
    pub age: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            national_id: user.user.national_id,
            role: user.user.role,
            has_voted: user.user.has_voted,
            name: user.user.name,
            age: user.user.age,
            email: user.user.email,
        }
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl SignupRequest {
        pub fn example() -> Self {
            Self {
                national_id: "123456789012".to_string(),
                password: "correct horse battery staple".to_string(),
                name: "Asha Patel".to_string(),
                age: 34,
                email: Some("asha@example.com".to_string()),
                role: Role::Voter,
            }
        }

        pub fn example_admin() -> Self {
            Self {
                national_id: "999988887777".to_string(),
                password: "hunter2hunter2".to_string(),
                name: "Ravi Kumar".to_string(),
                age: 51,
                email: None,
                role: Role::Admin,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn national_id_format() {
        assert!(is_valid_national_id("123456789012"));
        assert!(is_valid_national_id("000000000000"));
        // Wrong length.
        assert!(!is_valid_national_id("12345678901"));
        assert!(!is_valid_national_id("1234567890123"));
        assert!(!is_valid_national_id(""));
        // Non-digits.
        assert!(!is_valid_national_id("12345678901a"));
        assert!(!is_valid_national_id("1234 6789012"));
        // Unicode digits are not ASCII digits, and multi-byte input must
        // never pass the length check.
        assert!(!is_valid_national_id("１２３４５６７８９０１２"));
    }

    #[test]
    fn signup_validation() {
        assert!(NewUser::try_from(SignupRequest::example()).is_ok());

        let bad_id = SignupRequest {
            national_id: "31337".to_string(),
            ..SignupRequest::example()
        };
        assert!(matches!(
            NewUser::try_from(bad_id),
            Err(Error::BadRequest(_))
        ));

        let empty_password = SignupRequest {
            password: String::new(),
            ..SignupRequest::example()
        };
        assert!(matches!(
            NewUser::try_from(empty_password),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn signup_preserves_requested_role() {
        let admin = NewUser::try_from(SignupRequest::example_admin()).unwrap();
        assert_eq!(admin.role, Role::Admin);

        let voter = NewUser::try_from(SignupRequest::example()).unwrap();
        assert_eq!(voter.role, Role::Voter);
    }

    #[test]
    fn signup_hashes_password() {
        let request = SignupRequest::example();
        let user = NewUser::try_from(request.clone()).unwrap();

        // The plaintext must not appear in the stored record.
        assert_ne!(user.password_hash, request.password);
        assert!(user.password_hash.starts_with("$argon2"));

        // New users have not voted.
        assert!(!user.has_voted);

        assert!(user.verify_password(&request.password));
        assert!(!user.verify_password("wrong password"));
    }

    #[test]
    fn malformed_stored_hash_fails_closed() {
        let mut user = NewUser::try_from(SignupRequest::example()).unwrap();
        user.password_hash = "not-an-argon2-hash".to_string();
        assert!(!user.verify_password(&SignupRequest::example().password));
        assert!(!user.verify_password(""));
    }

    #[test]
    fn login_requires_both_fields() {
        use rocket::serde::json::serde_json;

        let full: LoginRequest =
            serde_json::from_str(r#"{"national_id": "123456789012", "password": "pw"}"#).unwrap();
        assert_eq!(full.require().unwrap(), ("123456789012", "pw"));

        // An absent field is the same failure as an empty one.
        let missing: LoginRequest =
            serde_json::from_str(r#"{"national_id": "123456789012"}"#).unwrap();
        assert!(matches!(missing.require(), Err(Error::BadRequest(_))));

        let empty: LoginRequest =
            serde_json::from_str(r#"{"national_id": "", "password": "pw"}"#).unwrap();
        assert!(matches!(empty.require(), Err(Error::BadRequest(_))));
    }

    #[test]
    fn password_change_requires_both_fields() {
        use rocket::serde::json::serde_json;

        let full: PasswordChangeRequest = serde_json::from_str(
            r#"{"current_password": "old", "new_password": "new"}"#,
        )
        .unwrap();
        assert_eq!(full.require().unwrap(), ("old", "new"));

        let missing: PasswordChangeRequest =
            serde_json::from_str(r#"{"current_password": "old"}"#).unwrap();
        assert!(matches!(missing.require(), Err(Error::BadRequest(_))));

        let empty: PasswordChangeRequest =
            serde_json::from_str(r#"{"current_password": "old", "new_password": ""}"#).unwrap();
        assert!(matches!(empty.require(), Err(Error::BadRequest(_))));
    }

    #[test]
    fn password_change_rehashes() {
        let mut user = NewUser::try_from(SignupRequest::example()).unwrap();
        let old_hash = user.password_hash.clone();

        user.set_password("a brand new passphrase");
        assert_ne!(user.password_hash, old_hash);
        assert!(user.verify_password("a brand new passphrase"));
        assert!(!user.verify_password(&SignupRequest::example().password));
    }

    #[test]
    fn role_serde() {
        use rocket::serde::json::serde_json;

        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(serde_json::to_string(&Role::Voter).unwrap(), "\"voter\"");
        assert_eq!(
            serde_json::from_str::<Role>("\"admin\"").unwrap(),
            Role::Admin
        );
        assert!(serde_json::from_str::<Role>("\"superuser\"").is_err());
    }

    #[test]
    fn role_defaults_to_voter() {
        use rocket::serde::json::serde_json;

        // `role` omitted entirely.
        let request: SignupRequest = serde_json::from_str(
            r#"{
                "national_id": "123456789012",
                "password": "pw",
                "name": "Asha Patel",
                "age": 34
            }"#,
        )
        .unwrap();
        assert_eq!(request.role, Role::Voter);
        assert_eq!(request.email, None);
    }

    #[test]
    fn profile_omits_password_hash() {
        use mongodb::bson::oid::ObjectId;
        use rocket::serde::json::serde_json;

        let user = User {
            id: ObjectId::new().into(),
            user: NewUser::try_from(SignupRequest::example()).unwrap(),
        };
        let profile = UserProfile::from(user);
        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("$argon2"));
    }
}
