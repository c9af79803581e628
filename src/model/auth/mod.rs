mod identity;
mod token;

pub use identity::{AdminIdentity, Identity};
pub use token::AuthToken;
