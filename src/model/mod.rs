pub mod auth;
pub mod candidate;
pub mod mongodb;
pub mod user;
