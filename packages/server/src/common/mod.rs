// Common types shared across the application

pub mod auth;
pub mod entity_ids;
pub mod id;

pub use auth::{bearer_token, secret_matches, AuthError};
pub use entity_ids::*;
pub use id::Id;
