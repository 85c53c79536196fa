use thiserror::Error;

/// Authorization errors raised before any job operation runs.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("User not authenticated")]
    AuthenticationRequired,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Unauthorized")]
    InvalidCronSecret,
}
