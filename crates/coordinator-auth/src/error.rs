//! Validator-local error type, converted to `CoordError` at the HTTP boundary.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("unknown token")]
    UnknownToken,
    #[error("token expired")]
    Expired,
    #[error("token disabled")]
    Disabled,
    #[error("malformed credential")]
    Malformed,
    #[error("rate limited")]
    RateLimited,
}

impl From<AuthError> for coordinator_core::CoordError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::RateLimited => coordinator_core::CoordError::Overloaded(e.to_string()),
            _ => coordinator_core::CoordError::Unauthenticated(e.to_string()),
        }
    }
}
