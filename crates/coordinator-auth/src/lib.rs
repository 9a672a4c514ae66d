//! Credential Validator (component C2): static-table and stateless HMAC
//! bearer tokens, a short-lived positive cache, and per-source rate
//! limiting of failed validation attempts.

pub mod error;
pub mod rate_limit;
pub mod types;
pub mod validator;

pub use error::AuthError;
pub use rate_limit::FailureLimiter;
pub use types::{Principal, StaticTokenTable, TokenEntry};
pub use validator::CredentialValidator;
