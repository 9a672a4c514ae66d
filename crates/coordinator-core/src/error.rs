//! Coordinator-wide error taxonomy (spec §7).
//!
//! Every HTTP-facing error ultimately becomes a [`CoordError`] so handlers
//! have one place to map `kind` -> HTTP status. Subsystem crates define
//! their own narrower `thiserror` enums (registry, routing, dispatch,
//! ingest, store) and convert into this one at their public boundary,
//! mirroring the model repository's per-concern `ServerError` variants.

use thiserror::Error;

/// Stable, programmatically-branchable error kind included in every
/// response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    Unauthenticated,
    Forbidden,
    NotFound,
    Unavailable,
    Overloaded,
    DeadlineExceeded,
    NoCandidateAvailable,
    NoCandidateSucceeded,
    RemoteError,
    Transport,
    StoreError,
    InvariantViolated,
}

/// Top-level Coordinator error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoordError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("overloaded: {0}")]
    Overloaded(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("no candidate available")]
    NoCandidateAvailable,

    /// Cascade exhausted; carries the attempted-MCP trail.
    #[error("no candidate succeeded after {} attempts", .trail.len())]
    NoCandidateSucceeded { trail: Vec<TrailEntry> },

    #[error("remote error: {0}")]
    RemoteError(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("store error: {0}")]
    StoreError(String),

    /// Fatal: an impossible state transition or corrupt snapshot was
    /// observed. Callers that construct this variant are expected to also
    /// persist a crash marker and exit(1) per spec §7 — see
    /// `coordinator-server::crash`.
    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}

/// One attempted MCP and the error kind it failed with, used in cascade
/// failure trails (spec §6, "trail").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TrailEntry {
    pub mcp_id: String,
    pub error_kind: ErrorKind,
}

impl CoordError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordError::BadRequest(_) => ErrorKind::BadRequest,
            CoordError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            CoordError::Forbidden(_) => ErrorKind::Forbidden,
            CoordError::NotFound(_) => ErrorKind::NotFound,
            CoordError::Unavailable(_) => ErrorKind::Unavailable,
            CoordError::Overloaded(_) => ErrorKind::Overloaded,
            CoordError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            CoordError::NoCandidateAvailable => ErrorKind::NoCandidateAvailable,
            CoordError::NoCandidateSucceeded { .. } => ErrorKind::NoCandidateSucceeded,
            CoordError::RemoteError(_) => ErrorKind::RemoteError,
            CoordError::Transport(_) => ErrorKind::Transport,
            CoordError::StoreError(_) => ErrorKind::StoreError,
            CoordError::InvariantViolated(_) => ErrorKind::InvariantViolated,
        }
    }

    /// HTTP status this error kind maps to.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::DeadlineExceeded => 408,
            ErrorKind::Unavailable | ErrorKind::Overloaded => 503,
            ErrorKind::NoCandidateAvailable | ErrorKind::NoCandidateSucceeded => 503,
            ErrorKind::RemoteError | ErrorKind::Transport => 502,
            ErrorKind::StoreError | ErrorKind::InvariantViolated => 500,
        }
    }
}

pub type CoordResult<T> = Result<T, CoordError>;
