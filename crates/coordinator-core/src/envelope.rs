//! Unified `{ok, data?, error?}` response envelope (spec §6).

use serde::Serialize;

use crate::error::{CoordError, ErrorKind, TrailEntry};

/// Error body nested inside an envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trail: Option<Vec<TrailEntry>>,
}

/// Wire envelope every HTTP response is wrapped in.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T: Serialize> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }
}

impl Envelope<()> {
    pub fn from_error(err: &CoordError) -> Self {
        let trail = match err {
            CoordError::NoCandidateSucceeded { trail } => Some(trail.clone()),
            _ => None,
        };
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody {
                kind: err.kind(),
                message: err.to_string(),
                trail,
            }),
        }
    }
}
