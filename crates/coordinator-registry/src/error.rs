//! Registry-local error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("mcp not found: {0}")]
    NotFound(String),

    #[error("snapshot io error: {0}")]
    SnapshotIo(#[from] std::io::Error),

    #[error("snapshot serialization error: {0}")]
    SnapshotSerde(#[from] serde_json::Error),
}

impl From<RegistryError> for coordinator_core::CoordError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::MissingField(_) => coordinator_core::CoordError::BadRequest(e.to_string()),
            RegistryError::NotFound(id) => coordinator_core::CoordError::NotFound(id),
            RegistryError::SnapshotIo(_) | RegistryError::SnapshotSerde(_) => {
                coordinator_core::CoordError::StoreError(e.to_string())
            }
        }
    }
}
