//! Log-pipeline-local error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("malformed event: {0}")]
    Malformed(String),

    #[error("queue unavailable: no slot freed within the back-pressure window")]
    QueueUnavailable,

    #[error("interaction not found: {0}")]
    NotFound(String),

    #[error("store io error: {0}")]
    StoreIo(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    StoreSerde(#[from] serde_json::Error),
}

impl From<LogError> for coordinator_core::CoordError {
    fn from(e: LogError) -> Self {
        use coordinator_core::CoordError;
        match e {
            LogError::Malformed(_) => CoordError::BadRequest(e.to_string()),
            LogError::QueueUnavailable => CoordError::Unavailable(e.to_string()),
            LogError::NotFound(id) => CoordError::NotFound(id),
            LogError::StoreIo(_) | LogError::StoreSerde(_) => CoordError::StoreError(e.to_string()),
        }
    }
}
