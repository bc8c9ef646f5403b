//! Content index error types.

use packrat_storage::StorageError;
use thiserror::Error;

/// Content index operation errors.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("content not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("content {content_id} is corrupted: {reason}")]
    Corrupted { content_id: String, reason: String },

    #[error("invalid index blob {blob_id}: {reason}")]
    InvalidIndexBlob { blob_id: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] packrat_core::Error),
}

impl IndexError {
    /// Whether this error means the content does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexError::NotFound(_))
    }
}

/// Result type for content index operations.
pub type IndexResult<T> = std::result::Result<T, IndexError>;
