//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob already exists: {0}")]
    AlreadyExists(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid blob id: {0}")]
    InvalidBlobId(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("storage not available: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Whether this error means the blob does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<packrat_core::Error> for StorageError {
    fn from(err: packrat_core::Error) -> Self {
        StorageError::InvalidBlobId(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
