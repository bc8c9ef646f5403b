//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid content id: {0}")]
    InvalidContentId(String),

    #[error("invalid blob id: {0}")]
    InvalidBlobId(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid id range: {0}")]
    InvalidRange(String),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
