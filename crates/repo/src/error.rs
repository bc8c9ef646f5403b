//! Repository error types.

use packrat_index::IndexError;
use packrat_storage::StorageError;
use thiserror::Error;

/// Repository operation errors.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("repository not initialized: {0}")]
    NotInitialized(String),

    #[error("repository already initialized")]
    AlreadyInitialized,

    #[error("invalid repository password")]
    InvalidPassword,

    #[error("repository password required")]
    MissingPassword,

    #[error("invalid format blob: {0}")]
    InvalidFormat(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("remote repository error: {0}")]
    Remote(String),

    #[error("write session {requested:?} cannot start inside active session {active:?}")]
    SessionConflict { active: String, requested: String },

    #[error("operation not supported: {0}")]
    NotSupported(String),

    #[error("repository is read-only")]
    ReadOnly,

    #[error("repository already closed")]
    AlreadyClosed,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<packrat_core::Error> for RepoError {
    fn from(err: packrat_core::Error) -> Self {
        RepoError::Index(IndexError::Core(err))
    }
}

impl From<reqwest::Error> for RepoError {
    fn from(err: reqwest::Error) -> Self {
        RepoError::Remote(err.to_string())
    }
}

/// Result type for repository operations.
pub type RepoResult<T> = std::result::Result<T, RepoError>;
