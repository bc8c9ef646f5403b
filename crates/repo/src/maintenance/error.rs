//! Maintenance error types.

use crate::error::RepoError;
use packrat_index::IndexError;
use packrat_storage::StorageError;
use thiserror::Error;

/// Maintenance errors.
#[derive(Debug, Error)]
pub enum MaintenanceError {
    /// Another client owns the maintenance cycle.
    #[error("maintenance must be run by its designated owner: {owner} (this client is {me})")]
    NotOwned { owner: String, me: String },

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid maintenance state: {0}")]
    InvalidState(String),
}

impl MaintenanceError {
    pub fn is_not_owned(&self) -> bool {
        matches!(self, MaintenanceError::NotOwned { .. })
    }
}

/// Result type for maintenance operations.
pub type MaintenanceResult<T> = std::result::Result<T, MaintenanceError>;
