//! Repository layer for packrat.
//!
//! This crate provides:
//! - Repository handles: direct (blob store) and remote (server)
//! - Single-writer write sessions with commit-on-success
//! - The maintenance procedure and its ownership rules
//! - Content verification against the blob store
//! - Prometheus metrics for the above

pub mod credentials;
pub mod error;
pub mod format;
pub mod maintenance;
pub mod metrics;
pub mod remote;
pub mod repository;
pub mod session;
pub mod verify;

pub use credentials::Credentials;
pub use error::{RepoError, RepoResult};
pub use format::FormatBlob;
pub use maintenance::{MaintenanceError, MaintenanceMode, SafetyLevel};
pub use remote::RemoteRepository;
pub use repository::{DirectRepository, Repository};
pub use session::{
    DirectRepositoryWriter, WriteSessionOptions, direct_write_session, write_session,
};
pub use verify::{ContentVerifier, RecordFailure, VerifyError, VerifyOptions, VerifyReport};
