//! Core domain types for packrat repositories.
//!
//! This crate defines the data model shared by every other crate:
//! - Content identifiers and content hashing
//! - Pack blob identifiers and blob metadata
//! - Content index records and id ranges
//! - Configuration types

pub mod blob;
pub mod config;
pub mod content;
pub mod error;
pub mod hash;
pub mod range;

pub use blob::{BlobId, BlobMetadata};
pub use content::{ContentId, ContentInfo};
pub use error::{Error, Result};
pub use hash::ContentHash;
pub use range::IdRange;

/// Blob name of the repository format blob.
pub const FORMAT_BLOB_ID: &str = "format.packrat";

/// Prefix of pack blobs holding content bytes.
pub const PACK_BLOB_PREFIX: &str = "p";

/// Prefix of index blobs holding content records.
pub const INDEX_BLOB_PREFIX: &str = "x";
