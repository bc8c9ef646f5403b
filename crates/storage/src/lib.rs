//! Blob store abstraction and backends for packrat repositories.
//!
//! This crate provides:
//! - The `BlobStore` trait with paged, lazily produced listings
//! - Atomic writes and ranged reads
//! - Backends: local filesystem and in-memory

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, memory::InMemoryBackend};
pub use error::{StorageError, StorageResult};
pub use traits::{
    BlobListingPage, BlobMetadataStream, BlobPageStream, BlobStore, BlobStoreListExt,
    ListingOptions,
};

use std::path::Path;
use std::sync::Arc;

/// Open a filesystem blob store.
///
/// With `create` the root directory is created if missing; otherwise the
/// root must already exist.
pub async fn open_filesystem(path: &Path, create: bool) -> StorageResult<Arc<dyn BlobStore>> {
    let backend = if create {
        FilesystemBackend::new(path).await?
    } else {
        FilesystemBackend::open_existing(path).await?
    };
    Ok(Arc::new(backend))
}
