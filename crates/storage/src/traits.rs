//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use packrat_core::{BlobId, BlobMetadata};
use std::pin::Pin;

/// Page size constraints for listing operations.
pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const MIN_PAGE_SIZE: usize = 100;
pub const MAX_PAGE_SIZE: usize = 10000;

/// A boxed stream of listing pages.
pub type BlobPageStream<'a> = Pin<Box<dyn Stream<Item = StorageResult<BlobListingPage>> + Send + 'a>>;

/// A boxed stream of blob metadata.
pub type BlobMetadataStream<'a> = Pin<Box<dyn Stream<Item = StorageResult<BlobMetadata>> + Send + 'a>>;

/// A single page of listing results.
#[derive(Clone, Debug, Default)]
pub struct BlobListingPage {
    /// Blobs in this page, with their lengths.
    pub blobs: Vec<BlobMetadata>,
}

/// Options for listing operations.
#[derive(Clone, Debug)]
pub struct ListingOptions {
    /// Number of blobs to fetch per page.
    ///
    /// This value will be clamped to [MIN_PAGE_SIZE, MAX_PAGE_SIZE].
    pub page_size: usize,
}

impl ListingOptions {
    /// Create new listing options with the given page size.
    pub fn new(page_size: usize) -> Self {
        Self { page_size }
    }

    /// Get the normalized page size.
    pub fn normalized_page_size(&self) -> usize {
        self.page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
    }
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Blob store abstraction for pack, index and maintenance blobs.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Check if a blob exists.
    async fn exists(&self, id: &BlobId) -> StorageResult<bool>;

    /// Get a blob's metadata without fetching content.
    async fn head(&self, id: &BlobId) -> StorageResult<BlobMetadata>;

    /// Get a blob's content.
    async fn get(&self, id: &BlobId) -> StorageResult<Bytes>;

    /// Get the bytes `[start, end)` of a blob.
    async fn get_range(&self, id: &BlobId, start: u64, end: u64) -> StorageResult<Bytes>;

    /// Put a blob atomically, replacing any existing blob with the same id.
    async fn put(&self, id: &BlobId, data: Bytes) -> StorageResult<()>;

    /// Put a blob only if it doesn't exist. Returns false if it already existed.
    async fn put_if_not_exists(&self, id: &BlobId, data: Bytes) -> StorageResult<bool>;

    /// Delete a blob.
    async fn delete(&self, id: &BlobId) -> StorageResult<()>;

    /// Get the name of this storage backend.
    ///
    /// Returns a static string identifier for the backend type (e.g., "filesystem").
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// List blobs whose id starts with `prefix`, returning a stream of pages.
    ///
    /// Each page carries the id and length of every blob in it. Pages are
    /// produced lazily; dropping the stream stops the listing.
    fn list_pages<'a>(&'a self, prefix: &str, options: ListingOptions) -> BlobPageStream<'a>;

    /// Verify storage backend connectivity.
    ///
    /// The default implementation returns Ok(()), suitable for backends that
    /// don't require connectivity verification.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Extension trait flattening `list_pages()` into per-blob streams and visitors.
///
/// DO NOT IMPLEMENT THIS TRAIT MANUALLY. It is provided for every `BlobStore`
/// through a blanket implementation.
pub trait BlobStoreListExt: BlobStore {
    /// List blobs with a prefix, returning a flat stream of blob metadata.
    fn list_stream<'a>(
        &'a self,
        prefix: &str,
        options: Option<ListingOptions>,
    ) -> BlobMetadataStream<'a> {
        let page_stream = self.list_pages(prefix, options.unwrap_or_default());

        let blob_stream = page_stream.flat_map(|page_result| match page_result {
            Ok(page) => futures::stream::iter(page.blobs.into_iter().map(Ok)).boxed(),
            Err(e) => futures::stream::once(async move { Err(e) }).boxed(),
        });

        Box::pin(blob_stream)
    }

    /// Visit every blob with the given prefix, in listing order.
    ///
    /// Stops at the first listing or visitor error. Returns the number of
    /// blobs visited.
    fn list_blobs<'a, F>(&'a self, prefix: &'a str, mut visit: F) -> BoxFuture<'a, StorageResult<u64>>
    where
        F: FnMut(BlobMetadata) -> StorageResult<()> + Send + 'a,
    {
        async move {
            let mut stream = self.list_stream(prefix, None);
            let mut visited = 0u64;
            while let Some(blob) = stream.next().await {
                visit(blob?)?;
                visited += 1;
            }
            Ok(visited)
        }
        .boxed()
    }
}

impl<T: BlobStore + ?Sized> BlobStoreListExt for T {}
