use async_trait::async_trait;
use bytes::Bytes;
use packrat_core::{BlobId, BlobMetadata};
use packrat_storage::error::{StorageError, StorageResult};
use packrat_storage::traits::{BlobListingPage, BlobPageStream, BlobStore, ListingOptions};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::Duration;

/// Deterministic pack blob id at the given index.
fn synthetic_blob(i: usize) -> BlobMetadata {
    let id = BlobId::parse(&format!("p{i:032x}")).expect("synthetic blob id is valid");
    BlobMetadata::new(id, 4096 + (i as u64 % 512))
}

/// Mock backend for large listing tests that generates synthetic blobs on-the-fly
/// without storing them in memory. This allows testing memory usage with millions
/// of blobs without actually allocating memory for them.
#[allow(dead_code)]
pub struct MockLargeListingBackend {
    pub total_blobs: usize,
}

#[allow(dead_code)]
impl MockLargeListingBackend {
    pub fn new(total_blobs: usize) -> Arc<Self> {
        Arc::new(Self { total_blobs })
    }
}

#[async_trait]
impl BlobStore for MockLargeListingBackend {
    async fn exists(&self, _id: &BlobId) -> StorageResult<bool> {
        Ok(false)
    }

    async fn head(&self, _id: &BlobId) -> StorageResult<BlobMetadata> {
        Err(StorageError::NotFound("mock backend".to_string()))
    }

    async fn get(&self, _id: &BlobId) -> StorageResult<Bytes> {
        Err(StorageError::NotFound("mock backend".to_string()))
    }

    async fn get_range(&self, _id: &BlobId, _start: u64, _end: u64) -> StorageResult<Bytes> {
        Err(StorageError::NotFound("mock backend".to_string()))
    }

    async fn put(&self, _id: &BlobId, _data: Bytes) -> StorageResult<()> {
        Err(StorageError::Unavailable("mock backend is read-only".to_string()))
    }

    async fn put_if_not_exists(&self, _id: &BlobId, _data: Bytes) -> StorageResult<bool> {
        Err(StorageError::Unavailable("mock backend is read-only".to_string()))
    }

    async fn delete(&self, _id: &BlobId) -> StorageResult<()> {
        Err(StorageError::Unavailable("mock backend is read-only".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "mock-large-listing"
    }

    fn list_pages<'a>(&'a self, prefix: &str, options: ListingOptions) -> BlobPageStream<'a> {
        let page_size = options.normalized_page_size();
        let prefix = prefix.to_string();
        let total_blobs = self.total_blobs;

        Box::pin(async_stream::try_stream! {
            let mut index = 0;
            while index < total_blobs {
                let end = (index + page_size).min(total_blobs);
                let blobs: Vec<BlobMetadata> = (index..end)
                    .map(synthetic_blob)
                    .filter(|b| b.blob_id.has_prefix(&prefix))
                    .collect();
                yield BlobListingPage { blobs };
                index = end;
            }
        })
    }
}

/// Instrumented backend that counts the number of pages fetched.
/// Useful for testing cancellation and backpressure behavior.
#[allow(dead_code)]
pub struct InstrumentedBackend {
    pub total_blobs: usize,
    pub pages_fetched: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl InstrumentedBackend {
    pub fn new(total_blobs: usize) -> (Arc<Self>, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let backend = Arc::new(Self {
            total_blobs,
            pages_fetched: counter.clone(),
        });
        (backend, counter)
    }
}

#[async_trait]
impl BlobStore for InstrumentedBackend {
    async fn exists(&self, _id: &BlobId) -> StorageResult<bool> {
        Ok(false)
    }

    async fn head(&self, _id: &BlobId) -> StorageResult<BlobMetadata> {
        Err(StorageError::NotFound("instrumented backend".to_string()))
    }

    async fn get(&self, _id: &BlobId) -> StorageResult<Bytes> {
        Err(StorageError::NotFound("instrumented backend".to_string()))
    }

    async fn get_range(&self, _id: &BlobId, _start: u64, _end: u64) -> StorageResult<Bytes> {
        Err(StorageError::NotFound("instrumented backend".to_string()))
    }

    async fn put(&self, _id: &BlobId, _data: Bytes) -> StorageResult<()> {
        Err(StorageError::Unavailable("instrumented backend is read-only".to_string()))
    }

    async fn put_if_not_exists(&self, _id: &BlobId, _data: Bytes) -> StorageResult<bool> {
        Err(StorageError::Unavailable("instrumented backend is read-only".to_string()))
    }

    async fn delete(&self, _id: &BlobId) -> StorageResult<()> {
        Err(StorageError::Unavailable("instrumented backend is read-only".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "instrumented"
    }

    fn list_pages<'a>(&'a self, prefix: &str, options: ListingOptions) -> BlobPageStream<'a> {
        let page_size = options.normalized_page_size();
        let prefix = prefix.to_string();
        let pages_counter = self.pages_fetched.clone();
        let total_blobs = self.total_blobs;

        Box::pin(async_stream::try_stream! {
            let mut index = 0;
            while index < total_blobs {
                // Count before yielding so cancellation tests see every fetched page.
                pages_counter.fetch_add(1, Ordering::SeqCst);

                let end = (index + page_size).min(total_blobs);
                let blobs: Vec<BlobMetadata> = (index..end)
                    .map(synthetic_blob)
                    .filter(|b| b.blob_id.has_prefix(&prefix))
                    .collect();

                yield BlobListingPage { blobs };
                index = end;

                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    }
}
