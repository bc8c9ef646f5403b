use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use packrat_core::{BlobId, BlobMetadata, ContentId, ContentInfo};
use packrat_index::{ContentInfoStream, ContentReader, IndexError, IndexResult, IterateOptions};
use packrat_storage::{
    BlobListingPage, BlobPageStream, BlobStore, ListingOptions, StorageError, StorageResult,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::Duration;

/// Content reader serving a fixed set of records.
///
/// Tracks how many `get_content` calls are in flight so tests can check
/// the concurrency bound of a verification run.
#[allow(dead_code)]
pub struct StaticContentReader {
    records: Vec<ContentInfo>,
    data: HashMap<ContentId, Bytes>,
    fetch_delay: Duration,
    fail_iteration_after: Option<usize>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[allow(dead_code)]
impl StaticContentReader {
    pub fn new(mut records: Vec<ContentInfo>) -> Self {
        records.sort_by(|a, b| a.content_id.cmp(&b.content_id));
        Self {
            records,
            data: HashMap::new(),
            fetch_delay: Duration::ZERO,
            fail_iteration_after: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Serve these bytes for the content.
    pub fn with_data(mut self, id: ContentId, data: impl Into<Bytes>) -> Self {
        self.data.insert(id, data.into());
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Fail the record stream after yielding `n` records.
    pub fn fail_iteration_after(mut self, n: usize) -> Self {
        self.fail_iteration_after = Some(n);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentReader for StaticContentReader {
    async fn content_info(&self, id: &ContentId) -> IndexResult<ContentInfo> {
        self.records
            .iter()
            .find(|r| &r.content_id == id)
            .cloned()
            .ok_or_else(|| IndexError::NotFound(id.to_string()))
    }

    async fn get_content(&self, id: &ContentId) -> IndexResult<Bytes> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let data = self
            .data
            .get(id)
            .cloned()
            .ok_or_else(|| IndexError::NotFound(id.to_string()))?;
        id.verify(&data).map_err(|e| IndexError::Corrupted {
            content_id: id.to_string(),
            reason: e.to_string(),
        })?;
        Ok(data)
    }

    fn contents<'a>(&'a self, options: &IterateOptions) -> ContentInfoStream<'a> {
        let mut items: Vec<IndexResult<ContentInfo>> = self
            .records
            .iter()
            .filter(|r| options.include_deleted || !r.deleted)
            .filter(|r| options.range.contains(&r.content_id))
            .cloned()
            .map(Ok)
            .collect();
        if let Some(n) = self.fail_iteration_after {
            items.truncate(n);
            items.push(Err(IndexError::InvalidIndexBlob {
                blob_id: "x-broken".to_string(),
                reason: "truncated".to_string(),
            }));
        }
        Box::pin(stream::iter(items))
    }
}

/// Blob store whose listings always fail.
#[allow(dead_code)]
pub struct FailingListingBackend;

#[async_trait]
impl BlobStore for FailingListingBackend {
    async fn exists(&self, _id: &BlobId) -> StorageResult<bool> {
        Ok(false)
    }

    async fn head(&self, id: &BlobId) -> StorageResult<BlobMetadata> {
        Err(StorageError::NotFound(id.to_string()))
    }

    async fn get(&self, id: &BlobId) -> StorageResult<Bytes> {
        Err(StorageError::NotFound(id.to_string()))
    }

    async fn get_range(&self, id: &BlobId, _start: u64, _end: u64) -> StorageResult<Bytes> {
        Err(StorageError::NotFound(id.to_string()))
    }

    async fn put(&self, _id: &BlobId, _data: Bytes) -> StorageResult<()> {
        Err(StorageError::Unavailable("listing backend is read-only".to_string()))
    }

    async fn put_if_not_exists(&self, _id: &BlobId, _data: Bytes) -> StorageResult<bool> {
        Err(StorageError::Unavailable("listing backend is read-only".to_string()))
    }

    async fn delete(&self, _id: &BlobId) -> StorageResult<()> {
        Err(StorageError::Unavailable("listing backend is read-only".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "failing-listing"
    }

    fn list_pages<'a>(&'a self, _prefix: &str, _options: ListingOptions) -> BlobPageStream<'a> {
        Box::pin(stream::once(async {
            Err::<BlobListingPage, _>(StorageError::Unavailable("listing refused".to_string()))
        }))
    }
}
