//! In-memory blob store.
//!
//! Used by tests across the workspace and for throwaway repositories.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobListingPage, BlobPageStream, BlobStore, ListingOptions};
use async_trait::async_trait;
use bytes::Bytes;
use packrat_core::{BlobId, BlobMetadata};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;
use time::OffsetDateTime;

type Blobs = BTreeMap<BlobId, (Bytes, OffsetDateTime)>;

/// Blob store keeping every blob in a sorted map.
#[derive(Default)]
pub struct InMemoryBackend {
    blobs: RwLock<Blobs>,
}

impl InMemoryBackend {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.read().map(|b| b.len()).unwrap_or(0)
    }

    /// Whether the store holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite a blob's modification time. Lets tests age blobs.
    pub fn set_timestamp(&self, id: &BlobId, timestamp: OffsetDateTime) -> StorageResult<()> {
        let mut blobs = self.write()?;
        let entry = blobs
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        entry.1 = timestamp;
        Ok(())
    }

    fn read(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, Blobs>> {
        self.blobs
            .read()
            .map_err(|_| StorageError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StorageResult<std::sync::RwLockWriteGuard<'_, Blobs>> {
        self.blobs
            .write()
            .map_err(|_| StorageError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    fn metadata(id: &BlobId, data: &Bytes, timestamp: OffsetDateTime) -> BlobMetadata {
        BlobMetadata {
            blob_id: id.clone(),
            length: data.len() as u64,
            timestamp: Some(timestamp),
        }
    }
}

#[async_trait]
impl BlobStore for InMemoryBackend {
    async fn exists(&self, id: &BlobId) -> StorageResult<bool> {
        Ok(self.read()?.contains_key(id))
    }

    async fn head(&self, id: &BlobId) -> StorageResult<BlobMetadata> {
        let blobs = self.read()?;
        let (data, ts) = blobs
            .get(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        Ok(Self::metadata(id, data, *ts))
    }

    async fn get(&self, id: &BlobId) -> StorageResult<Bytes> {
        let blobs = self.read()?;
        blobs
            .get(id)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn get_range(&self, id: &BlobId, start: u64, end: u64) -> StorageResult<Bytes> {
        if end < start {
            return Err(StorageError::InvalidRange(format!(
                "end ({end}) < start ({start})"
            )));
        }
        let data = self.get(id).await?;
        if end > data.len() as u64 {
            return Err(StorageError::InvalidRange(format!(
                "range [{start}, {end}) exceeds blob {id} of length {}",
                data.len()
            )));
        }
        Ok(data.slice(start as usize..end as usize))
    }

    async fn put(&self, id: &BlobId, data: Bytes) -> StorageResult<()> {
        self.write()?
            .insert(id.clone(), (data, OffsetDateTime::now_utc()));
        Ok(())
    }

    async fn put_if_not_exists(&self, id: &BlobId, data: Bytes) -> StorageResult<bool> {
        let mut blobs = self.write()?;
        if blobs.contains_key(id) {
            return Ok(false);
        }
        blobs.insert(id.clone(), (data, OffsetDateTime::now_utc()));
        Ok(true)
    }

    async fn delete(&self, id: &BlobId) -> StorageResult<()> {
        self.write()?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn list_pages<'a>(&'a self, prefix: &str, options: ListingOptions) -> BlobPageStream<'a> {
        let page_size = options.normalized_page_size();
        // Snapshot under the lock so the stream never holds it across awaits.
        let snapshot: StorageResult<Vec<BlobMetadata>> = self.read().map(|blobs| {
            blobs
                .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
                .take_while(|(id, _)| id.has_prefix(prefix))
                .map(|(id, (data, ts))| Self::metadata(id, data, *ts))
                .collect()
        });

        let stream = async_stream::try_stream! {
            let all = snapshot?;
            for chunk in all.chunks(page_size) {
                yield BlobListingPage { blobs: chunk.to_vec() };
            }
        };
        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::BlobStoreListExt;

    fn blob(id: &str) -> BlobId {
        BlobId::parse(id).unwrap()
    }

    #[tokio::test]
    async fn test_put_if_not_exists() {
        let store = InMemoryBackend::new();
        assert!(store.put_if_not_exists(&blob("format.packrat"), Bytes::from("a")).await.unwrap());
        assert!(!store.put_if_not_exists(&blob("format.packrat"), Bytes::from("b")).await.unwrap());
        assert_eq!(store.get(&blob("format.packrat")).await.unwrap(), Bytes::from("a"));
    }

    #[tokio::test]
    async fn test_list_respects_prefix_and_pages() {
        let store = InMemoryBackend::new();
        for i in 0..250 {
            store.put(&blob(&format!("p{i:04}")), Bytes::from("x")).await.unwrap();
        }
        store.put(&blob("xindex"), Bytes::from("y")).await.unwrap();

        let pages: Vec<_> = futures::StreamExt::collect::<Vec<_>>(
            store.list_pages("p", ListingOptions::new(100)),
        )
        .await;
        assert_eq!(pages.len(), 3);
        assert_eq!(store.list_blobs("p", |_| Ok(())).await.unwrap(), 250);
        assert_eq!(store.list_blobs("x", |_| Ok(())).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_range_bounds() {
        let store = InMemoryBackend::new();
        store.put(&blob("p1"), Bytes::from("abcdef")).await.unwrap();
        assert_eq!(store.get_range(&blob("p1"), 1, 3).await.unwrap(), Bytes::from("bc"));
        assert!(matches!(
            store.get_range(&blob("p1"), 4, 7).await,
            Err(StorageError::InvalidRange(_))
        ));
    }
}
