//! Content manager: the loaded content index plus buffered writes.

use crate::error::{IndexError, IndexResult};
use crate::format::{IndexBlob, supersedes};
use crate::reader::{ContentInfoStream, ContentReader, IterateOptions};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use packrat_core::{
    BlobId, ContentId, ContentInfo, INDEX_BLOB_PREFIX, PACK_BLOB_PREFIX,
};
use packrat_storage::{BlobStore, BlobStoreListExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Callback invoked with the number of bytes uploaded.
pub type UploadCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Result of flushing pending writes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Contents written to the new pack blob.
    pub contents_written: usize,
    /// Soft-delete markers written.
    pub contents_deleted: usize,
    /// Pack blob bytes uploaded.
    pub bytes_written: u64,
}

/// Result of compacting the index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompactStats {
    /// Index blobs replaced by the compacted blob.
    pub index_blobs_compacted: usize,
    /// Soft-deleted records dropped from the index.
    pub deleted_entries_dropped: usize,
}

#[derive(Default)]
struct Pending {
    contents: BTreeMap<ContentId, Bytes>,
    deletions: BTreeMap<ContentId, ContentInfo>,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.contents.is_empty() && self.deletions.is_empty()
    }
}

#[derive(Default)]
struct Committed {
    entries: BTreeMap<ContentId, ContentInfo>,
    index_blobs: Vec<BlobId>,
}

impl Committed {
    fn merge(&mut self, info: ContentInfo) {
        match self.entries.get(&info.content_id) {
            Some(existing) if !supersedes(&info, existing) => {}
            _ => {
                self.entries.insert(info.content_id.clone(), info);
            }
        }
    }
}

/// The content index of one repository, with a write buffer.
///
/// Reads see committed records; `get_content` and `content_info` also see
/// contents written but not yet flushed. Callers serialize writers through
/// the repository's write session.
pub struct ContentManager {
    store: Arc<dyn BlobStore>,
    committed: RwLock<Committed>,
    pending: Mutex<Pending>,
}

impl ContentManager {
    /// Load every index blob from the store.
    pub async fn open(store: Arc<dyn BlobStore>) -> IndexResult<Self> {
        let manager = Self {
            store,
            committed: RwLock::new(Committed::default()),
            pending: Mutex::new(Pending::default()),
        };
        manager.reload().await?;
        Ok(manager)
    }

    /// Re-read all index blobs, replacing the in-memory index.
    pub async fn reload(&self) -> IndexResult<()> {
        let mut ids = Vec::new();
        self.store
            .list_blobs(INDEX_BLOB_PREFIX, |blob| {
                ids.push(blob.blob_id);
                Ok(())
            })
            .await?;

        let mut loaded = Committed::default();
        for id in &ids {
            let data = self.store.get(id).await?;
            let blob = IndexBlob::decode(id, &data)?;
            for entry in blob.entries {
                loaded.merge(entry);
            }
        }
        loaded.index_blobs = ids;

        debug!(
            index_blobs = loaded.index_blobs.len(),
            contents = loaded.entries.len(),
            "Loaded content index"
        );
        *self.committed.write().await = loaded;
        Ok(())
    }

    /// The blob store backing this index.
    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Number of index blobs currently making up the index.
    pub async fn index_blob_count(&self) -> usize {
        self.committed.read().await.index_blobs.len()
    }

    /// Pack blobs referenced by any committed record, deleted or not.
    pub async fn referenced_packs(&self) -> std::collections::HashSet<BlobId> {
        self.committed
            .read()
            .await
            .entries
            .values()
            .map(|info| info.pack_blob_id.clone())
            .collect()
    }

    /// Buffer a content for the next flush. Returns its id.
    ///
    /// Writing a content that already exists and is not deleted is a no-op.
    pub async fn write_content(&self, data: Bytes, prefix: Option<char>) -> IndexResult<ContentId> {
        let id = ContentId::for_data(prefix, &data)?;

        let mut pending = self.pending.lock().await;
        if pending.contents.contains_key(&id) {
            return Ok(id);
        }
        let live = self
            .committed
            .read()
            .await
            .entries
            .get(&id)
            .is_some_and(|info| !info.deleted);
        if live && !pending.deletions.contains_key(&id) {
            debug!(content_id = %id, "Content already present");
            return Ok(id);
        }

        pending.deletions.remove(&id);
        pending.contents.insert(id.clone(), data);
        Ok(id)
    }

    /// Buffer a soft-delete marker for a content.
    pub async fn delete_content(&self, id: &ContentId) -> IndexResult<()> {
        let mut pending = self.pending.lock().await;
        let was_pending = pending.contents.remove(id).is_some();

        let committed = self.committed.read().await;
        match committed.entries.get(id) {
            Some(info) if !info.deleted => {
                pending.deletions.insert(
                    id.clone(),
                    ContentInfo {
                        deleted: true,
                        timestamp: OffsetDateTime::now_utc(),
                        ..info.clone()
                    },
                );
                Ok(())
            }
            _ if was_pending => Ok(()),
            _ => Err(IndexError::NotFound(id.to_string())),
        }
    }

    /// Whether there are buffered writes.
    pub async fn has_pending(&self) -> bool {
        !self.pending.lock().await.is_empty()
    }

    /// Drop all buffered writes.
    pub async fn discard_pending(&self) {
        let mut pending = self.pending.lock().await;
        if !pending.is_empty() {
            debug!(
                contents = pending.contents.len(),
                deletions = pending.deletions.len(),
                "Discarding pending writes"
            );
        }
        *pending = Pending::default();
    }

    /// Write buffered contents as one pack blob and one index blob.
    ///
    /// The pack blob is written before the index blob, so a failed flush
    /// can leave an unreferenced pack but never an index entry without data.
    /// Buffered writes are kept on failure.
    pub async fn flush(&self, on_upload: Option<&UploadCallback>) -> IndexResult<FlushStats> {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return Ok(FlushStats::default());
        }

        let now = OffsetDateTime::now_utc();
        let mut entries = Vec::with_capacity(pending.contents.len() + pending.deletions.len());
        let mut stats = FlushStats::default();

        if !pending.contents.is_empty() {
            let pack_id = BlobId::generate(PACK_BLOB_PREFIX, &Uuid::new_v4().simple().to_string())?;
            let mut pack = BytesMut::new();
            for (id, data) in &pending.contents {
                entries.push(ContentInfo {
                    content_id: id.clone(),
                    pack_blob_id: pack_id.clone(),
                    pack_offset: pack.len() as u64,
                    packed_length: data.len() as u64,
                    deleted: false,
                    timestamp: now,
                });
                pack.extend_from_slice(data);
            }

            let pack = pack.freeze();
            stats.bytes_written = pack.len() as u64;
            stats.contents_written = pending.contents.len();
            self.store.put(&pack_id, pack).await?;
            if let Some(callback) = on_upload {
                callback(stats.bytes_written);
            }
            debug!(blob_id = %pack_id, bytes = stats.bytes_written, "Wrote pack blob");
        }

        stats.contents_deleted = pending.deletions.len();
        entries.extend(pending.deletions.values().cloned());

        let index_id = BlobId::generate(INDEX_BLOB_PREFIX, &Uuid::new_v4().simple().to_string())?;
        let encoded = IndexBlob::new(entries.clone()).encode()?;
        self.store.put(&index_id, encoded).await?;

        let mut committed = self.committed.write().await;
        for entry in entries {
            committed.merge(entry);
        }
        committed.index_blobs.push(index_id.clone());
        *pending = Pending::default();

        info!(
            index_blob = %index_id,
            contents_written = stats.contents_written,
            contents_deleted = stats.contents_deleted,
            "Flushed pending writes"
        );
        Ok(stats)
    }

    /// Rewrite the whole index as a single index blob.
    ///
    /// Soft-deleted records with a timestamp before `drop_deleted_before`
    /// are dropped. The new blob is written before the old ones are deleted.
    pub async fn compact(
        &self,
        drop_deleted_before: Option<OffsetDateTime>,
    ) -> IndexResult<CompactStats> {
        let mut committed = self.committed.write().await;

        let mut kept = Vec::with_capacity(committed.entries.len());
        let mut dropped = 0;
        for info in committed.entries.values() {
            let expired = info.deleted
                && drop_deleted_before.is_some_and(|cutoff| info.timestamp < cutoff);
            if expired {
                dropped += 1;
            } else {
                kept.push(info.clone());
            }
        }

        if dropped == 0 && committed.index_blobs.len() <= 1 {
            debug!("Content index already compact");
            return Ok(CompactStats::default());
        }

        let old_blobs = std::mem::take(&mut committed.index_blobs);
        let new_id = BlobId::generate(INDEX_BLOB_PREFIX, &Uuid::new_v4().simple().to_string())?;
        if let Err(e) = self
            .store
            .put(&new_id, IndexBlob::new(kept.clone()).encode()?)
            .await
        {
            committed.index_blobs = old_blobs;
            return Err(e.into());
        }

        committed.entries = kept
            .into_iter()
            .map(|info| (info.content_id.clone(), info))
            .collect();
        committed.index_blobs = vec![new_id.clone()];

        for old in &old_blobs {
            match self.store.delete(old).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            index_blob = %new_id,
            replaced = old_blobs.len(),
            dropped_deleted = dropped,
            "Compacted content index"
        );
        Ok(CompactStats {
            index_blobs_compacted: old_blobs.len(),
            deleted_entries_dropped: dropped,
        })
    }
}

#[async_trait]
impl ContentReader for ContentManager {
    async fn content_info(&self, id: &ContentId) -> IndexResult<ContentInfo> {
        self.committed
            .read()
            .await
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| IndexError::NotFound(id.to_string()))
    }

    async fn get_content(&self, id: &ContentId) -> IndexResult<Bytes> {
        if let Some(data) = self.pending.lock().await.contents.get(id) {
            return Ok(data.clone());
        }

        let info = self.content_info(id).await?;
        let end = info.end_offset().ok_or_else(|| IndexError::Corrupted {
            content_id: id.to_string(),
            reason: "pack range overflows".to_string(),
        })?;
        let data = self
            .store
            .get_range(&info.pack_blob_id, info.pack_offset, end)
            .await?;
        id.verify(&data).map_err(|e| IndexError::Corrupted {
            content_id: id.to_string(),
            reason: e.to_string(),
        })?;
        Ok(data)
    }

    fn contents<'a>(&'a self, options: &IterateOptions) -> ContentInfoStream<'a> {
        let options = options.clone();
        Box::pin(async_stream::try_stream! {
            // Snapshot so the lock is not held while the consumer runs.
            let snapshot: Vec<ContentInfo> = {
                let committed = self.committed.read().await;
                committed
                    .entries
                    .values()
                    .filter(|info| options.include_deleted || !info.deleted)
                    .filter(|info| options.range.contains(&info.content_id))
                    .cloned()
                    .collect()
            };
            for info in snapshot {
                yield info;
            }
        })
    }
}
