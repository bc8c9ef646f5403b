//! Local filesystem blob store.
//!
//! Blobs are stored as `<root>/<shard>/<blob id>` where the shard is the first
//! three characters of the id, which keeps directories small without needing
//! a recursive walk when listing.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobListingPage, BlobPageStream, BlobStore, ListingOptions};
use async_trait::async_trait;
use bytes::Bytes;
use packrat_core::{BlobId, BlobMetadata};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Maximum range size for get_range operations (128 MiB).
const MAX_RANGE_SIZE: u64 = 128 * 1024 * 1024;

/// Number of id characters used for the shard directory.
const SHARD_LEN: usize = 3;

/// Prefix of in-flight temporary files. Never a valid blob id.
const TEMP_PREFIX: &str = ".tmp.";

/// Local filesystem blob store.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Open an existing filesystem backend.
    ///
    /// Fails with `Unavailable` when the root directory does not exist, so
    /// connecting to a mistyped path never silently creates an empty store.
    pub async fn open_existing(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        match fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => Ok(Self { root }),
            Ok(_) => Err(StorageError::Unavailable(format!(
                "storage root is not a directory: {}",
                root.display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::Unavailable(
                format!("storage root does not exist: {}", root.display()),
            )),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Get the storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn shard_of(id: &str) -> &str {
        &id[..id.len().min(SHARD_LEN)]
    }

    /// Get the full path for a blob, rejecting shard directories that resolve
    /// outside the storage root (e.g., through a symlink).
    async fn blob_path(&self, id: &BlobId) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let id = id.clone();
        tokio::task::spawn_blocking(move || Self::blob_path_sync(&root, &id))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    fn blob_path_sync(root: &Path, id: &BlobId) -> StorageResult<PathBuf> {
        let shard_dir = root.join(Self::shard_of(id.as_str()));
        let path = shard_dir.join(id.as_str());

        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        for candidate in [path.as_path(), shard_dir.as_path()] {
            match std::fs::symlink_metadata(candidate) {
                Ok(meta) => {
                    let canonical = candidate.canonicalize().map_err(|_| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidPath(format!("symlink target missing or invalid: {id}"))
                        } else {
                            StorageError::InvalidPath(format!("failed to resolve path for {id}"))
                        }
                    })?;
                    if !canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidPath(format!(
                            "resolved path escapes storage root: {id}"
                        )));
                    }
                    return Ok(path.clone());
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(StorageError::Io(std::io::Error::new(
                        err.kind(),
                        format!("failed to stat path: {err}"),
                    )));
                }
            }
        }

        Ok(path)
    }

    fn not_found_or_io(id: &BlobId) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
        move |e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(id.to_string())
            } else {
                StorageError::Io(e)
            }
        }
    }

    /// List the shard directories that can hold blobs with the given prefix.
    async fn matching_shards(root: &Path, prefix: &str) -> StorageResult<Vec<PathBuf>> {
        let mut shards = Vec::new();
        let mut entries = match fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(shards),
            Err(e) => return Err(StorageError::Io(e)),
        };
        while let Some(entry) = entries.next_entry().await? {
            // Use file_type() to avoid following symlinks out of the root.
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(prefix) || prefix.starts_with(&name) {
                shards.push(entry.path());
            }
        }
        shards.sort();
        Ok(shards)
    }
}

#[async_trait]
impl BlobStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, id: &BlobId) -> StorageResult<bool> {
        let path = self.blob_path(id).await?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, id: &BlobId) -> StorageResult<BlobMetadata> {
        let path = self.blob_path(id).await?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(Self::not_found_or_io(id))?;

        Ok(BlobMetadata {
            blob_id: id.clone(),
            length: metadata.len(),
            timestamp: metadata.modified().ok().map(OffsetDateTime::from),
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, id: &BlobId) -> StorageResult<Bytes> {
        let path = self.blob_path(id).await?;
        let data = fs::read(&path).await.map_err(Self::not_found_or_io(id))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_range(&self, id: &BlobId, start: u64, end: u64) -> StorageResult<Bytes> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        if end < start {
            return Err(StorageError::InvalidRange(format!(
                "end ({end}) < start ({start})"
            )));
        }

        let range_size = end - start;
        if range_size > MAX_RANGE_SIZE {
            return Err(StorageError::InvalidRange(format!(
                "range size {range_size} exceeds maximum {MAX_RANGE_SIZE} bytes"
            )));
        }

        let len = usize::try_from(range_size).map_err(|_| {
            StorageError::InvalidRange(format!(
                "range size {range_size} exceeds platform address space"
            ))
        })?;

        let path = self.blob_path(id).await?;
        let mut file = fs::File::open(&path)
            .await
            .map_err(Self::not_found_or_io(id))?;

        let file_len = file.metadata().await?.len();
        if end > file_len {
            return Err(StorageError::InvalidRange(format!(
                "range [{start}, {end}) exceeds blob {id} of length {file_len}"
            )));
        }

        file.seek(std::io::SeekFrom::Start(start)).await?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).await?;

        Ok(Bytes::from(buf))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, id: &BlobId, data: Bytes) -> StorageResult<()> {
        let path = self.blob_path(id).await?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a uniquely named temp file, fsync, then rename into place.
        let temp_path = path.with_file_name(format!("{TEMP_PREFIX}{}", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }

        Ok(())
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put_if_not_exists(&self, id: &BlobId, data: Bytes) -> StorageResult<bool> {
        // Check-then-write race: acceptable for pack and index blobs, whose ids
        // are unique per write. Format blob creation is guarded by the caller.
        if self.exists(id).await? {
            return Ok(false);
        }
        self.put(id, data).await?;
        Ok(true)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, id: &BlobId) -> StorageResult<()> {
        let path = self.blob_path(id).await?;
        fs::remove_file(&path)
            .await
            .map_err(Self::not_found_or_io(id))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    fn list_pages<'a>(&'a self, prefix: &str, options: ListingOptions) -> BlobPageStream<'a> {
        let root = self.root.clone();
        let prefix = prefix.to_string();
        let page_size = options.normalized_page_size();

        let stream = async_stream::try_stream! {
            let shards = Self::matching_shards(&root, &prefix).await?;
            let mut current_page = Vec::with_capacity(page_size);

            for shard in shards {
                let mut entries = match fs::read_dir(&shard).await {
                    Ok(entries) => entries,
                    // Shard removed between listing the root and reading it.
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => Err(StorageError::Io(e))?,
                };
                let mut names = Vec::new();
                while let Some(entry) = entries.next_entry().await? {
                    if !entry.file_type().await?.is_file() {
                        continue;
                    }
                    let name = entry.file_name().to_string_lossy().to_string();
                    if name.starts_with(TEMP_PREFIX) || !name.starts_with(&prefix) {
                        continue;
                    }
                    let Ok(blob_id) = BlobId::parse(&name) else {
                        tracing::debug!(file = %name, "Skipping file that is not a blob");
                        continue;
                    };
                    // Deleted between read_dir and metadata: skip it.
                    let meta = match entry.metadata().await {
                        Ok(meta) => meta,
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                        Err(e) => Err(StorageError::Io(e))?,
                    };
                    names.push(BlobMetadata {
                        blob_id,
                        length: meta.len(),
                        timestamp: meta.modified().ok().map(OffsetDateTime::from),
                    });
                }
                names.sort_by(|a, b| a.blob_id.cmp(&b.blob_id));

                for blob in names {
                    current_page.push(blob);
                    if current_page.len() >= page_size {
                        yield BlobListingPage {
                            blobs: std::mem::replace(&mut current_page, Vec::with_capacity(page_size)),
                        };
                    }
                }
            }

            if !current_page.is_empty() {
                yield BlobListingPage { blobs: current_page };
            }
        };

        Box::pin(stream)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Unavailable(format!("storage root not accessible: {e}"))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Unavailable(format!(
                "storage root is not a directory: {}",
                self.root.display()
            )));
        }

        Ok(())
    }
}
