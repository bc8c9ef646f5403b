//! Repository handles.

use crate::credentials::Credentials;
use crate::error::{RepoError, RepoResult};
use crate::format::FormatBlob;
use crate::maintenance::params::{MaintenanceParams, write_params};
use crate::remote::RemoteRepository;
use bytes::Bytes;
use packrat_core::config::{ConnectionConfig, RepositoryConfig};
use packrat_core::{BlobId, ContentId, ContentInfo, FORMAT_BLOB_ID};
use packrat_index::{ContentManager, ContentReader};
use packrat_storage::BlobStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// An open repository.
///
/// Capabilities that need exclusive access to the blob store (write
/// sessions, maintenance, verification) are only reachable through the
/// `Direct` variant.
#[derive(Clone)]
pub enum Repository {
    Direct(DirectRepository),
    Remote(RemoteRepository),
}

impl Repository {
    /// Initialize a new repository in an empty blob store.
    ///
    /// Writes the format blob and the maintenance parameters naming `owner`
    /// as the maintenance owner.
    pub async fn create(
        store: Arc<dyn BlobStore>,
        password: &str,
        owner: &str,
    ) -> RepoResult<FormatBlob> {
        let format = FormatBlob::new(password);
        let format_id = BlobId::parse(FORMAT_BLOB_ID)?;
        if !store.put_if_not_exists(&format_id, format.encode()?).await? {
            return Err(RepoError::AlreadyInitialized);
        }
        write_params(store.as_ref(), &MaintenanceParams::new(owner)).await?;

        info!(unique_id = %format.unique_id, owner, "Created repository");
        Ok(format)
    }

    /// Open the repository described by the configuration.
    pub async fn open(config: &RepositoryConfig, credentials: &Credentials) -> RepoResult<Self> {
        let identity = config.client_identity();
        match &config.connection {
            ConnectionConfig::Filesystem { path } => {
                let password = credentials
                    .password
                    .as_deref()
                    .ok_or(RepoError::MissingPassword)?;
                let store = packrat_storage::open_filesystem(path, false).await?;
                let direct =
                    DirectRepository::open(store, password, identity, config.read_only).await?;
                Ok(Repository::Direct(direct))
            }
            ConnectionConfig::Server { url, token } => {
                let remote = RemoteRepository::connect(url, token.as_deref(), identity).await?;
                Ok(Repository::Remote(remote))
            }
        }
    }

    /// The direct handle, if this repository has one.
    pub fn as_direct(&self) -> Option<&DirectRepository> {
        match self {
            Repository::Direct(direct) => Some(direct),
            Repository::Remote(_) => None,
        }
    }

    pub fn is_read_only(&self) -> bool {
        match self {
            Repository::Direct(direct) => direct.is_read_only(),
            Repository::Remote(remote) => remote.is_read_only(),
        }
    }

    /// `user@host` identity of this client.
    pub fn client_identity(&self) -> &str {
        match self {
            Repository::Direct(direct) => direct.client_identity(),
            Repository::Remote(remote) => remote.client_identity(),
        }
    }

    pub async fn content_info(&self, id: &ContentId) -> RepoResult<ContentInfo> {
        match self {
            Repository::Direct(direct) => Ok(direct.contents().content_info(id).await?),
            Repository::Remote(remote) => remote.content_info(id).await,
        }
    }

    pub async fn get_content(&self, id: &ContentId) -> RepoResult<Bytes> {
        match self {
            Repository::Direct(direct) => Ok(direct.contents().get_content(id).await?),
            Repository::Remote(remote) => remote.get_content(id).await,
        }
    }

    /// Close the handle. Closing twice fails with `AlreadyClosed`.
    pub async fn close(&self) -> RepoResult<()> {
        match self {
            Repository::Direct(direct) => direct.close().await,
            Repository::Remote(remote) => remote.close(),
        }
    }
}

struct DirectInner {
    store: Arc<dyn BlobStore>,
    contents: ContentManager,
    format: FormatBlob,
    identity: String,
    read_only: bool,
    closed: AtomicBool,
    writer: Mutex<()>,
}

/// A repository opened directly on its blob store.
#[derive(Clone)]
pub struct DirectRepository {
    inner: Arc<DirectInner>,
}

impl DirectRepository {
    /// Open an initialized repository on the given store.
    pub async fn open(
        store: Arc<dyn BlobStore>,
        password: &str,
        identity: String,
        read_only: bool,
    ) -> RepoResult<Self> {
        let format_id = BlobId::parse(FORMAT_BLOB_ID)?;
        let data = match store.get(&format_id).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                return Err(RepoError::NotInitialized(format!(
                    "no format blob in {} store",
                    store.backend_name()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let format = FormatBlob::decode(&data)?;
        format.verify_password(password)?;

        let contents = ContentManager::open(store.clone()).await?;
        debug!(unique_id = %format.unique_id, identity = %identity, read_only, "Opened repository");

        Ok(Self {
            inner: Arc::new(DirectInner {
                store,
                contents,
                format,
                identity,
                read_only,
                closed: AtomicBool::new(false),
                writer: Mutex::new(()),
            }),
        })
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.inner.store
    }

    /// The content index and write buffer.
    pub fn contents(&self) -> &ContentManager {
        &self.inner.contents
    }

    pub fn unique_id(&self) -> Uuid {
        self.inner.format.unique_id
    }

    pub fn format(&self) -> &FormatBlob {
        &self.inner.format
    }

    pub fn client_identity(&self) -> &str {
        &self.inner.identity
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.read_only
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn writer_lock(&self) -> &Mutex<()> {
        &self.inner.writer
    }

    pub async fn close(&self) -> RepoResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Err(RepoError::AlreadyClosed);
        }
        if self.inner.contents.has_pending().await {
            warn!("Closing repository with uncommitted writes; discarding them");
            self.inner.contents.discard_pending().await;
        }
        debug!(unique_id = %self.unique_id(), "Closed repository");
        Ok(())
    }
}
