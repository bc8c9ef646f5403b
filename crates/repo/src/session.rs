//! Single-writer write sessions.
//!
//! A write session brackets a mutation: buffered writes are flushed when the
//! wrapped action succeeds and discarded when it fails. Only one session may
//! be open per repository; a second session waits for the first to finish.
//! Opening a session from inside a running session on the same task fails
//! fast with `SessionConflict` instead of deadlocking.

use crate::error::{RepoError, RepoResult};
use crate::metrics::{ACTIVE_WRITE_SESSIONS, BYTES_UPLOADED, WRITE_SESSIONS};
use crate::repository::{DirectRepository, Repository};
use bytes::Bytes;
use packrat_core::ContentId;
use packrat_index::{ContentManager, UploadCallback};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

tokio::task_local! {
    static ACTIVE_SESSION: String;
}

/// Options for opening a write session.
#[derive(Clone)]
pub struct WriteSessionOptions {
    /// What the session is for; used in logs and metrics.
    pub purpose: String,
    /// Called with the number of bytes uploaded on commit.
    pub on_upload: Option<UploadCallback>,
}

impl WriteSessionOptions {
    pub fn new(purpose: impl Into<String>) -> Self {
        Self {
            purpose: purpose.into(),
            on_upload: None,
        }
    }

    pub fn with_upload_callback(mut self, on_upload: UploadCallback) -> Self {
        self.on_upload = Some(on_upload);
        self
    }
}

/// Write capability handed to the action running inside a session.
#[derive(Clone)]
pub struct DirectRepositoryWriter {
    repo: DirectRepository,
    purpose: Arc<str>,
}

impl DirectRepositoryWriter {
    pub fn repository(&self) -> &DirectRepository {
        &self.repo
    }

    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    pub fn contents(&self) -> &ContentManager {
        self.repo.contents()
    }

    /// Buffer a content; it becomes visible to iteration on commit.
    pub async fn write_content(&self, data: Bytes, prefix: Option<char>) -> RepoResult<ContentId> {
        Ok(self.repo.contents().write_content(data, prefix).await?)
    }

    /// Buffer a soft-delete of a content.
    pub async fn delete_content(&self, id: &ContentId) -> RepoResult<()> {
        Ok(self.repo.contents().delete_content(id).await?)
    }
}

/// Keeps `ACTIVE_WRITE_SESSIONS` raised while a session runs, including when
/// the session future is dropped or unwinds.
struct ActiveSessionGauge;

impl ActiveSessionGauge {
    fn enter() -> Self {
        ACTIVE_WRITE_SESSIONS.inc();
        Self
    }
}

impl Drop for ActiveSessionGauge {
    fn drop(&mut self) {
        ACTIVE_WRITE_SESSIONS.dec();
    }
}

/// Purpose of the session running on the current task, if any.
pub fn active_session_purpose() -> Option<String> {
    ACTIVE_SESSION.try_with(|purpose| purpose.clone()).ok()
}

/// Run `f` inside a write session on a direct repository.
///
/// Commits buffered writes when `f` returns `Ok`, discards them when it
/// returns `Err`. A commit failure becomes the session's error.
pub async fn direct_write_session<T, E, F, Fut>(
    rep: &DirectRepository,
    options: WriteSessionOptions,
    f: F,
) -> Result<T, E>
where
    F: FnOnce(DirectRepositoryWriter) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<RepoError>,
{
    let purpose = options.purpose;
    if let Some(active) = active_session_purpose() {
        return Err(RepoError::SessionConflict {
            active,
            requested: purpose,
        }
        .into());
    }
    if rep.is_closed() {
        return Err(RepoError::AlreadyClosed.into());
    }
    if rep.is_read_only() {
        return Err(RepoError::ReadOnly.into());
    }

    let _guard = rep.writer_lock().lock().await;
    let _active = ActiveSessionGauge::enter();
    // Left behind by a session whose future was dropped before it finished.
    if rep.contents().has_pending().await {
        warn!(purpose = %purpose, "Discarding writes of an abandoned session");
        rep.contents().discard_pending().await;
    }
    debug!(purpose = %purpose, "Write session started");

    let writer = DirectRepositoryWriter {
        repo: rep.clone(),
        purpose: Arc::from(purpose.as_str()),
    };
    let result = ACTIVE_SESSION.scope(purpose.clone(), f(writer)).await;

    match result {
        Ok(value) => match rep.contents().flush(options.on_upload.as_ref()).await {
            Ok(stats) => {
                BYTES_UPLOADED.inc_by(stats.bytes_written);
                debug!(
                    purpose = %purpose,
                    contents_written = stats.contents_written,
                    contents_deleted = stats.contents_deleted,
                    "Write session committed"
                );
                WRITE_SESSIONS.with_label_values(&[purpose.as_str(), "committed"]).inc();
                Ok(value)
            }
            Err(e) => {
                warn!(purpose = %purpose, error = %e, "Write session commit failed");
                rep.contents().discard_pending().await;
                WRITE_SESSIONS.with_label_values(&[purpose.as_str(), "commit_failed"]).inc();
                Err(RepoError::from(e).into())
            }
        },
        Err(e) => {
            rep.contents().discard_pending().await;
            debug!(purpose = %purpose, "Write session aborted");
            WRITE_SESSIONS.with_label_values(&[purpose.as_str(), "aborted"]).inc();
            Err(e)
        }
    }
}

/// Run `f` inside a write session on any repository handle.
///
/// Only direct repositories support writes; remote handles fail with
/// `NotSupported`.
pub async fn write_session<T, E, F, Fut>(
    rep: &Repository,
    options: WriteSessionOptions,
    f: F,
) -> Result<T, E>
where
    F: FnOnce(DirectRepositoryWriter) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<RepoError>,
{
    match rep.as_direct() {
        Some(direct) => direct_write_session(direct, options, f).await,
        None => Err(RepoError::NotSupported(format!(
            "write session {:?} requires a direct repository",
            options.purpose
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packrat_index::ContentReader;
    use packrat_storage::{BlobStore, InMemoryBackend};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::Duration;

    async fn repo() -> DirectRepository {
        let store: Arc<dyn BlobStore> = Arc::new(InMemoryBackend::new());
        Repository::create(store.clone(), "pw", "me@host").await.unwrap();
        DirectRepository::open(store, "pw", "me@host".to_string(), false)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_commit_on_success() {
        let rep = repo().await;
        let uploaded = Arc::new(AtomicU64::new(0));
        let counter = uploaded.clone();
        let options = WriteSessionOptions::new("test").with_upload_callback(Arc::new(move |n| {
            counter.fetch_add(n, Ordering::SeqCst);
        }));

        let id = direct_write_session(&rep, options, |w| async move {
            w.write_content(Bytes::from("committed"), None).await
        })
        .await
        .unwrap();

        assert_eq!(rep.contents().get_content(&id).await.unwrap(), Bytes::from("committed"));
        assert!(!rep.contents().has_pending().await);
        assert_eq!(uploaded.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn test_discard_on_error() {
        let rep = repo().await;
        let result: RepoResult<()> =
            direct_write_session(&rep, WriteSessionOptions::new("test"), |w| async move {
                w.write_content(Bytes::from("doomed"), None).await?;
                Err(RepoError::NotSupported("fail on purpose".to_string()))
            })
            .await;

        assert!(matches!(result, Err(RepoError::NotSupported(_))));
        let id = ContentId::for_data(None, b"doomed").unwrap();
        assert!(rep.contents().content_info(&id).await.is_err());
        assert!(!rep.contents().has_pending().await);
    }

    #[tokio::test]
    async fn test_nested_session_is_rejected() {
        let rep = repo().await;
        let inner_rep = rep.clone();
        let result: RepoResult<()> =
            direct_write_session(&rep, WriteSessionOptions::new("outer"), |_w| async move {
                direct_write_session(&inner_rep, WriteSessionOptions::new("inner"), |_w| async {
                    Ok::<_, RepoError>(())
                })
                .await
            })
            .await;

        match result {
            Err(RepoError::SessionConflict { active, requested }) => {
                assert_eq!(active, "outer");
                assert_eq!(requested, "inner");
            }
            other => panic!("expected session conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sessions_on_other_tasks_wait_their_turn() {
        let rep = repo().await;
        let in_session = Arc::new(AtomicU64::new(0));
        let mut handles = Vec::new();

        for i in 0..4 {
            let rep = rep.clone();
            let in_session = in_session.clone();
            handles.push(tokio::spawn(async move {
                direct_write_session(&rep, WriteSessionOptions::new("concurrent"), |w| async move {
                    assert_eq!(in_session.fetch_add(1, Ordering::SeqCst), 0);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    w.write_content(Bytes::from(format!("task {i}")), None).await?;
                    in_session.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, RepoError>(())
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(rep.contents().index_blob_count().await, 4);
    }

    #[tokio::test]
    async fn test_read_only_and_closed_reject_sessions() {
        let store: Arc<dyn BlobStore> = Arc::new(InMemoryBackend::new());
        Repository::create(store.clone(), "pw", "me@host").await.unwrap();
        let ro = DirectRepository::open(store, "pw", "me@host".to_string(), true)
            .await
            .unwrap();
        let result: RepoResult<()> =
            direct_write_session(&ro, WriteSessionOptions::new("test"), |_| async { Ok(()) }).await;
        assert!(matches!(result, Err(RepoError::ReadOnly)));

        let rep = repo().await;
        rep.close().await.unwrap();
        let result: RepoResult<()> =
            direct_write_session(&rep, WriteSessionOptions::new("test"), |_| async { Ok(()) }).await;
        assert!(matches!(result, Err(RepoError::AlreadyClosed)));
    }
}
