use bytes::Bytes;
use packrat_core::{BlobId, ContentId, ContentInfo};
use packrat_repo::{DirectRepository, Repository, WriteSessionOptions, direct_write_session};
use packrat_storage::{BlobStore, InMemoryBackend};
use std::sync::Arc;
use time::OffsetDateTime;

/// Pack blob id at the given index.
#[allow(dead_code)]
pub fn pack_id(i: usize) -> BlobId {
    BlobId::parse(&format!("p{i:05}")).expect("pack id is valid")
}

/// A live content record for `data` stored at the given pack range.
#[allow(dead_code)]
pub fn content_record(data: &str, pack: &BlobId, offset: u64, length: u64) -> ContentInfo {
    ContentInfo {
        content_id: ContentId::for_data(None, data.as_bytes()).expect("content id is valid"),
        pack_blob_id: pack.clone(),
        pack_offset: offset,
        packed_length: length,
        deleted: false,
        timestamp: OffsetDateTime::now_utc(),
    }
}

/// An in-memory repository holding `count` committed contents.
#[allow(dead_code)]
pub async fn repository_with_contents(count: usize) -> (Arc<dyn BlobStore>, DirectRepository) {
    let store: Arc<dyn BlobStore> = Arc::new(InMemoryBackend::new());
    Repository::create(store.clone(), "test-password", "tester@testhost")
        .await
        .expect("create repository");
    let repo = DirectRepository::open(
        store.clone(),
        "test-password",
        "tester@testhost".to_string(),
        false,
    )
    .await
    .expect("open repository");

    direct_write_session(&repo, WriteSessionOptions::new("fixture"), |w| async move {
        for i in 0..count {
            w.write_content(Bytes::from(format!("content {i}")), None).await?;
        }
        Ok::<_, packrat_repo::RepoError>(())
    })
    .await
    .expect("populate repository");

    (store, repo)
}
