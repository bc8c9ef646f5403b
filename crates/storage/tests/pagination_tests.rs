// Pagination tests for blob listings across backends.

mod common;

use bytes::Bytes;
use common::{MockLargeListingBackend, pack_id, seeded_bytes};
use futures::{StreamExt, TryStreamExt};
use packrat_core::BlobMetadata;
use packrat_storage::traits::{BlobStore, BlobStoreListExt, ListingOptions, MAX_PAGE_SIZE};
use packrat_storage::{FilesystemBackend, InMemoryBackend};
use std::collections::HashSet;
use tempfile::TempDir;

async fn assert_paged_listing(backend: &dyn BlobStore, total: usize) {
    for page_size in [100, 500, 1000] {
        let mut stream = backend.list_pages("p", ListingOptions::new(page_size));
        let mut seen = HashSet::new();
        let mut pages = 0;

        while let Some(page) = stream.next().await {
            let page = page.unwrap();
            assert!(
                page.blobs.len() <= page_size,
                "page {pages} has {} blobs, exceeds page_size {page_size}",
                page.blobs.len()
            );
            for blob in page.blobs {
                assert!(seen.insert(blob.blob_id.clone()), "duplicate blob {}", blob.blob_id);
            }
            pages += 1;
        }

        assert_eq!(seen.len(), total, "page_size={page_size}");
        assert_eq!(pages, total.div_ceil(page_size), "page_size={page_size}");
    }
}

#[tokio::test]
async fn test_filesystem_pagination_has_no_duplicates() {
    let temp_dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(temp_dir.path()).await.unwrap();

    for i in 0..1500 {
        backend.put(&pack_id(i), Bytes::from(vec![i as u8])).await.unwrap();
    }

    assert_paged_listing(&backend, 1500).await;
}

#[tokio::test]
async fn test_memory_pagination_has_no_duplicates() {
    let backend = InMemoryBackend::new();
    for i in 0..1500 {
        backend.put(&pack_id(i), Bytes::from(vec![i as u8])).await.unwrap();
    }

    assert_paged_listing(&backend, 1500).await;
}

#[tokio::test]
async fn test_listing_reports_blob_lengths() {
    let temp_dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(temp_dir.path()).await.unwrap();

    for i in 0..20 {
        backend.put(&pack_id(i), seeded_bytes(i as u64, i * 10)).await.unwrap();
    }

    let blobs: Vec<BlobMetadata> = backend.list_stream("p", None).try_collect().await.unwrap();
    assert_eq!(blobs.len(), 20);
    for blob in blobs {
        let index: usize = blob.blob_id.as_str()[1..].parse().unwrap();
        assert_eq!(blob.length, (index * 10) as u64);
    }
}

#[tokio::test]
async fn test_oversized_page_request_is_clamped() {
    let mock = MockLargeListingBackend::new(MAX_PAGE_SIZE * 2 + 1);

    let mut stream = mock.list_pages("", ListingOptions::new(usize::MAX));
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.blobs.len(), MAX_PAGE_SIZE);

    let mut rest = 0;
    while let Some(page) = stream.next().await {
        rest += page.unwrap().blobs.len();
    }
    assert_eq!(rest, MAX_PAGE_SIZE + 1);
}

#[tokio::test]
async fn test_prefix_spanning_shards() {
    let temp_dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(temp_dir.path()).await.unwrap();

    // Ids p00000..p00199 all live in shard "p00".
    for i in 0..200 {
        backend.put(&pack_id(i), Bytes::from_static(b"x")).await.unwrap();
    }
    let count = backend.list_blobs("p001", |_| Ok(())).await.unwrap();
    assert_eq!(count, 100);
    let count = backend.list_blobs("p0", |_| Ok(())).await.unwrap();
    assert_eq!(count, 200);
    let count = backend.list_blobs("x", |_| Ok(())).await.unwrap();
    assert_eq!(count, 0);
}
