// Concurrent iteration tests for the content index.

use bytes::Bytes;
use packrat_core::{ContentId, IdRange};
use packrat_index::{ContentManager, ContentReaderExt, IndexError, IterateOptions};
use packrat_storage::InMemoryBackend;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::Duration;

async fn populated(count: usize, prefix: Option<char>) -> ContentManager {
    let store = Arc::new(InMemoryBackend::new());
    let manager = ContentManager::open(store).await.unwrap();
    for i in 0..count {
        manager
            .write_content(Bytes::from(format!("content-{i}")), prefix)
            .await
            .unwrap();
    }
    manager.flush(None).await.unwrap();
    manager
}

#[tokio::test]
async fn test_iteration_visits_every_record_once() {
    let manager = populated(500, None).await;
    let visited = Arc::new(std::sync::Mutex::new(Vec::new()));

    manager
        .iterate_contents(&IterateOptions::default(), 8, |info| {
            let visited = visited.clone();
            async move {
                visited.lock().unwrap().push(info.content_id);
                Ok(())
            }
        })
        .await
        .unwrap();

    let mut visited = visited.lock().unwrap().clone();
    assert_eq!(visited.len(), 500);
    visited.sort();
    visited.dedup();
    assert_eq!(visited.len(), 500);
}

#[tokio::test]
async fn test_iteration_respects_parallelism() {
    let manager = populated(64, None).await;
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    manager
        .iterate_contents(&IterateOptions::default(), 4, |_| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();

    let peak = peak.load(Ordering::SeqCst);
    assert!(peak <= 4, "at most 4 visits may run at once, saw {peak}");
    assert!(peak > 1, "visits should overlap, saw {peak}");
}

#[tokio::test]
async fn test_iteration_filters_by_range() {
    let manager = populated(20, Some('k')).await;

    let count = Arc::new(AtomicUsize::new(0));
    let options = IterateOptions {
        range: IdRange::prefixed("k"),
        include_deleted: false,
    };
    manager
        .iterate_contents(&options, 2, |info| {
            let count = count.clone();
            async move {
                assert_eq!(info.content_id.prefix(), Some('k'));
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 20);

    let none = IterateOptions {
        range: IdRange::prefixed("m"),
        include_deleted: true,
    };
    let visited = Arc::new(AtomicUsize::new(0));
    manager
        .iterate_contents(&none, 2, |_| {
            let visited = visited.clone();
            async move {
                visited.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();
    assert_eq!(visited.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_visitor_error_aborts_iteration() {
    let manager = populated(100, None).await;
    let target = ContentId::for_data(None, b"content-42").unwrap();

    let result = manager
        .iterate_contents(&IterateOptions::default(), 1, |info| {
            let target = target.clone();
            async move {
                if info.content_id == target {
                    return Err(IndexError::NotFound(target.to_string()));
                }
                Ok(())
            }
        })
        .await;

    assert!(matches!(result, Err(IndexError::NotFound(_))));
}
