//! Read-side content index interface.

use crate::error::IndexResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{FutureExt, Stream, TryStreamExt};
use packrat_core::{ContentId, ContentInfo, IdRange};
use std::future::Future;
use std::pin::Pin;

/// A boxed stream of content records.
pub type ContentInfoStream<'a> = Pin<Box<dyn Stream<Item = IndexResult<ContentInfo>> + Send + 'a>>;

/// Which content records to iterate.
#[derive(Clone, Debug, Default)]
pub struct IterateOptions {
    /// Only records whose id falls in this range.
    pub range: IdRange,
    /// Include soft-deleted records.
    pub include_deleted: bool,
}

/// Read access to content records and their bytes.
#[async_trait]
pub trait ContentReader: Send + Sync {
    /// Look up the current record for a content id, deleted or not.
    async fn content_info(&self, id: &ContentId) -> IndexResult<ContentInfo>;

    /// Fetch and verify a content's bytes.
    async fn get_content(&self, id: &ContentId) -> IndexResult<Bytes>;

    /// Stream records matching the options in id order.
    fn contents<'a>(&'a self, options: &IterateOptions) -> ContentInfoStream<'a>;
}

/// Concurrent iteration over `ContentReader::contents()`.
///
/// DO NOT IMPLEMENT THIS TRAIT MANUALLY. It is provided for every
/// `ContentReader` through a blanket implementation.
pub trait ContentReaderExt: ContentReader {
    /// Visit every matching record with up to `parallel` visits in flight.
    ///
    /// Stops at the first iteration or visitor error. Each record is visited
    /// exactly once; the order of completion is unspecified.
    fn iterate_contents<'a, F, Fut>(
        &'a self,
        options: &IterateOptions,
        parallel: usize,
        visit: F,
    ) -> BoxFuture<'a, IndexResult<()>>
    where
        F: Fn(ContentInfo) -> Fut + Send + Sync + 'a,
        Fut: Future<Output = IndexResult<()>> + Send + 'a,
    {
        let stream = self.contents(options);
        async move {
            stream
                .try_for_each_concurrent(parallel.max(1), |info| visit(info))
                .await
        }
        .boxed()
    }
}

impl<T: ContentReader + ?Sized> ContentReaderExt for T {}
