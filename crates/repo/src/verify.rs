//! Content verification.
//!
//! Cross-checks the content index against the blob store. Bounds mode lists
//! every blob once and checks that each record's range fits in its pack
//! blob. Full mode re-reads and hashes every record's bytes instead.

use crate::metrics::{CONTENTS_VERIFIED, VERIFY_BLOBS_LISTED};
use packrat_core::{BlobId, BlobMetadata, ContentId, ContentInfo, IdRange};
use packrat_index::{ContentReader, ContentReaderExt, IndexError, IterateOptions};
use packrat_storage::{BlobStore, BlobStoreListExt, StorageError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Default number of concurrent verification workers.
pub const DEFAULT_PARALLEL: usize = 16;

const BLOB_LIST_PROGRESS_INTERVAL: usize = 10_000;
const CONTENT_PROGRESS_INTERVAL: u64 = 100_000;

/// Verification options.
#[derive(Clone, Debug)]
pub struct VerifyOptions {
    /// Re-read every content instead of checking bounds.
    pub full: bool,
    /// Maximum concurrent checks. Values below 1 are treated as 1.
    pub parallel: usize,
    /// Also check soft-deleted records.
    pub include_deleted: bool,
    /// Only check records in this id range.
    pub range: IdRange,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            full: false,
            parallel: DEFAULT_PARALLEL,
            include_deleted: false,
            range: IdRange::all(),
        }
    }
}

/// Counts from a completed run with no failures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub total: u64,
    pub success: u64,
    pub errors: u64,
}

/// Why a single content record failed verification.
#[derive(Debug, Error)]
pub enum RecordFailure {
    #[error("content {content_id} is invalid")]
    InvalidContent {
        content_id: ContentId,
        #[source]
        source: IndexError,
    },

    #[error("content {content_id} depends on missing blob {blob_id}")]
    MissingBlob { content_id: ContentId, blob_id: BlobId },

    #[error("content {content_id} out of bounds of its pack blob {blob_id}")]
    OutOfBounds {
        content_id: ContentId,
        blob_id: BlobId,
        end_offset: Option<u64>,
        blob_length: u64,
    },
}

/// Verification run errors.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("unable to list blobs")]
    BlobListing(#[source] StorageError),

    #[error("iterate contents")]
    Iteration(#[source] IndexError),

    #[error("encountered {errors} errors")]
    Failed { errors: u64, success: u64, total: u64 },

    #[error("verification cancelled")]
    Cancelled,
}

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    success: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: Result<(), RecordFailure>) {
        match outcome {
            Ok(()) => {
                self.success.fetch_add(1, Ordering::Relaxed);
                CONTENTS_VERIFIED.with_label_values(&["success"]).inc();
            }
            Err(failure) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                CONTENTS_VERIFIED.with_label_values(&["error"]).inc();
                match &failure {
                    RecordFailure::InvalidContent { source, .. } => {
                        error!(cause = %source, "{failure}");
                    }
                    _ => error!("{failure}"),
                }
            }
        }

        // Milestone logs are progress hints; concurrent workers may race past them.
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;
        if total % CONTENT_PROGRESS_INTERVAL == 0 {
            info!(
                total,
                errors = self.errors.load(Ordering::Relaxed),
                "Verified contents"
            );
        }
    }

    fn report(&self) -> VerifyReport {
        VerifyReport {
            total: self.total.load(Ordering::SeqCst),
            success: self.success.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
        }
    }
}

/// Bounds check of one record against the blob map.
fn check_bounds(
    blobs: &HashMap<BlobId, BlobMetadata>,
    info: &ContentInfo,
) -> Result<(), RecordFailure> {
    let Some(blob) = blobs.get(&info.pack_blob_id) else {
        return Err(RecordFailure::MissingBlob {
            content_id: info.content_id.clone(),
            blob_id: info.pack_blob_id.clone(),
        });
    };
    if !info.fits_within(blob.length) {
        return Err(RecordFailure::OutOfBounds {
            content_id: info.content_id.clone(),
            blob_id: info.pack_blob_id.clone(),
            end_offset: info.end_offset(),
            blob_length: blob.length,
        });
    }
    Ok(())
}

/// Verifies content records against the blob store.
pub struct ContentVerifier<'a> {
    reader: &'a dyn ContentReader,
    store: &'a dyn BlobStore,
}

impl<'a> ContentVerifier<'a> {
    pub fn new(reader: &'a dyn ContentReader, store: &'a dyn BlobStore) -> Self {
        Self { reader, store }
    }

    /// Verify every record matching the options.
    ///
    /// Per-record failures are logged and counted without stopping the run.
    /// Listing and iteration failures abort it. Cancelling the token aborts
    /// listing, iteration and in-flight fetches with `VerifyError::Cancelled`.
    pub async fn run(
        &self,
        options: &VerifyOptions,
        cancel: &CancellationToken,
    ) -> Result<VerifyReport, VerifyError> {
        let blob_map = if options.full {
            None
        } else {
            let listing = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(VerifyError::Cancelled),
                listing = self.list_blob_map() => listing,
            };
            Some(listing.map_err(VerifyError::BlobListing)?)
        };

        let counters = Counters::default();
        let iterate_options = IterateOptions {
            range: options.range.clone(),
            include_deleted: options.include_deleted,
        };
        let blob_map = blob_map.as_ref();
        let counters_ref = &counters;
        let reader = self.reader;

        let iteration = self.reader.iterate_contents(
            &iterate_options,
            options.parallel.max(1),
            move |info| async move {
                let outcome = match blob_map {
                    Some(blobs) => check_bounds(blobs, &info),
                    None => match reader.get_content(&info.content_id).await {
                        // Bytes are only validated, never kept.
                        Ok(_) => Ok(()),
                        Err(source) => Err(RecordFailure::InvalidContent {
                            content_id: info.content_id.clone(),
                            source,
                        }),
                    },
                };
                counters_ref.record(outcome);
                Ok(())
            },
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(VerifyError::Cancelled),
            result = iteration => result,
        };
        result.map_err(VerifyError::Iteration)?;

        let report = counters.report();
        info!(
            total = report.total,
            errors = report.errors,
            "Finished verifying {} contents, found {} errors",
            report.total,
            report.errors
        );

        if report.errors > 0 {
            return Err(VerifyError::Failed {
                errors: report.errors,
                success: report.success,
                total: report.total,
            });
        }
        Ok(report)
    }

    async fn list_blob_map(&self) -> Result<HashMap<BlobId, BlobMetadata>, StorageError> {
        info!("Listing blobs...");
        let mut blobs = HashMap::new();
        self.store
            .list_blobs("", |blob| {
                blobs.insert(blob.blob_id.clone(), blob);
                if blobs.len() % BLOB_LIST_PROGRESS_INTERVAL == 0 {
                    info!(count = blobs.len(), "Listing blobs...");
                }
                Ok(())
            })
            .await?;
        VERIFY_BLOBS_LISTED.inc_by(blobs.len() as u64);
        info!(count = blobs.len(), "Listed blobs");
        Ok(blobs)
    }
}
