//! Repository maintenance.
//!
//! Maintenance compacts the content index and removes data that no longer
//! backs any content. Only the owner named in the maintenance parameters may
//! run it, which keeps cooperating clients from running it concurrently.

pub mod error;
pub mod params;
pub mod safety;

pub use error::{MaintenanceError, MaintenanceResult};
pub use params::{MaintenanceParams, MaintenanceSchedule, RunInfo};
pub use safety::{SafetyLevel, SafetyParams};

use crate::metrics::{MAINTENANCE_BYTES_RECLAIMED, MAINTENANCE_DURATION, MAINTENANCE_RUNS};
use crate::repository::DirectRepository;
use crate::session::DirectRepositoryWriter;
use packrat_core::{BlobMetadata, PACK_BLOB_PREFIX};
use packrat_storage::BlobStoreListExt;
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Quick maintenance compacts the index once it has more index blobs than this.
pub const MAX_INDEX_BLOBS_BEFORE_COMPACTION: usize = 16;

/// Which maintenance to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceMode {
    /// Whatever is due: full, else quick, else nothing.
    Auto,
    Quick,
    Full,
}

impl fmt::Display for MaintenanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MaintenanceMode::Auto => "auto",
            MaintenanceMode::Quick => "quick",
            MaintenanceMode::Full => "full",
        })
    }
}

/// What a maintenance run did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceStats {
    pub index_blobs_compacted: usize,
    pub deleted_entries_dropped: usize,
    pub pack_blobs_deleted: usize,
    pub bytes_reclaimed: u64,
}

/// Outcome of `run`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Auto mode found nothing due.
    NotDue,
    Completed {
        mode: MaintenanceMode,
        stats: MaintenanceStats,
    },
}

/// Maintenance parameters and schedule, for display.
#[derive(Clone, Debug, Serialize)]
pub struct MaintenanceInfo {
    pub params: Option<MaintenanceParams>,
    pub schedule: MaintenanceSchedule,
}

/// Read the maintenance parameters and schedule.
pub async fn info(rep: &DirectRepository) -> MaintenanceResult<MaintenanceInfo> {
    let store = rep.store().as_ref();
    Ok(MaintenanceInfo {
        params: params::read_params(store).await?,
        schedule: params::read_schedule(store).await?,
    })
}

/// Make `owner` the maintenance owner.
pub async fn set_owner(writer: &DirectRepositoryWriter, owner: &str) -> MaintenanceResult<()> {
    let store = writer.repository().store().as_ref();
    let mut current = params::read_params(store)
        .await?
        .unwrap_or_else(|| MaintenanceParams::new(owner));
    let previous = std::mem::replace(&mut current.owner, owner.to_string());
    params::write_params(store, &current).await?;
    info!(previous = %previous, owner, "Changed maintenance owner");
    Ok(())
}

/// Run maintenance inside a write session.
///
/// Fails with `NotOwned` unless this client owns maintenance or `force` is
/// set. `MaintenanceMode::Auto` runs full maintenance when due, else quick
/// maintenance when due, else nothing.
pub async fn run(
    writer: &DirectRepositoryWriter,
    mode: MaintenanceMode,
    force: bool,
    safety: SafetyLevel,
) -> MaintenanceResult<RunOutcome> {
    let rep = writer.repository();
    let store = rep.store().as_ref();
    let me = rep.client_identity().to_string();

    let params = params::read_params(store)
        .await?
        .ok_or_else(|| MaintenanceError::InvalidState("maintenance parameters missing".to_string()))?;
    if params.owner != me && !force {
        return Err(MaintenanceError::NotOwned {
            owner: params.owner,
            me,
        });
    }

    // Other clients may have committed since this handle opened.
    rep.contents().reload().await?;

    let mut schedule = params::read_schedule(store).await?;
    let start = OffsetDateTime::now_utc();
    let resolved = match mode {
        MaintenanceMode::Auto if schedule.full_due(start) => MaintenanceMode::Full,
        MaintenanceMode::Auto if schedule.quick_due(start) => MaintenanceMode::Quick,
        MaintenanceMode::Auto => {
            debug!("No maintenance due");
            return Ok(RunOutcome::NotDue);
        }
        explicit => explicit,
    };

    info!(mode = %resolved, safety = %safety, owner = %params.owner, "Running maintenance");
    let timer = Instant::now();
    let result = match resolved {
        MaintenanceMode::Full => run_full(rep, safety, start).await,
        _ => run_quick(rep).await,
    };
    let end = OffsetDateTime::now_utc();
    MAINTENANCE_DURATION.observe(timer.elapsed().as_secs_f64());

    schedule.record_run(
        resolved,
        RunInfo {
            start,
            end,
            success: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
        },
    );
    if result.is_ok() {
        schedule.next_quick = Some(end + params.quick_interval());
        if resolved == MaintenanceMode::Full {
            schedule.next_full = Some(end + params.full_interval());
        }
    }

    let outcome_label = if result.is_ok() { "success" } else { "error" };
    MAINTENANCE_RUNS
        .with_label_values(&[resolved.to_string().as_str(), outcome_label])
        .inc();

    match result {
        Ok(stats) => {
            params::write_schedule(store, &schedule).await?;
            info!(
                mode = %resolved,
                index_blobs_compacted = stats.index_blobs_compacted,
                deleted_entries_dropped = stats.deleted_entries_dropped,
                pack_blobs_deleted = stats.pack_blobs_deleted,
                bytes_reclaimed = stats.bytes_reclaimed,
                "Maintenance finished"
            );
            Ok(RunOutcome::Completed {
                mode: resolved,
                stats,
            })
        }
        Err(e) => {
            if let Err(save_err) = params::write_schedule(store, &schedule).await {
                warn!(error = %save_err, "Failed to record failed maintenance run");
            }
            Err(e)
        }
    }
}

async fn run_quick(rep: &DirectRepository) -> MaintenanceResult<MaintenanceStats> {
    let mut stats = MaintenanceStats::default();
    let index_blobs = rep.contents().index_blob_count().await;
    if index_blobs > MAX_INDEX_BLOBS_BEFORE_COMPACTION {
        let compacted = rep.contents().compact(None).await?;
        stats.index_blobs_compacted = compacted.index_blobs_compacted;
    } else {
        debug!(index_blobs, "Index compaction not needed");
    }
    Ok(stats)
}

async fn run_full(
    rep: &DirectRepository,
    safety: SafetyLevel,
    now: OffsetDateTime,
) -> MaintenanceResult<MaintenanceStats> {
    let limits = safety.params();
    let mut stats = MaintenanceStats::default();

    let compacted = rep
        .contents()
        .compact(Some(now - limits.drop_deleted_age))
        .await?;
    stats.index_blobs_compacted = compacted.index_blobs_compacted;
    stats.deleted_entries_dropped = compacted.deleted_entries_dropped;

    let referenced = rep.contents().referenced_packs().await;
    let mut candidates: Vec<BlobMetadata> = Vec::new();
    rep.store()
        .list_blobs(PACK_BLOB_PREFIX, |blob| {
            if !referenced.contains(&blob.blob_id) {
                candidates.push(blob);
            }
            Ok(())
        })
        .await?;

    for blob in candidates {
        // Packs of unknown age may belong to a writer that has not committed yet.
        let old_enough = match blob.timestamp {
            Some(ts) => now - ts >= limits.min_pack_age,
            None => limits.min_pack_age.is_zero(),
        };
        if !old_enough {
            debug!(blob_id = %blob.blob_id, "Keeping recent unreferenced pack");
            continue;
        }
        match rep.store().delete(&blob.blob_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e.into()),
        }
        debug!(blob_id = %blob.blob_id, length = blob.length, "Deleted unreferenced pack");
        stats.pack_blobs_deleted += 1;
        stats.bytes_reclaimed += blob.length;
    }
    MAINTENANCE_BYTES_RECLAIMED.inc_by(stats.bytes_reclaimed);

    Ok(stats)
}
