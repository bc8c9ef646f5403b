//! Persistent maintenance state: parameters and schedule blobs.

use crate::error::RepoError;
use crate::maintenance::MaintenanceMode;
use crate::maintenance::error::MaintenanceResult;
use bytes::Bytes;
use packrat_core::BlobId;
use packrat_storage::BlobStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Blob holding `MaintenanceParams`.
pub const PARAMS_BLOB_ID: &str = "m.params";

/// Blob holding `MaintenanceSchedule`.
pub const SCHEDULE_BLOB_ID: &str = "m.schedule";

/// Runs kept per kind in the schedule's run log.
pub const MAX_RUN_LOG_ENTRIES: usize = 10;

/// Who runs maintenance and how often.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceParams {
    /// `user@host` allowed to run maintenance.
    pub owner: String,
    #[serde(default = "default_quick_interval_secs")]
    pub quick_interval_secs: u64,
    #[serde(default = "default_full_interval_secs")]
    pub full_interval_secs: u64,
}

fn default_quick_interval_secs() -> u64 {
    3600
}

fn default_full_interval_secs() -> u64 {
    86400
}

impl MaintenanceParams {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            quick_interval_secs: default_quick_interval_secs(),
            full_interval_secs: default_full_interval_secs(),
        }
    }

    pub fn quick_interval(&self) -> Duration {
        Duration::seconds(i64::try_from(self.quick_interval_secs).unwrap_or(i64::MAX))
    }

    pub fn full_interval(&self) -> Duration {
        Duration::seconds(i64::try_from(self.full_interval_secs).unwrap_or(i64::MAX))
    }
}

/// One recorded maintenance run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// When maintenance is next due, plus recent history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceSchedule {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub next_quick: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub next_full: Option<OffsetDateTime>,
    #[serde(default)]
    pub quick_runs: Vec<RunInfo>,
    #[serde(default)]
    pub full_runs: Vec<RunInfo>,
}

impl MaintenanceSchedule {
    pub fn quick_due(&self, now: OffsetDateTime) -> bool {
        self.next_quick.is_none_or(|next| next <= now)
    }

    pub fn full_due(&self, now: OffsetDateTime) -> bool {
        self.next_full.is_none_or(|next| next <= now)
    }

    /// Record a run of the given (resolved) mode, newest first.
    pub fn record_run(&mut self, mode: MaintenanceMode, run: RunInfo) {
        let log = match mode {
            MaintenanceMode::Full => &mut self.full_runs,
            _ => &mut self.quick_runs,
        };
        log.insert(0, run);
        log.truncate(MAX_RUN_LOG_ENTRIES);
    }
}

async fn read_json<T: DeserializeOwned>(store: &dyn BlobStore, id: &str) -> MaintenanceResult<Option<T>> {
    let id = BlobId::parse(id).map_err(RepoError::from)?;
    match store.get(&id).await {
        Ok(data) => Ok(Some(serde_json::from_slice(&data).map_err(RepoError::from)?)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_json<T: Serialize>(store: &dyn BlobStore, id: &str, value: &T) -> Result<(), RepoError> {
    let id = BlobId::parse(id)?;
    let data = serde_json::to_vec_pretty(value)?;
    store.put(&id, Bytes::from(data)).await?;
    Ok(())
}

/// Read the maintenance parameters, if present.
pub async fn read_params(store: &dyn BlobStore) -> MaintenanceResult<Option<MaintenanceParams>> {
    read_json(store, PARAMS_BLOB_ID).await
}

pub async fn write_params(store: &dyn BlobStore, params: &MaintenanceParams) -> Result<(), RepoError> {
    write_json(store, PARAMS_BLOB_ID, params).await
}

/// Read the schedule; a missing schedule means everything is due.
pub async fn read_schedule(store: &dyn BlobStore) -> MaintenanceResult<MaintenanceSchedule> {
    Ok(read_json(store, SCHEDULE_BLOB_ID).await?.unwrap_or_default())
}

pub async fn write_schedule(store: &dyn BlobStore, schedule: &MaintenanceSchedule) -> Result<(), RepoError> {
    write_json(store, SCHEDULE_BLOB_ID, schedule).await
}
