//! Command handlers. Each handler picks the guarded action that matches
//! how it touches the repository.

pub mod blob;
pub mod content;
pub mod maintenance;
pub mod repository;

use anyhow::{Result, bail};
use clap::Args;
use packrat_core::IdRange;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::warn;

/// Content id range selection.
#[derive(Args, Clone, Debug, Default)]
pub struct RangeArgs {
    /// Only content ids starting with this prefix
    #[arg(long, conflicts_with_all = ["start_id", "end_id"])]
    pub prefix: Option<String>,

    /// Only content ids at or after this id
    #[arg(long)]
    pub start_id: Option<String>,

    /// Only content ids before this id
    #[arg(long)]
    pub end_id: Option<String>,
}

impl RangeArgs {
    pub fn to_range(&self) -> Result<IdRange> {
        if let Some(prefix) = &self.prefix {
            return Ok(IdRange::prefixed(prefix));
        }
        if let (Some(start), Some(end)) = (&self.start_id, &self.end_id)
            && start > end
        {
            bail!("--start-id {start} is after --end-id {end}");
        }
        Ok(IdRange {
            start: self.start_id.clone(),
            end: self.end_id.clone(),
        })
    }
}

/// A token cancelled on Ctrl-C. Dropping the guard stops watching.
pub(crate) fn cancel_on_interrupt() -> (CancellationToken, DropGuard) {
    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = watcher.cancelled() => {}
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    warn!("Interrupted, cancelling");
                    watcher.cancel();
                }
            }
        }
    });
    (cancel.clone(), cancel.drop_guard())
}
