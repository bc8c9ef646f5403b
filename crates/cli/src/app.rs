//! Guarded repository actions.
//!
//! Every command that touches a repository goes through `App::execute`,
//! which opens the repository, runs the action, runs automatic maintenance
//! when allowed and closes the repository, in that order.

use crate::observability::{MemoryTracker, spawn_metrics_listener};
use crate::progress::UploadProgress;
use anyhow::{Context, Result, anyhow};
use packrat_core::config::AppConfig;
use packrat_repo::maintenance::{self, MaintenanceMode, RunOutcome, SafetyLevel};
use packrat_repo::{
    Credentials, DirectRepository, DirectRepositoryWriter, Repository, WriteSessionOptions,
    direct_write_session, write_session,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How an action needs the repository.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessMode {
    /// Failing to open the repository fails the action.
    pub must_be_connected: bool,
    /// Never run automatic maintenance after the action.
    pub disable_maintenance: bool,
}

impl AccessMode {
    /// Connected, no maintenance. Used by read actions and direct writes.
    pub const DIRECT: Self = Self {
        must_be_connected: true,
        disable_maintenance: true,
    };

    /// Connected, maintenance afterwards.
    pub const WRITER: Self = Self {
        must_be_connected: true,
        disable_maintenance: false,
    };

    /// Best-effort connection, no maintenance.
    pub const OPTIONAL: Self = Self {
        must_be_connected: false,
        disable_maintenance: true,
    };
}

/// Shared state for guarded actions.
pub struct App {
    config: Arc<AppConfig>,
    credentials: Credentials,
    progress: UploadProgress,
}

impl App {
    pub fn new(config: AppConfig, credentials: Credentials) -> Self {
        Self {
            config: Arc::new(config),
            credentials,
            progress: UploadProgress::new(false),
        }
    }

    /// Silence the upload progress line.
    pub fn with_quiet_progress(mut self) -> Self {
        self.progress = UploadProgress::new(true);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Run `action` with the repository opened according to `mode`.
    ///
    /// The action's error takes precedence over a close error. Maintenance
    /// failures are logged and never returned.
    pub async fn execute<F, Fut>(&self, mode: AccessMode, action: F) -> Result<()>
    where
        F: FnOnce(Option<Repository>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let _memory = MemoryTracker::start(self.config.observability.memory_tracking);

        if let Some(addr) = &self.config.observability.metrics_listen_addr {
            packrat_repo::metrics::register_metrics().context("failed to register metrics")?;
            let addr: SocketAddr = addr
                .parse()
                .with_context(|| format!("invalid metrics listen address {addr}"))?;
            spawn_metrics_listener(addr);
        }

        let repo = match Repository::open(&self.config.repository, &self.credentials).await {
            Ok(repo) => Some(repo),
            Err(e) if mode.must_be_connected => {
                return Err(anyhow::Error::new(e).context("open repository"));
            }
            Err(e) => {
                debug!(error = %e, "Continuing without a repository");
                None
            }
        };

        let result = action(repo.clone()).await;

        if let Some(rep) = &repo
            && !mode.disable_maintenance
            && let Err(e) = self.maybe_run_maintenance(rep).await
        {
            error!(error = format!("{e:#}"), "Automatic maintenance failed");
        }

        if let Some(rep) = &repo
            && mode.must_be_connected
            && let Err(e) = rep.close().await
        {
            if result.is_ok() {
                return Err(anyhow::Error::new(e).context("unable to close repository"));
            }
            warn!(error = %e, "Unable to close repository after failed action");
        }

        result
    }

    /// Run maintenance if this client is allowed to.
    ///
    /// Skipped when disabled in configuration, on read-only handles and on
    /// handles without direct access. Another client owning maintenance is
    /// not an error.
    pub async fn maybe_run_maintenance(&self, rep: &Repository) -> Result<()> {
        if !self.config.maintenance.auto_enabled {
            return Ok(());
        }
        if rep.is_read_only() {
            return Ok(());
        }
        let Some(direct) = rep.as_direct() else {
            return Ok(());
        };

        let options = WriteSessionOptions::new("maybe_run_maintenance");
        let result = direct_write_session(direct, options, |writer| async move {
            maintenance::run(&writer, MaintenanceMode::Auto, false, SafetyLevel::Full).await
        })
        .await;

        match result {
            Ok(RunOutcome::NotDue) => Ok(()),
            Ok(RunOutcome::Completed { mode, stats }) => {
                info!(
                    mode = %mode,
                    index_blobs_compacted = stats.index_blobs_compacted,
                    pack_blobs_deleted = stats.pack_blobs_deleted,
                    bytes_reclaimed = stats.bytes_reclaimed,
                    "Automatic maintenance finished"
                );
                Ok(())
            }
            Err(e) if e.is_not_owned() => {
                debug!(reason = %e, "Skipping automatic maintenance");
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e).context("error running maintenance")),
        }
    }

    /// Run without opening a repository.
    pub async fn no_repository_action<F, Fut>(&self, act: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let _memory = MemoryTracker::start(self.config.observability.memory_tracking);
        act().await
    }

    /// Read-only action on a direct repository.
    pub async fn direct_read_action<F, Fut>(&self, act: F) -> Result<()>
    where
        F: FnOnce(DirectRepository) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.execute(AccessMode::DIRECT, |rep| async move {
            act(require_direct(rep)?).await
        })
        .await
    }

    /// Write action on a direct repository, inside a write session.
    pub async fn direct_write_action<F, Fut>(&self, act: F) -> Result<()>
    where
        F: FnOnce(DirectRepositoryWriter) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let progress = self.progress.clone();
        self.execute(AccessMode::DIRECT, |rep| async move {
            let direct = require_direct(rep)?;
            let options = WriteSessionOptions::new("direct_write_action")
                .with_upload_callback(progress.callback());
            let result = direct_write_session(&direct, options, act).await;
            progress.finish();
            result
        })
        .await
    }

    /// Read-only action on any repository handle.
    pub async fn repository_reader_action<F, Fut>(&self, act: F) -> Result<()>
    where
        F: FnOnce(Repository) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.execute(AccessMode::DIRECT, |rep| async move {
            act(require_connected(rep)?).await
        })
        .await
    }

    /// Write action followed by automatic maintenance.
    pub async fn repository_writer_action<F, Fut>(&self, act: F) -> Result<()>
    where
        F: FnOnce(DirectRepositoryWriter) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let progress = self.progress.clone();
        self.execute(AccessMode::WRITER, |rep| async move {
            let rep = require_connected(rep)?;
            let options = WriteSessionOptions::new("repository_writer_action")
                .with_upload_callback(progress.callback());
            let result = write_session(&rep, options, act).await;
            progress.finish();
            result
        })
        .await
    }
}

fn require_connected(rep: Option<Repository>) -> Result<Repository> {
    rep.ok_or_else(|| anyhow!("repository is not connected"))
}

fn require_direct(rep: Option<Repository>) -> Result<DirectRepository> {
    require_connected(rep)?
        .as_direct()
        .cloned()
        .ok_or_else(|| anyhow!("operation supported only on direct repository"))
}

/// Log a terminal error and exit with status 1.
pub fn exit_on_error(result: Result<()>) {
    if let Err(e) = result {
        error!("ERROR: {e:#}");
        std::process::exit(1);
    }
}
