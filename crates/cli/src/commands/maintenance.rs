//! `packrat maintenance ...`

use crate::app::App;
use anyhow::{Result, bail};
use clap::Subcommand;
use packrat_repo::maintenance::{self, MaintenanceMode, RunOutcome, SafetyLevel};

#[derive(Subcommand)]
pub enum MaintenanceCommands {
    /// Run maintenance now
    Run {
        /// Full maintenance (drop deleted entries, delete unreferenced packs)
        #[arg(long, default_value_t = false)]
        full: bool,
        /// Safety level: "full" keeps recent data, "none" does not
        #[arg(long, default_value = "full")]
        safety: SafetyLevel,
        /// Run even if another client owns maintenance
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Show maintenance owner and schedule
    Info,
    /// Change the maintenance owner
    SetOwner {
        /// New owner as user@host, or "me" for this client
        owner: String,
    },
}

pub async fn handle_maintenance_command(app: &App, command: MaintenanceCommands) -> Result<()> {
    match command {
        MaintenanceCommands::Run {
            full,
            safety,
            force,
        } => {
            let mode = if full {
                MaintenanceMode::Full
            } else {
                MaintenanceMode::Quick
            };
            app.direct_write_action(|w| async move {
                match maintenance::run(&w, mode, force, safety).await? {
                    RunOutcome::NotDue => println!("No maintenance due"),
                    RunOutcome::Completed { mode, stats } => {
                        println!("Finished {mode} maintenance (safety: {safety})");
                        println!("  Index blobs compacted:   {}", stats.index_blobs_compacted);
                        println!("  Deleted entries dropped: {}", stats.deleted_entries_dropped);
                        println!("  Pack blobs deleted:      {}", stats.pack_blobs_deleted);
                        println!("  Bytes reclaimed:         {}", stats.bytes_reclaimed);
                    }
                }
                Ok(())
            })
            .await
        }
        MaintenanceCommands::Info => {
            app.direct_read_action(|rep| async move {
                let info = maintenance::info(&rep).await?;
                match &info.params {
                    Some(params) => {
                        println!("Owner:          {}", params.owner);
                        println!("Quick interval: {}s", params.quick_interval_secs);
                        println!("Full interval:  {}s", params.full_interval_secs);
                    }
                    None => println!("Owner:          (not set)"),
                }
                let next = |t: Option<time::OffsetDateTime>| {
                    t.map(|t| t.to_string()).unwrap_or_else(|| "now".to_string())
                };
                println!("Next quick:     {}", next(info.schedule.next_quick));
                println!("Next full:      {}", next(info.schedule.next_full));
                let runs = [
                    ("quick", &info.schedule.quick_runs),
                    ("full", &info.schedule.full_runs),
                ];
                for (kind, runs) in runs {
                    for run in runs {
                        let outcome = match (&run.error, run.success) {
                            (_, true) => "ok",
                            (Some(error), false) => error.as_str(),
                            (None, false) => "failed",
                        };
                        println!("  {kind} run at {}: {outcome}", run.start);
                    }
                }
                Ok(())
            })
            .await
        }
        MaintenanceCommands::SetOwner { owner } => {
            app.direct_write_action(|w| async move {
                let owner = if owner == "me" {
                    w.repository().client_identity().to_string()
                } else {
                    owner
                };
                if !owner.contains('@') {
                    bail!("owner must be user@host, got {owner}");
                }
                maintenance::set_owner(&w, &owner).await?;
                println!("Maintenance owner set to {owner}");
                Ok(())
            })
            .await
        }
    }
}
