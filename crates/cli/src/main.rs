//! Command-line client for packrat.

use anyhow::Result;
use clap::{Parser, Subcommand};
use packrat_cli::commands::blob::{BlobCommands, handle_blob_command};
use packrat_cli::commands::content::{ContentCommands, handle_content_command};
use packrat_cli::commands::maintenance::{MaintenanceCommands, handle_maintenance_command};
use packrat_cli::commands::repository::{RepositoryCommands, handle_repository_command};
use packrat_cli::config::{ConfigOverrides, load_config};
use packrat_cli::credentials::resolve_credentials;
use packrat_cli::{App, exit_on_error};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "packrat")]
#[command(about = "Content-addressable repository client")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(
        long,
        global = true,
        env = "PACKRAT_CONFIG",
        default_value = "packrat.toml"
    )]
    config: PathBuf,

    /// Run automatic maintenance after write commands
    #[arg(long, global = true, overrides_with = "no_auto_maintenance")]
    auto_maintenance: bool,

    /// Never run automatic maintenance
    #[arg(long, global = true, overrides_with = "auto_maintenance")]
    no_auto_maintenance: bool,

    /// Serve Prometheus metrics on this address while the command runs
    #[arg(long, global = true)]
    metrics_listen_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Repository management commands
    Repository {
        #[command(subcommand)]
        command: RepositoryCommands,
    },
    /// Content commands
    Content {
        #[command(subcommand)]
        command: ContentCommands,
    },
    /// Blob store commands
    Blob {
        #[command(subcommand)]
        command: BlobCommands,
    },
    /// Maintenance commands
    Maintenance {
        #[command(subcommand)]
        command: MaintenanceCommands,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    exit_on_error(run(cli).await);
}

async fn run(cli: Cli) -> Result<()> {
    let overrides = ConfigOverrides {
        auto_maintenance: match (cli.auto_maintenance, cli.no_auto_maintenance) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        },
        metrics_listen_addr: cli.metrics_listen_addr,
    };
    let config = load_config(&cli.config, &overrides)?;

    let credentials = resolve_credentials(&config.credentials).await?;
    let app = App::new(config, credentials);

    match cli.command {
        Commands::Repository { command } => handle_repository_command(&app, command).await,
        Commands::Content { command } => handle_content_command(&app, command).await,
        Commands::Blob { command } => handle_blob_command(&app, command).await,
        Commands::Maintenance { command } => handle_maintenance_command(&app, command).await,
    }
}
