//! `packrat repository ...`

use crate::app::App;
use anyhow::{Context, Result, bail};
use clap::Subcommand;
use packrat_core::config::ConnectionConfig;
use packrat_repo::Repository;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum RepositoryCommands {
    /// Initialize a new repository in a directory
    Create {
        /// Repository directory (defaults to the configured filesystem path)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show repository status
    Status,
}

pub async fn handle_repository_command(app: &App, command: RepositoryCommands) -> Result<()> {
    match command {
        RepositoryCommands::Create { path } => create(app, path).await,
        RepositoryCommands::Status => status(app).await,
    }
}

async fn create(app: &App, path: Option<PathBuf>) -> Result<()> {
    let path = match (path, &app.config().repository.connection) {
        (Some(path), _) => path,
        (None, ConnectionConfig::Filesystem { path }) => path.clone(),
        (None, ConnectionConfig::Server { .. }) => {
            bail!("repositories can only be created on a filesystem; pass --path")
        }
    };
    let Some(password) = app.credentials().password.clone() else {
        bail!(
            "a password is required to create a repository \
             (set PACKRAT_CREDENTIALS__PASSWORD or credentials.password_file)"
        );
    };
    let owner = app.config().repository.client_identity();

    app.no_repository_action(|| async move {
        let store = packrat_storage::open_filesystem(&path, true)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        let format = Repository::create(store, &password, &owner).await?;
        println!("Created repository {} at {}", format.unique_id, path.display());
        println!("Maintenance owner: {owner}");
        Ok(())
    })
    .await
}

async fn status(app: &App) -> Result<()> {
    app.repository_reader_action(|rep| async move {
        match &rep {
            Repository::Direct(direct) => {
                println!("Repository:     {}", direct.unique_id());
                println!("Connection:     direct ({})", direct.store().backend_name());
                println!("Index blobs:    {}", direct.contents().index_blob_count().await);
                println!("Created:        {}", direct.format().created_at);
            }
            Repository::Remote(remote) => {
                println!("Repository:     {}", remote.status().unique_id);
                println!("Connection:     server");
                if let Some(version) = &remote.status().version {
                    println!("Server version: {version}");
                }
            }
        }
        println!("Client:         {}", rep.client_identity());
        println!("Read-only:      {}", rep.is_read_only());
        Ok(())
    })
    .await
}
