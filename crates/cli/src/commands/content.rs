//! `packrat content ...`

use super::{RangeArgs, cancel_on_interrupt};
use crate::app::App;
use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Subcommand;
use futures::TryStreamExt;
use packrat_core::ContentId;
use packrat_index::{ContentReader, IterateOptions};
use packrat_repo::verify::DEFAULT_PARALLEL;
use packrat_repo::{ContentVerifier, VerifyOptions};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

#[derive(Subcommand)]
pub enum ContentCommands {
    /// Verify that contents are backed by their pack blobs
    Verify {
        /// Number of contents checked concurrently
        #[arg(long, default_value_t = DEFAULT_PARALLEL)]
        parallel: usize,
        /// Re-read and hash every content instead of checking bounds
        #[arg(long, default_value_t = false)]
        full: bool,
        /// Also verify deleted contents
        #[arg(long, default_value_t = false)]
        include_deleted: bool,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// List content records
    List {
        /// Include deleted contents
        #[arg(long, default_value_t = false)]
        include_deleted: bool,
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Store a file as a content and print its id
    Put {
        /// File to store
        file: PathBuf,
        /// Content id prefix letter (g-z)
        #[arg(long)]
        prefix: Option<char>,
    },
    /// Delete contents
    Rm {
        /// Content ids to delete
        #[arg(value_name = "CONTENT_ID", required = true, num_args = 1..)]
        ids: Vec<String>,
    },
    /// Print a content's bytes
    Show {
        /// Content id
        id: String,
        /// Print the content record as JSON instead of the bytes
        #[arg(long, default_value_t = false)]
        info: bool,
    },
}

pub async fn handle_content_command(app: &App, command: ContentCommands) -> Result<()> {
    match command {
        ContentCommands::Verify {
            parallel,
            full,
            include_deleted,
            range,
        } => {
            let options = VerifyOptions {
                full,
                parallel,
                include_deleted,
                range: range.to_range()?,
            };
            verify(app, options).await
        }
        ContentCommands::List {
            include_deleted,
            range,
        } => {
            let options = IterateOptions {
                range: range.to_range()?,
                include_deleted,
            };
            list(app, options).await
        }
        ContentCommands::Put { file, prefix } => put(app, file, prefix).await,
        ContentCommands::Rm { ids } => rm(app, parse_ids(&ids)?).await,
        ContentCommands::Show { id, info } => show(app, parse_id(&id)?, info).await,
    }
}

fn parse_id(id: &str) -> Result<ContentId> {
    ContentId::parse(id).with_context(|| format!("invalid content id {id}"))
}

fn parse_ids(ids: &[String]) -> Result<Vec<ContentId>> {
    ids.iter().map(|id| parse_id(id)).collect()
}

async fn verify(app: &App, options: VerifyOptions) -> Result<()> {
    app.direct_read_action(|rep| async move {
        let (cancel, _guard) = cancel_on_interrupt();
        let report = ContentVerifier::new(rep.contents(), rep.store().as_ref())
            .run(&options, &cancel)
            .await?;
        println!("Verified {} contents, no errors", report.total);
        Ok(())
    })
    .await
}

async fn list(app: &App, options: IterateOptions) -> Result<()> {
    app.direct_read_action(|rep| async move {
        let mut contents = rep.contents().contents(&options);
        while let Some(info) = contents.try_next().await? {
            println!(
                "{} {} {} {}{}",
                info.content_id,
                info.pack_blob_id,
                info.pack_offset,
                info.packed_length,
                if info.deleted { " (deleted)" } else { "" }
            );
        }
        Ok(())
    })
    .await
}

async fn put(app: &App, file: PathBuf, prefix: Option<char>) -> Result<()> {
    let data = tokio::fs::read(&file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    app.repository_writer_action(|w| async move {
        let id = w.write_content(Bytes::from(data), prefix).await?;
        println!("{id}");
        Ok(())
    })
    .await
}

async fn rm(app: &App, ids: Vec<ContentId>) -> Result<()> {
    app.direct_write_action(|w| async move {
        for id in &ids {
            w.delete_content(id).await?;
            println!("Deleted {id}");
        }
        Ok(())
    })
    .await
}

async fn show(app: &App, id: ContentId, info: bool) -> Result<()> {
    app.repository_reader_action(|rep| async move {
        if info {
            let record = rep.content_info(&id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            return Ok(());
        }
        let data = rep.get_content(&id).await?;
        let mut stdout = tokio::io::stdout();
        stdout.write_all(&data).await?;
        stdout.flush().await?;
        Ok(())
    })
    .await
}
