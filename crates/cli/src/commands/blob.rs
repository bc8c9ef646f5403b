//! `packrat blob ...`

use crate::app::App;
use anyhow::Result;
use clap::Subcommand;
use packrat_storage::BlobStoreListExt;

#[derive(Subcommand)]
pub enum BlobCommands {
    /// List blobs in the repository's blob store
    List {
        /// Only blobs whose id starts with this prefix
        #[arg(long, default_value = "")]
        prefix: String,
    },
}

pub async fn handle_blob_command(app: &App, command: BlobCommands) -> Result<()> {
    match command {
        BlobCommands::List { prefix } => {
            app.direct_read_action(|rep| async move {
                let count = rep
                    .store()
                    .list_blobs(&prefix, |blob| {
                        println!("{} {}", blob.blob_id, blob.length);
                        Ok(())
                    })
                    .await?;
                tracing::debug!(count, prefix = %prefix, "Listed blobs");
                Ok(())
            })
            .await
        }
    }
}
