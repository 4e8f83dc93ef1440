mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use hearth_config::Config;
use hearth_storage::{BlobStore, BlobStoreOptions, Storage};
use std::path::PathBuf;

const DB_FILE_NAME: &str = "hearth.db";
const BLOB_DIR_NAME: &str = "blobs";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();
    let config = Config::load().context("Failed to load config")?;
    let data_dir = resolve_data_dir(cli.data_dir.clone(), &config)?;

    // Migrations run here, before anything else touches the database. A
    // failed step aborts startup: the schema state is unknown after it.
    let storage = match Storage::new(Some(data_dir.join(DB_FILE_NAME))).await {
        Ok(storage) => storage,
        Err(e) if e.is_fatal() => {
            tracing::error!(error = %e, "Database migration failed; refusing to start");
            std::process::exit(2);
        }
        Err(e) => return Err(e).context("Failed to open database"),
    };

    match cli.command {
        cli::Commands::Migrate { status } => commands::migrate::handle(&storage, status).await,
        cli::Commands::Blob(blob_cmd) => {
            let blobs = open_blob_store(&data_dir, &config)?;
            commands::blob::handle(blob_cmd, &blobs).await
        }
        cli::Commands::Reset {
            force,
            clear_ledger,
        } => commands::reset::handle(&storage, force, clear_ledger).await,
    }
}

fn resolve_data_dir(flag: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    if let Some(dir) = flag.or_else(|| config.data_dir.clone()) {
        return Ok(dir);
    }
    Ok(hearth_storage::db::default_data_dir()?)
}

fn open_blob_store(data_dir: &std::path::Path, config: &Config) -> Result<BlobStore> {
    let options = BlobStoreOptions {
        max_blob_size: config.blobs.max_blob_size,
        image_quality: config.blobs.image_quality,
        digest_len: config.blobs.digest_len,
        verify_on_dedup: config.blobs.verify_on_dedup,
    };
    BlobStore::with_options(data_dir.join(BLOB_DIR_NAME), options)
        .context("Failed to open blob store")
}
