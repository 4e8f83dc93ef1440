//! Database handle

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::migration::MigrationEngine;
use crate::models::{MigrationReport, MigrationStatus, ResetReport};
use crate::reset::{DestructiveReset, ResetOptions};
use crate::{Result, StorageError, schema};

const DB_FILE_NAME: &str = "hearth.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Main storage interface.
///
/// Opening a `Storage` migrates the database to the current schema before
/// any other query can run. The pool holds a single connection, which is the
/// one write path into the database.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open the database at `db_path`, or at the default location under the
    /// platform data directory.
    pub async fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(path) => path,
            None => default_data_dir()?.join(DB_FILE_NAME),
        };
        Self::open(&path).await
    }

    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        tracing::debug!(path = %path.display(), "Opened database");
        Self::from_pool(pool).await
    }

    /// Fresh in-memory database (useful for testing)
    pub async fn in_memory() -> Result<Self> {
        Self::from_pool(memory_pool().await?).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    /// Bring the schema up to date. Called once when the storage is opened.
    pub async fn migrate(&self) -> Result<MigrationReport> {
        MigrationEngine::new(self.pool.clone())
            .apply(&schema::all_steps())
            .await
    }

    pub async fn migration_status(&self) -> Result<MigrationStatus> {
        MigrationEngine::new(self.pool.clone())
            .status(&schema::all_steps())
            .await
    }

    /// Erase all rows, keeping the schema and the migration ledger
    pub async fn reset_all(&self) -> Result<ResetReport> {
        DestructiveReset::new(self.pool.clone()).reset_all().await
    }

    pub async fn reset_with(&self, options: ResetOptions) -> Result<ResetReport> {
        DestructiveReset::new(self.pool.clone())
            .reset_with(options)
            .await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Platform data directory for hearth (database and blobs)
pub fn default_data_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from("com", "hearth", "hearth")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| {
            StorageError::Other(anyhow::anyhow!("Could not determine a data directory"))
        })
}

/// Single-connection in-memory pool. The connection never idles out, since
/// closing it would drop the database.
pub(crate) async fn memory_pool() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    Ok(pool)
}
