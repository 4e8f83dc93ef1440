//! Storage layer for hearth
//!
//! This crate provides:
//! - Blob storage (content-addressable, month-sharded)
//! - Forward-only migrations with an in-database ledger
//! - Destructive reset of all application data
//! - SQLite database handle

pub mod blob;
pub mod db;
pub mod error;
pub mod ledger;
pub mod migration;
pub mod models;
pub mod reset;
pub mod schema;

pub use blob::{BlobStore, BlobStoreOptions};
pub use db::Storage;
pub use error::{Result, StorageError};
pub use ledger::MigrationLedger;
pub use migration::{MigrationEngine, MigrationStep, SqlMigration};
pub use models::{
    BlobStats, LedgerEntry, MigrationReport, MigrationStatus, ResetReport, StoredBlob,
};
pub use reset::{DestructiveReset, ResetOptions};
