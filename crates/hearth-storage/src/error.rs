//! Error types for hearth-storage

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Payload too large: {actual} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { actual: u64, limit: u64 },

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Image encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Image decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Blob path already holds different content: {path}")]
    DigestCollision { path: String },

    #[error("Invalid blob path: {0}")]
    InvalidPath(String),

    #[error("Migration {identifier} failed: {source}")]
    MigrationStepFailed {
        identifier: String,
        #[source]
        source: Box<StorageError>,
    },

    #[error("Invalid migration plan: {0}")]
    InvalidMigrationPlan(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] hearth_core::CoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StorageError {
    /// Migration failures leave the schema in an unknown state; callers must
    /// not keep using the database after one.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StorageError::MigrationStepFailed { .. })
    }
}
