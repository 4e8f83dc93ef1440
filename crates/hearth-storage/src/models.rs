use hearth_core::BlobPath;
use serde::Serialize;
use time::OffsetDateTime;

/// Outcome of a successful store call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredBlob {
    pub path: BlobPath,
    pub digest: String,
    pub byte_size: u64,
    pub was_deduplicated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlobStats {
    pub file_count: u64,
    pub total_bytes: u64,
}

/// Row of the migration ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub identifier: String,
    /// `None` when the column is NULL or not RFC 3339 (rows written by other tools)
    #[serde(with = "time::serde::rfc3339::option")]
    pub applied_at: Option<OffsetDateTime>,
}

/// What a call to `MigrationEngine::apply` did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

/// Ledger state compared against a migration plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub applied: Vec<LedgerEntry>,
    pub pending: Vec<String>,
    /// Ledger entries with no matching step, written by a newer release
    pub unknown: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    /// Tables in the order they were emptied
    pub tables_cleared: Vec<String>,
    pub rows_deleted: u64,
    pub ledger_cleared: bool,
}
