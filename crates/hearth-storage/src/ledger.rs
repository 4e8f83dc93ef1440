//! Migration ledger
//!
//! The ledger lives in the database it describes, in a table external tools
//! can read to find the applied schema version:
//! `schema_migrations (identifier TEXT PRIMARY KEY, applied_at TEXT)`.
//!
//! Every function takes the connection of the caller's transaction so a step
//! and its ledger row commit together.

use sqlx::SqliteConnection;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::models::LedgerEntry;
use crate::{Result, StorageError};

pub const LEDGER_TABLE: &str = "schema_migrations";

pub struct MigrationLedger;

impl MigrationLedger {
    pub async fn ensure_table(conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                identifier TEXT PRIMARY KEY,
                applied_at TEXT
            )",
        )
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn has_applied(conn: &mut SqliteConnection, identifier: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations WHERE identifier = ?")
                .bind(identifier)
                .fetch_one(&mut *conn)
                .await?;
        Ok(count > 0)
    }

    /// Append a ledger row. Fails if `identifier` is already recorded.
    pub async fn record_applied(
        conn: &mut SqliteConnection,
        identifier: &str,
        at: OffsetDateTime,
    ) -> Result<()> {
        let applied_at = at
            .format(&Rfc3339)
            .map_err(|e| StorageError::Other(e.into()))?;
        sqlx::query("INSERT INTO schema_migrations (identifier, applied_at) VALUES (?, ?)")
            .bind(identifier)
            .bind(applied_at)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Recorded identifiers, ordered
    pub async fn identifiers(conn: &mut SqliteConnection) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar("SELECT identifier FROM schema_migrations ORDER BY identifier")
            .fetch_all(&mut *conn)
            .await?;
        Ok(ids)
    }

    /// All entries, ordered by identifier
    pub async fn entries(conn: &mut SqliteConnection) -> Result<Vec<LedgerEntry>> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            "SELECT identifier, applied_at FROM schema_migrations ORDER BY identifier",
        )
        .fetch_all(&mut *conn)
        .await?;

        let entries = rows
            .into_iter()
            .map(|(identifier, raw)| {
                let applied_at = raw.as_deref().and_then(|raw| {
                    OffsetDateTime::parse(raw, &Rfc3339)
                        .inspect_err(|e| {
                            tracing::warn!(
                                identifier = %identifier,
                                applied_at = raw,
                                error = %e,
                                "Unreadable applied_at in migration ledger"
                            )
                        })
                        .ok()
                });
                LedgerEntry {
                    identifier,
                    applied_at,
                }
            })
            .collect();
        Ok(entries)
    }

    /// Only a full destructive reset may call this
    pub(crate) async fn clear(conn: &mut SqliteConnection) -> Result<u64> {
        let result = sqlx::query("DELETE FROM schema_migrations")
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}
