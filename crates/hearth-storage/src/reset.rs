//! Erase all application data
//!
//! Rows are deleted table by table inside one transaction, children before
//! parents, then the file is compacted with `VACUUM`. The database file itself
//! is never removed; deleting it under an open connection corrupts the handle.
//! Blob files are not touched.

use sqlx::{Connection, SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, BTreeSet};

use crate::Result;
use crate::ledger::{LEDGER_TABLE, MigrationLedger};
use crate::models::ResetReport;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetOptions {
    /// Also forget which migrations ran. The schema itself is kept, so only
    /// tooling that rebuilds the database from scratch should set this.
    pub clear_ledger: bool,
}

pub struct DestructiveReset {
    pool: SqlitePool,
}

impl DestructiveReset {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Empty every application table, keeping the migration ledger
    pub async fn reset_all(&self) -> Result<ResetReport> {
        self.reset_with(ResetOptions::default()).await
    }

    pub async fn reset_with(&self, options: ResetOptions) -> Result<ResetReport> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        // Cycles between tables cannot be ordered; let the commit do the check
        sqlx::query("PRAGMA defer_foreign_keys = ON")
            .execute(&mut *tx)
            .await?;

        let tables = application_tables(&mut tx).await?;
        let order = deletion_order(&mut tx, &tables).await?;

        let mut rows_deleted = 0;
        for table in &order {
            let result = sqlx::query(&format!("DELETE FROM {}", quote_ident(table)))
                .execute(&mut *tx)
                .await?;
            rows_deleted += result.rows_affected();
        }

        let has_sequence: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'",
        )
        .fetch_one(&mut *tx)
        .await?;
        if has_sequence > 0 {
            for table in &order {
                sqlx::query("DELETE FROM sqlite_sequence WHERE name = ?")
                    .bind(table)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        if options.clear_ledger {
            MigrationLedger::ensure_table(&mut tx).await?;
            MigrationLedger::clear(&mut tx).await?;
        }

        tx.commit().await?;

        // VACUUM cannot run inside a transaction
        sqlx::query("VACUUM").execute(&mut *conn).await?;

        tracing::info!(
            tables = order.len(),
            rows_deleted,
            ledger_cleared = options.clear_ledger,
            "Erased all application data"
        );

        Ok(ResetReport {
            tables_cleared: order,
            rows_deleted,
            ledger_cleared: options.clear_ledger,
        })
    }
}

async fn application_tables(conn: &mut SqliteConnection) -> Result<Vec<String>> {
    let tables = sqlx::query_scalar(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' AND name <> ?
         ORDER BY name",
    )
    .bind(LEDGER_TABLE)
    .fetch_all(&mut *conn)
    .await?;
    Ok(tables)
}

/// Order `tables` so every table comes before the tables it references
async fn deletion_order(conn: &mut SqliteConnection, tables: &[String]) -> Result<Vec<String>> {
    // Table names are case-insensitive in SQLite
    let by_key: BTreeMap<String, &String> =
        tables.iter().map(|t| (t.to_lowercase(), t)).collect();

    let mut references: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for table in tables {
        let parents: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT \"table\" FROM pragma_foreign_key_list(?)")
                .bind(table)
                .fetch_all(&mut *conn)
                .await?;
        let key = table.to_lowercase();
        let parents = parents
            .into_iter()
            .map(|p| p.to_lowercase())
            .filter(|p| *p != key && by_key.contains_key(p))
            .collect();
        references.insert(key, parents);
    }

    Ok(order_children_first(&by_key, &references))
}

fn order_children_first(
    by_key: &BTreeMap<String, &String>,
    references: &BTreeMap<String, BTreeSet<String>>,
) -> Vec<String> {
    let mut remaining: BTreeSet<&String> = by_key.keys().collect();
    let mut order = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        // A table is ready once no remaining table points at it
        let ready: Vec<&String> = remaining
            .iter()
            .copied()
            .filter(|candidate| {
                !remaining.iter().any(|other| {
                    references
                        .get(*other)
                        .is_some_and(|parents| parents.contains(*candidate))
                })
            })
            .collect();

        if ready.is_empty() {
            tracing::debug!(
                tables = ?remaining,
                "Foreign key cycle; deleting remaining tables in name order"
            );
            order.extend(remaining.iter().map(|k| by_key[*k].clone()));
            break;
        }

        for key in ready {
            remaining.remove(key);
            order.push(by_key[key].clone());
        }
    }

    order
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
