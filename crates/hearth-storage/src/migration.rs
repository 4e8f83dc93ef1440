//! Forward-only schema migrations
//!
//! Steps run strictly in the order given, each inside its own transaction
//! together with its ledger row. A failing step is rolled back and stops the
//! run; later steps may depend on it.
//!
//! Steps that change a column constraint rebuild the table (create
//! replacement, copy, drop, rename) because SQLite cannot alter constraints
//! in place. Foreign key enforcement is switched off around each step so the
//! drop does not cascade, and `PRAGMA foreign_key_check` must come back clean
//! before the step is recorded.

use async_trait::async_trait;
use hearth_core::{Clock, SystemClock};
use sqlx::{Connection, SqliteConnection, SqlitePool};
use std::collections::HashSet;
use std::sync::Arc;

use crate::ledger::MigrationLedger;
use crate::models::{MigrationReport, MigrationStatus};
use crate::{Result, StorageError};

/// A single named schema or data transformation
#[async_trait]
pub trait MigrationStep: Send + Sync {
    /// Unique, lexicographically ordered identifier (e.g. `0003_add_rooms`)
    fn identifier(&self) -> &str;

    /// Run the step on the connection of an open transaction
    async fn apply(&self, conn: &mut SqliteConnection) -> Result<()>;
}

/// Step made of plain SQL statements executed in order
#[derive(Debug, Clone, Copy)]
pub struct SqlMigration {
    identifier: &'static str,
    statements: &'static [&'static str],
}

impl SqlMigration {
    pub const fn new(identifier: &'static str, statements: &'static [&'static str]) -> Self {
        Self {
            identifier,
            statements,
        }
    }
}

#[async_trait]
impl MigrationStep for SqlMigration {
    fn identifier(&self) -> &str {
        self.identifier
    }

    async fn apply(&self, conn: &mut SqliteConnection) -> Result<()> {
        for sql in self.statements.iter().copied() {
            sqlx::query(sql).execute(&mut *conn).await?;
        }
        Ok(())
    }
}

pub struct MigrationEngine {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl MigrationEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source used for `applied_at`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Apply every step not yet in the ledger.
    ///
    /// Safe to call repeatedly with the same or an extended list. Any step
    /// failure is returned as [`StorageError::MigrationStepFailed`], which
    /// callers should treat as fatal.
    pub async fn apply(&self, steps: &[Box<dyn MigrationStep>]) -> Result<MigrationReport> {
        validate_plan(steps)?;

        let mut conn = self.pool.acquire().await?;
        MigrationLedger::ensure_table(&mut conn).await?;

        let known: HashSet<&str> = steps.iter().map(|s| s.identifier()).collect();
        for identifier in MigrationLedger::identifiers(&mut conn).await? {
            if !known.contains(identifier.as_str()) {
                tracing::warn!(
                    identifier = %identifier,
                    "Ledger contains a migration this build does not know"
                );
            }
        }

        let mut report = MigrationReport::default();
        for step in steps {
            let identifier = step.identifier();
            match self.apply_step(&mut conn, step.as_ref()).await {
                Ok(true) => {
                    tracing::info!(identifier, "Applied migration");
                    report.applied.push(identifier.to_string());
                }
                Ok(false) => {
                    tracing::debug!(identifier, "Migration already applied");
                    report.skipped.push(identifier.to_string());
                }
                Err(e) => {
                    tracing::error!(identifier, error = %e, "Migration failed");
                    return Err(StorageError::MigrationStepFailed {
                        identifier: identifier.to_string(),
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Compare the ledger against `steps` without changing anything
    pub async fn status(&self, steps: &[Box<dyn MigrationStep>]) -> Result<MigrationStatus> {
        let mut conn = self.pool.acquire().await?;
        MigrationLedger::ensure_table(&mut conn).await?;
        let applied = MigrationLedger::entries(&mut conn).await?;

        let recorded: HashSet<&str> = applied.iter().map(|e| e.identifier.as_str()).collect();
        let known: HashSet<&str> = steps.iter().map(|s| s.identifier()).collect();

        let pending = steps
            .iter()
            .map(|s| s.identifier())
            .filter(|id| !recorded.contains(id))
            .map(str::to_string)
            .collect();
        let unknown = applied
            .iter()
            .map(|e| e.identifier.as_str())
            .filter(|id| !known.contains(id))
            .map(str::to_string)
            .collect();

        Ok(MigrationStatus {
            applied,
            pending,
            unknown,
        })
    }

    /// Returns whether the step ran (false if the ledger already had it)
    async fn apply_step(&self, conn: &mut SqliteConnection, step: &dyn MigrationStep) -> Result<bool> {
        // The pragma is a no-op inside a transaction, so toggle it around one
        let fk_enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&mut *conn)
            .await?;
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut *conn)
            .await?;

        let outcome = self.apply_in_transaction(conn, step).await;

        let restore = if fk_enabled != 0 {
            sqlx::query("PRAGMA foreign_keys = ON")
                .execute(&mut *conn)
                .await
                .map(|_| ())
        } else {
            Ok(())
        };

        let applied = outcome?;
        restore?;
        Ok(applied)
    }

    async fn apply_in_transaction(
        &self,
        conn: &mut SqliteConnection,
        step: &dyn MigrationStep,
    ) -> Result<bool> {
        let identifier = step.identifier();
        let mut tx = conn.begin().await?;

        if MigrationLedger::has_applied(&mut tx, identifier).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Err(e) = run_checked(&mut tx, step).await {
            if let Err(rollback) = tx.rollback().await {
                tracing::error!(identifier, error = %rollback, "Rollback after failed migration failed");
            }
            return Err(e);
        }

        MigrationLedger::record_applied(&mut tx, identifier, self.clock.now()).await?;
        tx.commit().await?;
        Ok(true)
    }
}

async fn run_checked(conn: &mut SqliteConnection, step: &dyn MigrationStep) -> Result<()> {
    step.apply(&mut *conn).await?;

    let violations = sqlx::query("PRAGMA foreign_key_check")
        .fetch_all(&mut *conn)
        .await?;
    if !violations.is_empty() {
        return Err(StorageError::Other(anyhow::anyhow!(
            "{} foreign key violation(s) after migration",
            violations.len()
        )));
    }
    Ok(())
}

fn validate_plan(steps: &[Box<dyn MigrationStep>]) -> Result<()> {
    if let Some(position) = steps.iter().position(|s| s.identifier().is_empty()) {
        return Err(StorageError::InvalidMigrationPlan(format!(
            "step #{} has an empty identifier",
            position + 1
        )));
    }
    for pair in steps.windows(2) {
        let (prev, next) = (pair[0].identifier(), pair[1].identifier());
        if prev == next {
            return Err(StorageError::InvalidMigrationPlan(format!(
                "duplicate identifier {}",
                next
            )));
        }
        if prev > next {
            return Err(StorageError::InvalidMigrationPlan(format!(
                "{} is listed after {}",
                next, prev
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use hearth_core::FixedClock;
    use time::macros::datetime;

    fn step(identifier: &'static str, statements: &'static [&'static str]) -> Box<dyn MigrationStep> {
        Box::new(SqlMigration::new(identifier, statements))
    }

    fn plan() -> Vec<Box<dyn MigrationStep>> {
        vec![
            step("0001_boxes", &["CREATE TABLE boxes (id INTEGER PRIMARY KEY, label TEXT)"]),
            step("0002_box_colour", &["ALTER TABLE boxes ADD COLUMN colour TEXT"]),
        ]
    }

    async fn table_exists(pool: &SqlitePool, name: &str) -> bool {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(name)
                .fetch_one(pool)
                .await
                .unwrap();
        count > 0
    }

    async fn ledger_ids(pool: &SqlitePool) -> Vec<String> {
        sqlx::query_scalar("SELECT identifier FROM schema_migrations ORDER BY identifier")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_apply_in_order_and_record() {
        let pool = memory_pool().await.unwrap();
        let engine = MigrationEngine::new(pool.clone())
            .with_clock(Arc::new(FixedClock(datetime!(2024-06-01 00:00 UTC))));

        let report = engine.apply(&plan()).await.unwrap();
        assert_eq!(report.applied, vec!["0001_boxes", "0002_box_colour"]);
        assert!(report.skipped.is_empty());

        sqlx::query("INSERT INTO boxes (label, colour) VALUES ('winter clothes', 'blue')")
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(ledger_ids(&pool).await, vec!["0001_boxes", "0002_box_colour"]);
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let pool = memory_pool().await.unwrap();
        let engine = MigrationEngine::new(pool.clone());

        engine.apply(&plan()).await.unwrap();
        let second = engine.apply(&plan()).await.unwrap();
        assert!(second.applied.is_empty());
        assert_eq!(second.skipped, vec!["0001_boxes", "0002_box_colour"]);
        assert_eq!(ledger_ids(&pool).await, vec!["0001_boxes", "0002_box_colour"]);
    }

    #[tokio::test]
    async fn test_extended_plan_applies_only_new_steps() {
        let pool = memory_pool().await.unwrap();
        let engine = MigrationEngine::new(pool.clone());
        engine.apply(&plan()).await.unwrap();

        let mut extended = plan();
        extended.push(step(
            "0003_shelves",
            &["CREATE TABLE shelves (id INTEGER PRIMARY KEY)"],
        ));
        let report = engine.apply(&extended).await.unwrap();
        assert_eq!(report.applied, vec!["0003_shelves"]);
        assert!(table_exists(&pool, "shelves").await);
    }

    #[tokio::test]
    async fn test_failed_step_rolls_back_and_stops() {
        let pool = memory_pool().await.unwrap();
        let engine = MigrationEngine::new(pool.clone());

        let steps = vec![
            step("0001_boxes", &["CREATE TABLE boxes (id INTEGER PRIMARY KEY)"]),
            step(
                "0002_broken",
                &[
                    "CREATE TABLE half_done (id INTEGER PRIMARY KEY)",
                    "INSERT INTO no_such_table VALUES (1)",
                ],
            ),
            step("0003_never", &["CREATE TABLE never (id INTEGER PRIMARY KEY)"]),
        ];

        let err = engine.apply(&steps).await.unwrap_err();
        assert!(err.is_fatal());
        match err {
            StorageError::MigrationStepFailed { identifier, source } => {
                assert_eq!(identifier, "0002_broken");
                assert!(matches!(*source, StorageError::Database(_)));
            }
            other => panic!("expected MigrationStepFailed, got {:?}", other),
        }

        assert!(table_exists(&pool, "boxes").await);
        assert!(!table_exists(&pool, "half_done").await);
        assert!(!table_exists(&pool, "never").await);
        assert_eq!(ledger_ids(&pool).await, vec!["0001_boxes"]);

        // Foreign key enforcement is restored after the failure
        let fk: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[tokio::test]
    async fn test_foreign_key_violation_fails_step() {
        let pool = memory_pool().await.unwrap();
        let engine = MigrationEngine::new(pool.clone());

        let steps = vec![step(
            "0001_orphans",
            &[
                "CREATE TABLE parents (id INTEGER PRIMARY KEY)",
                "CREATE TABLE children (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parents(id))",
                "INSERT INTO children (parent_id) VALUES (42)",
            ],
        )];

        let err = engine.apply(&steps).await.unwrap_err();
        assert!(matches!(err, StorageError::MigrationStepFailed { .. }));
        assert!(!table_exists(&pool, "children").await);
        assert!(ledger_ids(&pool).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_plans_rejected_before_running() {
        let pool = memory_pool().await.unwrap();
        let engine = MigrationEngine::new(pool.clone());

        let out_of_order = vec![
            step("0002_b", &["CREATE TABLE b (id INTEGER)"]),
            step("0001_a", &["CREATE TABLE a (id INTEGER)"]),
        ];
        let err = engine.apply(&out_of_order).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidMigrationPlan(_)));
        assert!(!table_exists(&pool, "b").await);

        let duplicated = vec![
            step("0001_a", &["CREATE TABLE a (id INTEGER)"]),
            step("0001_a", &["CREATE TABLE a2 (id INTEGER)"]),
        ];
        let err = engine.apply(&duplicated).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidMigrationPlan(_)));

        let unnamed = vec![step("", &["CREATE TABLE c (id INTEGER)"])];
        let err = engine.apply(&unnamed).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidMigrationPlan(_)));
    }

    #[tokio::test]
    async fn test_null_applied_at_does_not_block_apply() {
        let pool = memory_pool().await.unwrap();
        sqlx::query("CREATE TABLE schema_migrations (identifier TEXT PRIMARY KEY, applied_at TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO schema_migrations VALUES ('0000_legacy', NULL)")
            .execute(&pool)
            .await
            .unwrap();

        let engine = MigrationEngine::new(pool.clone());
        let report = engine
            .apply(&[step("0001_a", &["CREATE TABLE a (id INTEGER)"])])
            .await
            .unwrap();
        assert_eq!(report.applied, vec!["0001_a"]);
        assert!(table_exists(&pool, "a").await);

        let status = engine
            .status(&[step("0001_a", &["CREATE TABLE a (id INTEGER)"])])
            .await
            .unwrap();
        assert_eq!(status.unknown, vec!["0000_legacy"]);
        assert_eq!(status.applied[0].applied_at, None);
        assert!(status.applied[1].applied_at.is_some());
    }

    #[tokio::test]
    async fn test_status_reports_pending_and_unknown() {
        let pool = memory_pool().await.unwrap();
        let engine = MigrationEngine::new(pool.clone());

        let status = engine.status(&plan()).await.unwrap();
        assert!(status.applied.is_empty());
        assert_eq!(status.pending, vec!["0001_boxes", "0002_box_colour"]);

        engine.apply(&plan()).await.unwrap();
        let older_build = vec![step(
            "0001_boxes",
            &["CREATE TABLE boxes (id INTEGER PRIMARY KEY, label TEXT)"],
        )];
        let status = engine.status(&older_build).await.unwrap();
        assert_eq!(status.applied.len(), 2);
        assert!(status.pending.is_empty());
        assert_eq!(status.unknown, vec!["0002_box_colour"]);
    }
}
