//! # Schema Migrations
//!
//! The SQL files under `migrations/sqlite/` are embedded at compile time
//! and applied in version order on startup.
//!
//! ```text
//! migrations/sqlite/
//! ├── 001_initial_schema.sql   products, cost history, ledger, sales,
//! │                            cost operations
//! └── 002_event_outbox.sql     post-commit event queue
//! ```
//!
//! Applied files must never be edited; schema changes go in a new
//! `NNN_description.sql`. Money columns are TEXT decimal strings, never REAL.

use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Where the schema stands relative to the embedded migrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Embedded migration count.
    pub available: usize,
    /// Versions recorded as successfully applied.
    pub applied: usize,
    /// Embedded versions not applied yet, ascending.
    pub pending: Vec<i64>,
}

impl MigrationStatus {
    pub fn is_current(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Applies every pending migration. Safe to call on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let before = migration_status(pool).await?;
    if before.is_current() {
        info!(applied = before.applied, "Schema is up to date");
        return Ok(());
    }

    info!(pending = ?before.pending, "Applying migrations");
    MIGRATOR.run(pool).await?;
    info!(count = before.pending.len(), "Migrations applied");
    Ok(())
}

/// Compares the embedded migrations with the `_sqlx_migrations` table.
///
/// A fresh database without that table counts as nothing applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<MigrationStatus> {
    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations')",
    )
    .fetch_one(pool)
    .await?;

    let applied: HashSet<i64> = if table_exists {
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect()
    } else {
        HashSet::new()
    };

    let available: Vec<i64> = MIGRATOR.iter().map(|m| m.version).collect();
    let pending: Vec<i64> = available
        .iter()
        .copied()
        .filter(|version| !applied.contains(version))
        .collect();

    let unknown = applied.iter().filter(|v| !available.contains(v)).count();
    if unknown > 0 {
        warn!(unknown = unknown, "Database has migrations this build doesn't know about");
    }

    Ok(MigrationStatus {
        available: available.len(),
        applied: applied.len(),
        pending,
    })
}
