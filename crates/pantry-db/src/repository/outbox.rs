//! # Event Outbox Repository
//!
//! Queue of domain events written with the change they describe.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  LOCAL OPERATION (e.g. create_sale)                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. INSERT sales, sale_items, stock_ledger; UPDATE products    │   │
//! │  │                                                                 │   │
//! │  │  2. INSERT INTO event_outbox (event_type, aggregate_id,        │   │
//! │  │     payload) VALUES ('SALE_CREATED', ?, <event JSON>)          │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← Both succeed or both fail                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            EVENT DISPATCHER (pantry-engine)                     │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT … WHERE delivered_at IS NULL ORDER BY seq           │   │
//! │  │  2. For each entry:                                            │   │
//! │  │     a. Hand to every event sink                                │   │
//! │  │     b. On success: delivered_at = now                          │   │
//! │  │     c. On failure: attempts += 1, last_error = ?               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  A failed delivery never rolls back the committed change.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use pantry_core::{DomainEvent, OutboxEntry};

const OUTBOX_COLUMNS: &str = r#"
    id, event_type, aggregate_id, payload,
    attempts, last_error, created_at, attempted_at, delivered_at
"#;

/// Repository for event outbox operations.
#[derive(Debug, Clone)]
pub struct EventOutboxRepository {
    pool: SqlitePool,
}

impl EventOutboxRepository {
    /// Creates a new EventOutboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EventOutboxRepository { pool }
    }

    /// Queues an event on the caller's connection.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let mut tx = db.begin().await?;
    /// // ... writes ...
    /// EventOutboxRepository::enqueue(&mut tx, &event, now).await?;
    /// tx.commit().await?;
    /// ```
    pub async fn enqueue(
        conn: &mut SqliteConnection,
        event: &DomainEvent,
        now: DateTime<Utc>,
    ) -> DbResult<OutboxEntry> {
        let entry = OutboxEntry {
            id: Uuid::new_v4().to_string(),
            event_type: event.event_type().to_string(),
            aggregate_id: event.aggregate_id().to_string(),
            payload: serde_json::to_string(event)?,
            attempts: 0,
            last_error: None,
            created_at: now,
            attempted_at: None,
            delivered_at: None,
        };

        debug!(
            event_type = %entry.event_type,
            aggregate_id = %entry.aggregate_id,
            "Queuing event"
        );

        sqlx::query(
            r#"
            INSERT INTO event_outbox (
                id, event_type, aggregate_id, payload, attempts, created_at
            ) VALUES (?1, ?2, ?3, ?4, 0, ?5)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.event_type)
        .bind(&entry.aggregate_id)
        .bind(&entry.payload)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(entry)
    }

    /// Gets undelivered entries in commit order.
    ///
    /// ## Arguments
    /// * `limit` - Maximum entries to return
    /// * `max_attempts` - Entries that already failed this many times are skipped
    pub async fn get_pending(&self, limit: u32, max_attempts: u32) -> DbResult<Vec<OutboxEntry>> {
        let sql = format!(
            r#"
            SELECT {} FROM event_outbox
            WHERE delivered_at IS NULL AND attempts < ?1
            ORDER BY seq
            LIMIT ?2
            "#,
            OUTBOX_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(max_attempts)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// Marks an entry as delivered.
    pub async fn mark_delivered(&self, id: &str, now: DateTime<Utc>) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE event_outbox SET
                delivered_at = ?2,
                attempted_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a delivery failure.
    pub async fn mark_failed(&self, id: &str, error: &str, now: DateTime<Utc>) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE event_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts undelivered entries, including ones past the retry limit.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM event_outbox WHERE delivered_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Deletes entries delivered before `older_than`.
    ///
    /// ## Returns
    /// Number of deleted entries.
    pub async fn cleanup_delivered(&self, older_than: DateTime<Utc>) -> DbResult<u64> {
        let rows = sqlx::query(
            "SELECT id, delivered_at FROM event_outbox WHERE delivered_at IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        // Timestamps are compared decoded rather than as text
        let mut deleted = 0;
        for row in &rows {
            let delivered_at: DateTime<Utc> = row.try_get("delivered_at")?;
            if delivered_at < older_than {
                let id: String = row.try_get("id")?;
                deleted += sqlx::query("DELETE FROM event_outbox WHERE id = ?1")
                    .bind(&id)
                    .execute(&self.pool)
                    .await?
                    .rows_affected();
            }
        }

        Ok(deleted)
    }
}

fn entry_from_row(row: &SqliteRow) -> DbResult<OutboxEntry> {
    Ok(OutboxEntry {
        id: row.try_get("id")?,
        event_type: row.try_get("event_type")?,
        aggregate_id: row.try_get("aggregate_id")?,
        payload: row.try_get("payload")?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
        attempted_at: row.try_get("attempted_at")?,
        delivered_at: row.try_get("delivered_at")?,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
