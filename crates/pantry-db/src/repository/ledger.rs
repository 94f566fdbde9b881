//! # Ledger Repository
//!
//! Append-only storage of quantity ledger entries.
//!
//! ## Sequencing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stock_ledger.seq is INTEGER PRIMARY KEY AUTOINCREMENT                  │
//! │                                                                         │
//! │  The row is inserted inside the writer's transaction, after the        │
//! │  conditional quantity update. SQLite admits one writer at a time, so   │
//! │  seq order is commit order and each product's chain replays cleanly:   │
//! │                                                                         │
//! │    seq 7   burger  addition  +25   0 → 25                              │
//! │    seq 9   burger  sale       -5  25 → 20                              │
//! │    seq 12  burger  adjustment +2  20 → 22                              │
//! │                                                                         │
//! │  UPDATE and DELETE are rejected by triggers.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use pantry_core::ledger::{self, LedgerDraft, LedgerEntry, LedgerKind, QuantityPoint};

const LEDGER_COLUMNS: &str = r#"
    seq, id, product_id, kind,
    quantity_delta, previous_quantity, new_quantity,
    reason, reference_id, actor, created_at
"#;

/// Repository for the quantity ledger.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Appends a validated draft on the caller's connection.
    ///
    /// The store assigns the ID and sequence.
    pub async fn append(conn: &mut SqliteConnection, draft: LedgerDraft) -> DbResult<LedgerEntry> {
        let id = Uuid::new_v4().to_string();

        debug!(
            product_id = %draft.product_id,
            kind = %draft.kind,
            delta = draft.quantity_delta,
            previous = draft.previous_quantity,
            new = draft.new_quantity,
            "Appending ledger entry"
        );

        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO stock_ledger (
                id, product_id, kind,
                quantity_delta, previous_quantity, new_quantity,
                reason, reference_id, actor, created_at
            ) VALUES (
                ?1, ?2, ?3,
                ?4, ?5, ?6,
                ?7, ?8, ?9, ?10
            )
            RETURNING seq
            "#,
        )
        .bind(&id)
        .bind(&draft.product_id)
        .bind(draft.kind)
        .bind(draft.quantity_delta)
        .bind(draft.previous_quantity)
        .bind(draft.new_quantity)
        .bind(&draft.reason)
        .bind(&draft.reference_id)
        .bind(&draft.actor)
        .bind(draft.created_at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(draft.into_entry(id, sequence))
    }

    /// Entries of one product in commit order.
    pub async fn by_product(&self, product_id: &str) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM stock_ledger WHERE product_id = ?1 ORDER BY seq",
            LEDGER_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// Entries of one kind in commit order.
    pub async fn by_kind(&self, kind: LedgerKind) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM stock_ledger WHERE kind = ?1 ORDER BY seq",
            LEDGER_COLUMNS
        );

        let rows = sqlx::query(&sql).bind(kind).fetch_all(&self.pool).await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// Entries written by one operation (e.g. every line of a sale).
    pub async fn by_reference(&self, reference_id: &str) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM stock_ledger WHERE reference_id = ?1 ORDER BY seq",
            LEDGER_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(reference_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// All entries, oldest first, optionally limited to `[start, end)`.
    ///
    /// Window bounds are applied after decoding so they compare as
    /// timestamps, not as stored text.
    pub async fn chronological(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!("SELECT {} FROM stock_ledger ORDER BY seq", LEDGER_COLUMNS);

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let entry = entry_from_row(row)?;
            let after_start = start.map_or(true, |s| entry.created_at >= s);
            let before_end = end.map_or(true, |e| entry.created_at < e);
            if after_start && before_end {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Quantity of a product after each of its entries.
    pub async fn history(&self, product_id: &str) -> DbResult<Vec<QuantityPoint>> {
        let entries = self.by_product(product_id).await?;
        Ok(ledger::quantity_timeline(&entries))
    }

    /// Replays a product's chain and checks every link.
    ///
    /// ## Returns
    /// * `Err(DbError::Domain(CoreError::InvariantViolation))` - chain broken
    pub async fn verify_chain(&self, product_id: &str) -> DbResult<()> {
        let entries = self.by_product(product_id).await?;
        ledger::verify_chain(&entries)?;
        Ok(())
    }

    /// Counts entries (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_ledger")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

fn entry_from_row(row: &SqliteRow) -> DbResult<LedgerEntry> {
    let kind: LedgerKind = row.try_get("kind")?;

    Ok(LedgerEntry {
        id: row.try_get("id")?,
        sequence: row.try_get("seq")?,
        product_id: row.try_get("product_id")?,
        kind,
        quantity_delta: row.try_get("quantity_delta")?,
        previous_quantity: row.try_get("previous_quantity")?,
        new_quantity: row.try_get("new_quantity")?,
        reason: row.try_get("reason")?,
        reference_id: row.try_get("reference_id")?,
        actor: row.try_get("actor")?,
        created_at: row.try_get("created_at")?,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::repository::product::generate_product_id;
    use crate::{Database, DbConfig};
    use chrono::{Duration, TimeZone};
    use pantry_core::{NewProduct, ProductType};
    use rust_decimal_macros::dec;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap() + Duration::minutes(minute)
    }

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = NewProduct::new("Tomatoes", ProductType::Stock)
            .cost_price(dec!(0.80))
            .into_product(generate_product_id(), at(0));
        db.products().insert(&product).await.unwrap();
        (db, product.id)
    }

    async fn append(
        db: &Database,
        product_id: &str,
        kind: LedgerKind,
        delta: i64,
        previous: i64,
        minute: i64,
    ) -> LedgerEntry {
        let draft = LedgerDraft::new(
            product_id,
            kind,
            delta,
            previous,
            previous + delta,
            "chef",
            at(minute),
        )
        .unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        LedgerRepository::append(&mut *conn, draft).await.unwrap()
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_sequence() {
        let (db, id) = setup().await;

        let first = append(&db, &id, LedgerKind::Addition, 40, 0, 1).await;
        let second = append(&db, &id, LedgerKind::Usage, -4, 40, 2).await;

        assert!(second.sequence > first.sequence);
        assert_eq!(db.ledger().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_queries_by_product_kind_and_window() {
        let (db, id) = setup().await;
        append(&db, &id, LedgerKind::Addition, 40, 0, 1).await;
        append(&db, &id, LedgerKind::Usage, -4, 40, 10).await;
        append(&db, &id, LedgerKind::Adjustment, -1, 36, 20).await;

        assert_eq!(db.ledger().by_product(&id).await.unwrap().len(), 3);
        assert_eq!(db.ledger().by_kind(LedgerKind::Usage).await.unwrap().len(), 1);

        let window = db
            .ledger()
            .chronological(Some(at(5)), Some(at(20)))
            .await
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].kind, LedgerKind::Usage);
    }

    #[tokio::test]
    async fn test_history_and_chain() {
        let (db, id) = setup().await;
        append(&db, &id, LedgerKind::Addition, 40, 0, 1).await;
        append(&db, &id, LedgerKind::Usage, -4, 40, 2).await;

        let quantities: Vec<i64> = db
            .ledger()
            .history(&id)
            .await
            .unwrap()
            .iter()
            .map(|p| p.quantity)
            .collect();
        assert_eq!(quantities, vec![40, 36]);
        assert!(db.ledger().verify_chain(&id).await.is_ok());

        // A link that doesn't continue from 36 breaks the chain
        append(&db, &id, LedgerKind::Usage, -1, 30, 3).await;
        let err = db.ledger().verify_chain(&id).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(_)));
    }

    #[tokio::test]
    async fn test_entries_cannot_be_changed() {
        let (db, id) = setup().await;
        append(&db, &id, LedgerKind::Addition, 40, 0, 1).await;

        let update = sqlx::query("UPDATE stock_ledger SET new_quantity = 99")
            .execute(db.pool())
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM stock_ledger").execute(db.pool()).await;
        assert!(delete.is_err());
    }

    #[tokio::test]
    async fn test_unknown_product_rejected_by_foreign_key() {
        let (db, _) = setup().await;
        let draft = LedgerDraft::new("ghost", LedgerKind::Addition, 1, 0, 1, "chef", at(0)).unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let err = LedgerRepository::append(&mut *conn, draft).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }
}
