//! # Sale Repository
//!
//! Database operations for sales and sale items.
//!
//! ## Sale Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   ONE TRANSACTION (pantry-engine)                       │
//! │                                                                         │
//! │  1. SaleRepository::insert(&mut tx, &sale)                             │
//! │     └── INSERT sales + one sale_items row per line                     │
//! │         (first write: takes the SQLite write lock)                     │
//! │                                                                         │
//! │  2. StockGuard::apply_delta(&mut tx, …) per line                       │
//! │     └── conditional UPDATE products + INSERT stock_ledger              │
//! │                                                                         │
//! │  3. EventOutboxRepository::enqueue(&mut tx, …)                         │
//! │                                                                         │
//! │  COMMIT  ← all of it, or none of it                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sales are never edited after commit.

use chrono::{DateTime, Utc};
use pantry_core::{PaymentMethod, SaleItem, SaleTransaction};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use super::{decimal_column, decimal_text};
use crate::error::DbResult;

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Inserts a sale and its items on the caller's connection.
    ///
    /// ## Snapshot Pattern
    /// Product name and unit price are copied to the sale item, so the
    /// receipt survives later product edits.
    pub async fn insert(conn: &mut SqliteConnection, sale: &SaleTransaction) -> DbResult<()> {
        debug!(
            id = %sale.id,
            receipt_number = %sale.receipt_number,
            items = sale.items.len(),
            "Inserting sale"
        );

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, receipt_number, total_amount, payment_method, actor, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.receipt_number)
        .bind(decimal_text(sale.total_amount))
        .bind(sale.payment_method)
        .bind(&sale.actor)
        .bind(sale.created_at)
        .execute(&mut *conn)
        .await?;

        for (line_no, item) in sale.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sale_items (
                    sale_id, line_no, product_id, product_name,
                    quantity, unit_price, total_price
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&sale.id)
            .bind(line_no as i64)
            .bind(&item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(decimal_text(item.unit_price))
            .bind(decimal_text(item.total_price))
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Gets a sale with its items.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<SaleTransaction>> {
        let row = sqlx::query(
            r#"
            SELECT id, receipt_number, total_amount, payment_method, actor, created_at
            FROM sales
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let items = self.get_items(id).await?;
                Ok(Some(sale_from_row(&row, items)?))
            }
            None => Ok(None),
        }
    }

    /// Gets all items for a sale, in line order.
    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, product_name, quantity, unit_price, total_price
            FROM sale_items
            WHERE sale_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> DbResult<SaleItem> {
                Ok(SaleItem {
                    product_id: row.try_get("product_id")?,
                    product_name: row.try_get("product_name")?,
                    quantity: row.try_get("quantity")?,
                    unit_price: decimal_column(row, "unit_price")?,
                    total_price: decimal_column(row, "total_price")?,
                })
            })
            .collect()
    }

    /// Lists sales created in `[start, end)`, newest first.
    pub async fn list(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<SaleTransaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, receipt_number, total_amount, payment_method, actor, created_at
            FROM sales
            ORDER BY created_at DESC, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut sales = Vec::new();
        for row in &rows {
            let created_at: DateTime<Utc> = row.try_get("created_at")?;
            if start.is_some_and(|s| created_at < s) || end.is_some_and(|e| created_at >= e) {
                continue;
            }
            let id: String = row.try_get("id")?;
            let items = self.get_items(&id).await?;
            sales.push(sale_from_row(row, items)?);
        }

        Ok(sales)
    }

    /// Counts sales (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

fn sale_from_row(row: &SqliteRow, items: Vec<SaleItem>) -> DbResult<SaleTransaction> {
    let payment_method: PaymentMethod = row.try_get("payment_method")?;

    Ok(SaleTransaction {
        id: row.try_get("id")?,
        receipt_number: row.try_get("receipt_number")?,
        items,
        total_amount: decimal_column(row, "total_amount")?,
        payment_method,
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
    use chrono::TimeZone;
    use pantry_core::{NewProduct, ProductType};
    use rust_decimal_macros::dec;

    fn sale(id: &str, receipt: &str, product_id: &str, created_at: DateTime<Utc>) -> SaleTransaction {
        SaleTransaction {
            id: id.to_string(),
            receipt_number: receipt.to_string(),
            items: vec![SaleItem {
                product_id: product_id.to_string(),
                product_name: "Lemonade".to_string(),
                quantity: 2,
                unit_price: dec!(3.50),
                total_price: dec!(7.00),
            }],
            total_amount: dec!(7.00),
            payment_method: PaymentMethod::MobileWallet,
            actor: "cashier-1".to_string(),
            created_at,
        }
    }

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let product = NewProduct::new("Lemonade", ProductType::Sellable)
            .selling_price(dec!(3.50))
            .into_product(generate_product_id(), now);
        db.products().insert(&product).await.unwrap();
        (db, product.id)
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let (db, product_id) = setup().await;
        let created = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let original = sale("s1", "20240601-AAAA0001", &product_id, created);

        let mut tx = db.begin().await.unwrap();
        SaleRepository::insert(&mut *tx, &original).await.unwrap();
        tx.commit().await.unwrap();

        let loaded = db.sales().get_by_id("s1").await.unwrap().unwrap();
        assert_eq!(loaded, original);
        assert!(db.sales().get_by_id("s2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rolled_back_sale_is_invisible() {
        let (db, product_id) = setup().await;
        let created = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        {
            let mut tx = db.begin().await.unwrap();
            SaleRepository::insert(&mut *tx, &sale("s1", "R-1", &product_id, created))
                .await
                .unwrap();
            // dropped without commit
        }

        assert_eq!(db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_receipt_rejected() {
        let (db, product_id) = setup().await;
        let created = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        let mut tx = db.begin().await.unwrap();
        SaleRepository::insert(&mut *tx, &sale("s1", "R-1", &product_id, created))
            .await
            .unwrap();
        let err = SaleRepository::insert(&mut *tx, &sale("s2", "R-1", &product_id, created))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_list_by_window() {
        let (db, product_id) = setup().await;
        let morning = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap();

        let mut tx = db.begin().await.unwrap();
        SaleRepository::insert(&mut *tx, &sale("s1", "R-1", &product_id, morning))
            .await
            .unwrap();
        SaleRepository::insert(&mut *tx, &sale("s2", "R-2", &product_id, evening))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let all = db.sales().list(None, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "s2");

        let noon = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let afternoon = db.sales().list(Some(noon), None).await.unwrap();
        assert_eq!(afternoon.len(), 1);
        assert_eq!(afternoon[0].id, "s2");
    }
}
