//! # Product Repository
//!
//! Database operations for products and their cost history.
//!
//! ## Key Operations
//! - Product registration and lookup
//! - Allocation percentage updates
//! - Cost price edits with an append-only history
//! - Low-stock listing
//!
//! `current_quantity` is never written here after insert. Every change goes
//! through [`StockGuard`](crate::stock::StockGuard) so it lands in the ledger.
//!
//! ## Cost History
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  set_cost_price(flour, 2.10)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │    UPDATE products SET cost_price = '2.10'                              │
//! │    INSERT product_cost_history (flour, seq = max + 1, '2.10')           │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Reads return the newest N entries. Older rows stay until               │
//! │  prune_cost_history() runs; the write path never trims.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use super::{decimal_column, decimal_text, optional_decimal_column};
use crate::error::{DbError, DbResult};
use pantry_core::{CostAllocation, CostHistoryEntry, Product, ProductType};

const PRODUCT_COLUMNS: &str = r#"
    id, name, sku, product_type,
    current_quantity, min_stock_level,
    cost_price, selling_price,
    alloc_inventory, alloc_operational, alloc_overhead,
    created_at, updated_at
"#;

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
///
/// let product = repo.get_by_id("uuid-here").await?;
/// let running_low = repo.low_stock().await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut *conn, id).await
    }

    /// Reads a product on a specific connection (e.g. inside a transaction).
    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    /// Loads several products at once, keyed by ID. Missing IDs are absent.
    pub async fn get_many(&self, ids: &[&str]) -> DbResult<HashMap<String, Product>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM products WHERE id IN (", PRODUCT_COLUMNS));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows = builder.build().fetch_all(&self.pool).await?;

        let mut products = HashMap::with_capacity(rows.len());
        for row in &rows {
            let product = product_from_row(row)?;
            products.insert(product.id.clone(), product);
        }

        debug!(requested = ids.len(), found = products.len(), "Loaded products");
        Ok(products)
    }

    /// Lists every product, sorted by name.
    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let sql = format!("SELECT {} FROM products ORDER BY name, id", PRODUCT_COLUMNS);

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(product_from_row).collect()
    }

    /// Products at or below their reorder level, lowest stock first.
    pub async fn low_stock(&self) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE current_quantity <= min_stock_level \
             ORDER BY current_quantity, name",
            PRODUCT_COLUMNS
        );

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(product_from_row).collect()
    }

    /// Inserts a new product in its own transaction.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - SKU already exists
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_on(&mut *tx, product).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Inserts a product on a connection. A starting cost price becomes the
    /// first cost-history entry.
    pub async fn insert_on(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, sku, product_type,
                current_quantity, min_stock_level,
                cost_price, selling_price,
                alloc_inventory, alloc_operational, alloc_overhead,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6,
                ?7, ?8,
                ?9, ?10, ?11,
                ?12, ?13
            )
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(product.product_type)
        .bind(product.current_quantity)
        .bind(product.min_stock_level)
        .bind(product.cost_price.map(decimal_text))
        .bind(product.selling_price.map(decimal_text))
        .bind(decimal_text(product.cost_allocation.inventory))
        .bind(decimal_text(product.cost_allocation.operational))
        .bind(decimal_text(product.cost_allocation.overhead))
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *conn)
        .await?;

        if let Some(cost) = product.cost_price {
            append_cost_history(
                conn,
                &product.id,
                cost,
                Some("initial cost"),
                product.created_at,
            )
            .await?;
        }

        Ok(())
    }

    /// Takes the write lock on the caller's transaction before a read.
    ///
    /// A no-op UPDATE as the first statement makes the transaction a writer,
    /// so a read that follows cannot go stale before the commit.
    ///
    /// ## Returns
    /// `false` if the product doesn't exist.
    pub async fn lock_for_update(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE products SET updated_at = updated_at WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replaces the allocation percentages. Validation happens upstream.
    pub async fn update_allocation(
        &self,
        id: &str,
        allocation: &CostAllocation,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(id = %id, total = %allocation.total(), "Updating cost allocation");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                alloc_inventory = ?2,
                alloc_operational = ?3,
                alloc_overhead = ?4,
                updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(decimal_text(allocation.inventory))
        .bind(decimal_text(allocation.operational))
        .bind(decimal_text(allocation.overhead))
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Sets the cost price and appends a history entry in one transaction.
    ///
    /// ## Returns
    /// * `Ok(Some(entry))` - Price changed
    /// * `Ok(None)` - Price already equal; nothing written
    /// * `Err(DbError::NotFound)` - Product doesn't exist
    pub async fn set_cost_price(
        &self,
        id: &str,
        cost_price: Decimal,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<Option<CostHistoryEntry>> {
        let mut tx = self.pool.begin().await?;

        if !Self::lock_for_update(&mut *tx, id).await? {
            return Err(DbError::not_found("Product", id));
        }

        let current: Option<String> = sqlx::query_scalar("SELECT cost_price FROM products WHERE id = ?1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        let current = current
            .map(|text| text.parse::<Decimal>().map_err(|e| DbError::decode("cost_price", e)))
            .transpose()?;

        if current == Some(cost_price) {
            debug!(id = %id, cost_price = %cost_price, "Cost price unchanged");
            return Ok(None);
        }

        sqlx::query("UPDATE products SET cost_price = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(decimal_text(cost_price))
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let entry = append_cost_history(&mut *tx, id, cost_price, reason, now).await?;
        tx.commit().await?;

        debug!(id = %id, sequence = entry.sequence, cost_price = %cost_price, "Cost price updated");
        Ok(Some(entry))
    }

    /// Newest-first cost history, at most `limit` entries.
    pub async fn cost_history(&self, id: &str, limit: i64) -> DbResult<Vec<CostHistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, sequence, cost_price, reason, recorded_at
            FROM product_cost_history
            WHERE product_id = ?1
            ORDER BY sequence DESC
            LIMIT ?2
            "#,
        )
        .bind(id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> DbResult<CostHistoryEntry> {
                Ok(CostHistoryEntry {
                    product_id: row.try_get("product_id")?,
                    sequence: row.try_get("sequence")?,
                    cost_price: decimal_column(row, "cost_price")?,
                    reason: row.try_get("reason")?,
                    recorded_at: row.try_get("recorded_at")?,
                })
            })
            .collect()
    }

    /// Deletes all but the newest `keep` history entries of every product.
    ///
    /// ## Returns
    /// Number of deleted entries.
    pub async fn prune_cost_history(&self, keep: i64) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM product_cost_history
            WHERE rowid IN (
                SELECT rowid FROM (
                    SELECT rowid,
                           ROW_NUMBER() OVER (
                               PARTITION BY product_id ORDER BY sequence DESC
                           ) AS position
                    FROM product_cost_history
                )
                WHERE position > ?1
            )
            "#,
        )
        .bind(keep)
        .execute(&self.pool)
        .await?;

        debug!(keep = keep, deleted = result.rows_affected(), "Pruned cost history");
        Ok(result.rows_affected())
    }

    /// Counts total products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

async fn append_cost_history(
    conn: &mut SqliteConnection,
    product_id: &str,
    cost_price: Decimal,
    reason: Option<&str>,
    recorded_at: DateTime<Utc>,
) -> DbResult<CostHistoryEntry> {
    let sequence: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(sequence), 0) + 1 FROM product_cost_history WHERE product_id = ?1",
    )
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO product_cost_history (product_id, sequence, cost_price, reason, recorded_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(product_id)
    .bind(sequence)
    .bind(decimal_text(cost_price))
    .bind(reason)
    .bind(recorded_at)
    .execute(&mut *conn)
    .await?;

    Ok(CostHistoryEntry {
        product_id: product_id.to_string(),
        sequence,
        cost_price,
        reason: reason.map(str::to_string),
        recorded_at,
    })
}

fn product_from_row(row: &SqliteRow) -> DbResult<Product> {
    let product_type: ProductType = row.try_get("product_type")?;

    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        sku: row.try_get("sku")?,
        product_type,
        current_quantity: row.try_get("current_quantity")?,
        min_stock_level: row.try_get("min_stock_level")?,
        cost_price: optional_decimal_column(row, "cost_price")?,
        selling_price: optional_decimal_column(row, "selling_price")?,
        cost_allocation: CostAllocation::new(
            decimal_column(row, "alloc_inventory")?,
            decimal_column(row, "alloc_operational")?,
            decimal_column(row, "alloc_overhead")?,
        ),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::{Duration, TimeZone};
    use pantry_core::NewProduct;
    use rust_decimal_macros::dec;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap() + Duration::minutes(minute)
    }

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn insert_flour(db: &Database) -> Product {
        let product = NewProduct::new("Flour", ProductType::Stock)
            .sku("FLOUR-25KG")
            .cost_price(dec!(2.00))
            .min_stock_level(10)
            .into_product(generate_product_id(), at(0));
        db.products().insert(&product).await.unwrap();
        product
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let db = setup().await;
        let flour = insert_flour(&db).await;

        let loaded = db.products().get_by_id(&flour.id).await.unwrap().unwrap();
        assert_eq!(loaded, flour);
        assert!(db.products().get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let db = setup().await;
        let flour = insert_flour(&db).await;

        let mut copy = flour.clone();
        copy.id = generate_product_id();
        let err = db.products().insert(&copy).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_get_many_skips_missing() {
        let db = setup().await;
        let flour = insert_flour(&db).await;

        let found = db
            .products()
            .get_many(&[flour.id.as_str(), "ghost"])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&flour.id));
    }

    #[tokio::test]
    async fn test_set_cost_price_appends_history() {
        let db = setup().await;
        let flour = insert_flour(&db).await;
        let repo = db.products();

        let entry = repo
            .set_cost_price(&flour.id, dec!(2.10), Some("supplier increase"), at(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.sequence, 2);

        // Same price again is a no-op
        assert!(repo
            .set_cost_price(&flour.id, dec!(2.10), None, at(6))
            .await
            .unwrap()
            .is_none());

        let history = repo.cost_history(&flour.id, 50).await.unwrap();
        let prices: Vec<Decimal> = history.iter().map(|h| h.cost_price).collect();
        assert_eq!(prices, vec![dec!(2.10), dec!(2.00)]);

        let reloaded = repo.get_by_id(&flour.id).await.unwrap().unwrap();
        assert_eq!(reloaded.cost_price, Some(dec!(2.10)));
    }

    #[tokio::test]
    async fn test_set_cost_price_unknown_product() {
        let db = setup().await;
        let err = db
            .products()
            .set_cost_price("ghost", dec!(1), None, at(0))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_history_limit_and_prune() {
        let db = setup().await;
        let flour = insert_flour(&db).await;
        let repo = db.products();

        for i in 1..=5 {
            repo.set_cost_price(&flour.id, dec!(2.00) + Decimal::from(i), None, at(i))
                .await
                .unwrap();
        }

        let newest_two = repo.cost_history(&flour.id, 2).await.unwrap();
        assert_eq!(newest_two.len(), 2);
        assert_eq!(newest_two[0].cost_price, dec!(7.00));

        let deleted = repo.prune_cost_history(3).await.unwrap();
        assert_eq!(deleted, 3);
        let remaining = repo.cost_history(&flour.id, 50).await.unwrap();
        let sequences: Vec<i64> = remaining.iter().map(|h| h.sequence).collect();
        assert_eq!(sequences, vec![6, 5, 4]);
    }

    #[tokio::test]
    async fn test_update_allocation() {
        let db = setup().await;
        let flour = insert_flour(&db).await;

        let split = CostAllocation::new(dec!(60), dec!(30), dec!(10));
        db.products()
            .update_allocation(&flour.id, &split, at(1))
            .await
            .unwrap();

        let reloaded = db.products().get_by_id(&flour.id).await.unwrap().unwrap();
        assert_eq!(reloaded.cost_allocation, split);
    }
}
