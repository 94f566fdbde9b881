//! # Cost Operation Repository
//!
//! Storage of cost records (purchases, wages, rent, utilities...).
//!
//! Records are immutable. A correction is a new record, never an edit.
//! A record is either general (no related entity) or attributed to one
//! product through `related_entity_type` / `related_entity_id`.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use super::{decimal_column, decimal_text};
use crate::error::DbResult;
use pantry_core::{CostCategory, CostOperation, DateRange, EntityType, RelatedEntity};

const COST_COLUMNS: &str = r#"
    id, category, amount, description,
    related_entity_type, related_entity_id,
    actor, occurred_at, created_at
"#;

/// Repository for cost operations.
#[derive(Debug, Clone)]
pub struct CostOperationRepository {
    pool: SqlitePool,
}

impl CostOperationRepository {
    /// Creates a new CostOperationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CostOperationRepository { pool }
    }

    /// Inserts a cost record on the caller's connection.
    ///
    /// Used by restocks so the purchase cost commits with the quantity change.
    pub async fn insert_on(conn: &mut SqliteConnection, op: &CostOperation) -> DbResult<()> {
        debug!(
            id = %op.id,
            category = %op.category,
            amount = %op.amount,
            "Recording cost operation"
        );

        let (entity_type, entity_id) = match &op.related_entity {
            Some(related) => (Some(related.entity_type), Some(related.id.as_str())),
            None => (None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO cost_operations (
                id, category, amount, description,
                related_entity_type, related_entity_id,
                actor, occurred_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&op.id)
        .bind(op.category)
        .bind(decimal_text(op.amount))
        .bind(&op.description)
        .bind(entity_type)
        .bind(entity_id)
        .bind(&op.actor)
        .bind(op.occurred_at)
        .bind(op.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Inserts a standalone cost record.
    pub async fn insert(&self, op: &CostOperation) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_on(&mut *conn, op).await
    }

    /// Gets a cost record by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CostOperation>> {
        let sql = format!("SELECT {} FROM cost_operations WHERE id = ?1", COST_COLUMNS);

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(operation_from_row).transpose()
    }

    /// Cost records whose `occurred_at` falls in the range, oldest first.
    pub async fn list(&self, range: &DateRange) -> DbResult<Vec<CostOperation>> {
        let sql = format!(
            "SELECT {} FROM cost_operations ORDER BY occurred_at, created_at, id",
            COST_COLUMNS
        );

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut operations = Vec::with_capacity(rows.len());
        for row in &rows {
            let op = operation_from_row(row)?;
            if range.contains(op.occurred_at) {
                operations.push(op);
            }
        }
        Ok(operations)
    }

    /// Cost records attributed directly to a product.
    pub async fn by_product(&self, product_id: &str) -> DbResult<Vec<CostOperation>> {
        let sql = format!(
            r#"
            SELECT {} FROM cost_operations
            WHERE related_entity_type = 'product' AND related_entity_id = ?1
            ORDER BY occurred_at, created_at, id
            "#,
            COST_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(operation_from_row).collect()
    }

    /// Counts cost records (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cost_operations")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

fn operation_from_row(row: &SqliteRow) -> DbResult<CostOperation> {
    let category: CostCategory = row.try_get("category")?;
    let entity_type: Option<EntityType> = row.try_get("related_entity_type")?;
    let entity_id: Option<String> = row.try_get("related_entity_id")?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at")?;

    let related_entity = match (entity_type, entity_id) {
        (Some(entity_type), Some(id)) => Some(RelatedEntity { entity_type, id }),
        _ => None,
    };

    Ok(CostOperation {
        id: row.try_get("id")?,
        category,
        amount: decimal_column(row, "amount")?,
        description: row.try_get("description")?,
        related_entity,
        actor: row.try_get("actor")?,
        occurred_at,
        created_at: row.try_get("created_at")?,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
