//! # Repository Module
//!
//! Database repository implementations for Pantry.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Engine service                                                        │
//! │       │                                                                 │
//! │       │  db.products().get_by_id(&id)         pool-level reads         │
//! │       │  LedgerRepository::append(&mut tx, …) inside a unit of work    │
//! │       ▼                                                                 │
//! │  Repository                                                            │
//! │       │                                                                 │
//! │       │  SQL Query (runtime-checked, manual row decoding)              │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Writes that must share a transaction take `&mut SqliteConnection`     │
//! │  (a `&mut *tx` from `Database::begin`). Everything else uses the pool. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Products, allocation, cost history
//! - [`LedgerRepository`](ledger::LedgerRepository) - Append-only quantity ledger
//! - [`SaleRepository`](sale::SaleRepository) - Sales and their items
//! - [`CostOperationRepository`](cost::CostOperationRepository) - Cost records
//! - [`EventOutboxRepository`](outbox::EventOutboxRepository) - Post-commit event queue

pub mod cost;
pub mod ledger;
pub mod outbox;
pub mod product;
pub mod sale;

use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

use crate::error::{DbError, DbResult};

// =============================================================================
// Decimal Columns
// =============================================================================
// SQLite has no decimal type and sqlx has no rust_decimal support for it, so
// money is stored as the exact decimal string and parsed on the way out.

/// Text written for a decimal column. Keeps the scale ("12.50").
pub(crate) fn decimal_text(value: Decimal) -> String {
    value.to_string()
}

/// Reads a NOT NULL decimal column.
pub(crate) fn decimal_column(row: &SqliteRow, column: &str) -> DbResult<Decimal> {
    let text: String = row.try_get(column)?;
    Decimal::from_str(&text).map_err(|e| DbError::decode(column, e))
}

/// Reads a nullable decimal column.
pub(crate) fn optional_decimal_column(row: &SqliteRow, column: &str) -> DbResult<Option<Decimal>> {
    let text: Option<String> = row.try_get(column)?;
    text.map(|t| Decimal::from_str(&t).map_err(|e| DbError::decode(column, e)))
        .transpose()
}
