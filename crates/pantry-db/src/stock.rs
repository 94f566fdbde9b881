//! # Stock Guard
//!
//! The only code path that changes `products.current_quantity`.
//!
//! ## Check-and-Write in One Statement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE products                                                        │
//! │     SET current_quantity = current_quantity + :delta                    │
//! │   WHERE id = :id AND current_quantity + :delta >= 0                     │
//! │  RETURNING current_quantity                                             │
//! │                                                                         │
//! │  row returned  → previous = new - delta, append ledger entry           │
//! │  no row        → product missing, or not enough stock                  │
//! │                                                                         │
//! │  Two cashiers selling the last 3 burgers:                              │
//! │                                                                         │
//! │    tx A: UPDATE … -3   (3 → 0)    takes the write lock                 │
//! │    tx B: UPDATE … -3   waits on busy_timeout                           │
//! │    tx A: COMMIT                                                         │
//! │    tx B: UPDATE … -3   0 - 3 < 0 → no row → InsufficientStock          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The quantity read used for the check is the one being written, so no
//! other writer can slip in between. Both the quantity change and its
//! ledger entry run on the caller's connection and commit together.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::ledger::LedgerRepository;
use crate::repository::product::ProductRepository;
use pantry_core::{CoreError, LedgerDraft, LedgerEntry, LedgerKind};

/// One requested quantity change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange {
    pub product_id: String,
    pub delta: i64,
    pub kind: LedgerKind,
    pub reason: Option<String>,
    /// ID of the operation that caused the change (sale ID, cost record ID).
    pub reference_id: Option<String>,
    pub actor: String,
    pub at: DateTime<Utc>,
}

impl StockChange {
    pub fn new(
        product_id: impl Into<String>,
        kind: LedgerKind,
        delta: i64,
        actor: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        StockChange {
            product_id: product_id.into(),
            delta,
            kind,
            reason: None,
            reference_id: None,
            actor: actor.into(),
            at,
        }
    }

    pub fn reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }
}

/// Applies quantity changes atomically with their ledger entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct StockGuard;

impl StockGuard {
    /// Applies one change on the caller's connection.
    ///
    /// ## Returns
    /// The appended ledger entry. On error nothing was written by this call,
    /// and the caller's transaction should be dropped.
    ///
    /// ## Errors
    /// * `CoreError::ProductNotFound` - no such product
    /// * `CoreError::InsufficientStock` - the change would go below zero
    /// * `CoreError::InvariantViolation` - delta sign doesn't match the kind
    pub async fn apply_delta(
        conn: &mut SqliteConnection,
        change: StockChange,
    ) -> DbResult<LedgerEntry> {
        if !change.kind.accepts_delta(change.delta) {
            return Err(CoreError::invariant(format!(
                "{} entry cannot carry delta {}",
                change.kind, change.delta
            ))
            .into());
        }

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
               SET current_quantity = current_quantity + ?1,
                   updated_at = ?2
             WHERE id = ?3 AND current_quantity + ?1 >= 0
            RETURNING current_quantity
            "#,
        )
        .bind(change.delta)
        .bind(change.at)
        .bind(&change.product_id)
        .fetch_optional(&mut *conn)
        .await?;

        let new_quantity = match updated {
            Some(quantity) => quantity,
            None => return Err(Self::rejection(conn, &change).await?.into()),
        };
        let previous_quantity = new_quantity.checked_sub(change.delta).ok_or_else(|| {
            CoreError::invariant(format!("{} - {} overflows", new_quantity, change.delta))
        })?;

        debug!(
            product_id = %change.product_id,
            kind = %change.kind,
            delta = change.delta,
            previous = previous_quantity,
            new = new_quantity,
            "Quantity changed"
        );

        let draft = LedgerDraft::new(
            change.product_id,
            change.kind,
            change.delta,
            previous_quantity,
            new_quantity,
            change.actor,
            change.at,
        )?
        .with_reason(change.reason)
        .with_reference(change.reference_id);

        LedgerRepository::append(conn, draft).await
    }

    /// Works out why the conditional update matched no row.
    async fn rejection(conn: &mut SqliteConnection, change: &StockChange) -> DbResult<CoreError> {
        let error = match ProductRepository::fetch(conn, &change.product_id).await? {
            None => CoreError::ProductNotFound(change.product_id.clone()),
            Some(product) => CoreError::InsufficientStock {
                product_id: change.product_id.clone(),
                available: product.current_quantity,
                requested: change.delta.saturating_abs(),
            },
        };
        Ok(error)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
