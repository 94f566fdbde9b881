//! # Sale Processor
//!
//! Turns a list of requested lines into one committed sale.
//!
//! ## Unit of Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    create_sale                                          │
//! │                                                                         │
//! │  OUTSIDE the transaction (fast rejection, no writes)                   │
//! │  ─────────────────────────────────────────────────                      │
//! │  0. Line count / quantity limits        → ValidationError              │
//! │  1. Load products                       → ProductNotFound              │
//! │  2. Sellable or combination?            → NotSellable                  │
//! │  3. Selling price > 0?                  → InvalidPrice                 │
//! │  4. Enough stock (summed per product)?  → InsufficientStock            │
//! │  5. Price lines, total                                                  │
//! │                                                                         │
//! │  INSIDE one transaction (all or nothing)                               │
//! │  ───────────────────────────────────────                                │
//! │  6. INSERT sale + items        (first statement writes → lock held)    │
//! │  7. StockGuard per line        → authoritative InsufficientStock       │
//! │  8. Outbox: SaleCreated + QuantityChanged per line                     │
//! │  9. COMMIT                                                              │
//! │                                                                         │
//! │  AFTER commit                                                           │
//! │  ────────────                                                           │
//! │  10. Dispatch events (failures logged, sale stays committed)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The pre-check may pass on a stale quantity; step 7 is the one that
//! counts. Any error before the commit drops the transaction, which rolls
//! back every write of this sale.

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pantry_core::pricing::{generate_receipt_number, price_mismatches, price_sale};
use pantry_core::{
    Actor, Clock, CoreError, DomainEvent, LedgerKind, PaymentMethod, SaleLineRequest,
    SaleTransaction, ValidationError,
};
use pantry_db::{
    Database, DbError, EventOutboxRepository, SaleRepository, StockChange, StockGuard,
};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::events::EventDispatcher;

/// Processes sales against the shared store.
#[derive(Debug, Clone)]
pub struct SaleProcessor {
    db: Database,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
    dispatcher: EventDispatcher,
}

impl SaleProcessor {
    pub fn new(
        db: Database,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
        dispatcher: EventDispatcher,
    ) -> Self {
        SaleProcessor {
            db,
            clock,
            config,
            dispatcher,
        }
    }

    /// Creates a sale, decrementing stock for every line.
    ///
    /// ## Errors
    /// * `ValidationError` - empty request, too many lines, bad quantity
    /// * `ProductNotFound` / `NotSellable` / `InvalidPrice` - bad line
    /// * `InsufficientStock` - not enough stock, at pre-check or commit time
    /// * `StoreBusy` - the store stayed locked past `busy_timeout`; retry
    pub async fn create_sale(
        &self,
        lines: Vec<SaleLineRequest>,
        payment_method: PaymentMethod,
        actor: &Actor,
    ) -> EngineResult<SaleTransaction> {
        debug!(lines = lines.len(), actor = %actor, "Creating sale");
        self.check_limits(&lines)?;

        let ids: Vec<&str> = lines.iter().map(|line| line.product_id.as_str()).collect();
        let products = self.db.products().get_many(&ids).await?;
        let priced = price_sale(&lines, &products)?;

        for (line, effective) in price_mismatches(&lines, &priced) {
            debug!(
                product_id = %line.product_id,
                supplied = ?line.unit_price,
                effective = %effective,
                "Ignoring caller-supplied unit price"
            );
        }

        let now = self.clock.now();
        let sale_id = Uuid::new_v4();
        let sale = SaleTransaction {
            id: sale_id.to_string(),
            receipt_number: generate_receipt_number(now, &sale_id),
            items: priced.items,
            total_amount: priced.total_amount,
            payment_method,
            actor: actor.as_str().to_string(),
            created_at: now,
        };

        let mut tx = self.db.begin().await?;

        SaleRepository::insert(&mut *tx, &sale).await?;

        let reason = format!("Sale {}", sale.receipt_number);
        let mut changes = Vec::with_capacity(sale.items.len());
        for item in &sale.items {
            let change = StockChange::new(
                &item.product_id,
                LedgerKind::Sale,
                -item.quantity,
                actor.as_str(),
                now,
            )
            .reason(Some(reason.clone()))
            .reference(&sale.id);

            let entry = StockGuard::apply_delta(&mut *tx, change).await?;
            changes.push(DomainEvent::quantity_changed(&entry));
        }

        EventOutboxRepository::enqueue(
            &mut *tx,
            &DomainEvent::SaleCreated { sale: sale.clone() },
            now,
        )
        .await?;
        for event in &changes {
            EventOutboxRepository::enqueue(&mut *tx, event, now).await?;
        }

        tx.commit().await.map_err(DbError::from)?;

        info!(
            sale_id = %sale.id,
            receipt = %sale.receipt_number,
            total = %sale.total_amount,
            items = sale.items.len(),
            "Sale committed"
        );

        self.dispatch_after_commit().await;
        Ok(sale)
    }

    /// Applies the configured limits, which may be tighter than the hard caps.
    fn check_limits(&self, lines: &[SaleLineRequest]) -> EngineResult<()> {
        let limits = &self.config.sales;

        if lines.is_empty() {
            return Err(CoreError::EmptySale.into());
        }

        if lines.len() > limits.max_lines {
            return Err(ValidationError::OutOfRange {
                field: "sale items".to_string(),
                min: 1,
                max: limits.max_lines as i64,
            }
            .into());
        }

        if lines.iter().any(|line| line.quantity > limits.max_line_quantity) {
            return Err(ValidationError::OutOfRange {
                field: "quantity".to_string(),
                min: 1,
                max: limits.max_line_quantity,
            }
            .into());
        }

        Ok(())
    }

    async fn dispatch_after_commit(&self) {
        if let Err(e) = self.dispatcher.try_dispatch_pending().await {
            warn!(error = %e, "Event dispatch after sale failed; will retry in background");
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, ErrorCode};
    use crate::Engine;
    use chrono::{TimeZone, Utc};
    use pantry_core::{FixedClock, NewProduct, ProductType};
    use rust_decimal_macros::dec;

    async fn engine() -> Engine {
        let db = Database::new(pantry_db::DbConfig::in_memory())
            .await
            .unwrap();
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()));
        Engine::new(db, EngineConfig::default(), clock)
    }

    async fn burger(engine: &Engine, stock: i64) -> String {
        let product = engine
            .inventory()
            .create_product(
                NewProduct::new("Burger", ProductType::Sellable).selling_price(dec!(12.00)),
                stock,
                &Actor::system(),
            )
            .await
            .unwrap();
        product.id
    }

    #[tokio::test]
    async fn test_receipt_and_ledger_reason() {
        let engine = engine().await;
        let id = burger(&engine, 25).await;

        let sale = engine
            .sales()
            .create_sale(
                vec![SaleLineRequest::new(&id, 5)],
                PaymentMethod::Cash,
                &Actor::new("cashier-1"),
            )
            .await
            .unwrap();

        assert!(sale.receipt_number.starts_with("20240601-"));
        assert_eq!(sale.actor, "cashier-1");

        let entries = engine.db().ledger().by_reference(&sale.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].reason.as_deref(),
            Some(format!("Sale {}", sale.receipt_number).as_str())
        );
    }

    #[tokio::test]
    async fn test_supplied_price_is_overwritten() {
        let engine = engine().await;
        let id = burger(&engine, 10).await;

        let mut line = SaleLineRequest::new(&id, 2);
        line.unit_price = Some(dec!(1.00));

        let sale = engine
            .sales()
            .create_sale(vec![line], PaymentMethod::Card, &Actor::system())
            .await
            .unwrap();

        assert_eq!(sale.items[0].unit_price, dec!(12.00));
        assert_eq!(sale.total_amount, dec!(24.00));
    }

    #[tokio::test]
    async fn test_configured_limits() {
        let db = Database::new(pantry_db::DbConfig::in_memory())
            .await
            .unwrap();
        let mut config = EngineConfig::default();
        config.sales.max_lines = 2;
        config.sales.max_line_quantity = 10;
        let engine = Engine::new(db, config, Arc::new(pantry_core::SystemClock));
        let id = burger(&engine, 50).await;

        let too_many = vec![SaleLineRequest::new(&id, 1); 3];
        let err = engine
            .sales()
            .create_sale(too_many, PaymentMethod::Cash, &Actor::system())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let too_much = vec![SaleLineRequest::new(&id, 11)];
        let err = engine
            .sales()
            .create_sale(too_much, PaymentMethod::Cash, &Actor::system())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err = engine
            .sales()
            .create_sale(Vec::new(), PaymentMethod::Cash, &Actor::system())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::EmptySale)));
    }

    #[tokio::test]
    async fn test_repeated_lines_are_summed() {
        let engine = engine().await;
        let id = burger(&engine, 5).await;

        let err = engine
            .sales()
            .create_sale(
                vec![SaleLineRequest::new(&id, 3), SaleLineRequest::new(&id, 3)],
                PaymentMethod::Cash,
                &Actor::system(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::Core(CoreError::InsufficientStock {
                available: 5,
                requested: 6,
                ..
            })
        ));
        let product = engine.db().products().get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(product.current_quantity, 5);
    }

    #[tokio::test]
    async fn test_stock_ingredient_not_sellable() {
        let engine = engine().await;
        let flour = engine
            .inventory()
            .create_product(
                NewProduct::new("Flour", ProductType::Stock).cost_price(dec!(1.20)),
                100,
                &Actor::system(),
            )
            .await
            .unwrap();

        let err = engine
            .sales()
            .create_sale(
                vec![SaleLineRequest::new(&flour.id, 1)],
                PaymentMethod::Cash,
                &Actor::system(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotSellable);
    }
}
