//! # Inventory Service
//!
//! Product registration, stock movements outside of sales, and cost
//! records.
//!
//! ## Stock Movements
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Operation          Ledger kind   Delta   Extra writes (same tx)       │
//! │  ─────────────────  ───────────   ─────   ──────────────────────────   │
//! │  create_product     addition      +open   product row, cost history    │
//! │  restock            addition      +qty    inventory CostOperation      │
//! │  record_usage       usage         -qty                                  │
//! │  adjust             adjustment    ±delta                                │
//! │  adjust_to_count    adjustment    counted - current                    │
//! │                                                                         │
//! │  Every movement also writes a QuantityChanged outbox row, then          │
//! │  commits, then dispatches.                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pantry_core::ledger::QuantityPoint;
use pantry_core::money::line_total;
use pantry_core::validation::{
    validate_adjustment_delta, validate_allocation, validate_cost_amount, validate_new_product,
    validate_movement_quantity, validate_price, validate_stored_quantity,
};
use pantry_core::{
    Actor, Clock, CoreError, CostAllocation, CostCategory, CostHistoryEntry, CostOperation,
    DomainEvent, LedgerEntry, LedgerKind, NewProduct, Product, RelatedEntity, ValidationError,
};
use pantry_db::repository::product::generate_product_id;
use pantry_db::{
    CostOperationRepository, Database, DbError, EventOutboxRepository, ProductRepository,
    StockChange, StockGuard,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::EventDispatcher;

// =============================================================================
// Cost Record Request
// =============================================================================

/// A cost to record, built by the caller.
///
/// ## Example
/// ```rust,ignore
/// let gas = CostRecord::new(CostCategory::Operational, dec!(180.00))
///     .description("Gas bill")
///     .occurred_at(first_of_month);
/// engine.inventory().record_cost(gas, &actor).await?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CostRecord {
    pub category: CostCategory,
    pub amount: Decimal,
    pub description: Option<String>,
    pub related_product: Option<String>,
    /// Defaults to now.
    pub occurred_at: Option<DateTime<Utc>>,
}

impl CostRecord {
    pub fn new(category: CostCategory, amount: Decimal) -> Self {
        CostRecord {
            category,
            amount,
            description: None,
            related_product: None,
            occurred_at: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attributes the cost directly to one product.
    pub fn product(mut self, product_id: impl Into<String>) -> Self {
        self.related_product = Some(product_id.into());
        self
    }

    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }
}

// =============================================================================
// Inventory Service
// =============================================================================

#[derive(Debug, Clone)]
pub struct InventoryService {
    db: Database,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
    dispatcher: EventDispatcher,
}

impl InventoryService {
    pub fn new(
        db: Database,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
        dispatcher: EventDispatcher,
    ) -> Self {
        InventoryService {
            db,
            clock,
            config,
            dispatcher,
        }
    }

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    /// Registers a product. Opening stock enters the ledger as an addition.
    ///
    /// ## Errors
    /// * `ValidationError` - bad name, SKU, prices or negative opening stock
    /// * `InvalidAllocation` - allocation doesn't sum to 100
    pub async fn create_product(
        &self,
        new_product: NewProduct,
        opening_stock: i64,
        actor: &Actor,
    ) -> EngineResult<Product> {
        validate_new_product(&new_product)?;
        validate_stored_quantity("opening_stock", opening_stock)?;

        let now = self.clock.now();
        let product = new_product.into_product(generate_product_id(), now);

        let mut tx = self.db.begin().await?;
        ProductRepository::insert_on(&mut *tx, &product).await?;

        let mut opened = None;
        if opening_stock > 0 {
            let change = StockChange::new(
                &product.id,
                LedgerKind::Addition,
                opening_stock,
                actor.as_str(),
                now,
            )
            .reason(Some("opening stock".to_string()));
            let entry = StockGuard::apply_delta(&mut *tx, change).await?;
            EventOutboxRepository::enqueue(&mut *tx, &DomainEvent::quantity_changed(&entry), now)
                .await?;
            opened = Some(entry);
        }

        let stored = ProductRepository::fetch(&mut *tx, &product.id)
            .await?
            .ok_or_else(|| CoreError::invariant(format!("product {} vanished", product.id)))?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            id = %stored.id,
            name = %stored.name,
            product_type = %stored.product_type,
            opening_stock = opening_stock,
            "Product created"
        );

        if opened.is_some() {
            self.dispatch_after_commit().await;
        }
        Ok(stored)
    }

    pub async fn get_product(&self, id: &str) -> EngineResult<Product> {
        self.db
            .products()
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(id.to_string()).into())
    }

    /// All products, sorted by name.
    pub async fn list_products(&self) -> EngineResult<Vec<Product>> {
        Ok(self.db.products().list().await?)
    }

    /// Products at or below their reorder level.
    pub async fn low_stock(&self) -> EngineResult<Vec<Product>> {
        Ok(self.db.products().low_stock().await?)
    }

    // -------------------------------------------------------------------------
    // Stock Movements
    // -------------------------------------------------------------------------

    /// Adds received stock. With a unit cost, the purchase is also recorded
    /// as an inventory cost attributed to the product.
    pub async fn restock(
        &self,
        product_id: &str,
        quantity: i64,
        unit_cost: Option<Decimal>,
        reason: Option<String>,
        actor: &Actor,
    ) -> EngineResult<LedgerEntry> {
        validate_movement_quantity(quantity)?;
        let now = self.clock.now();

        let purchase = match unit_cost {
            Some(cost) => {
                validate_price("unit_cost", cost)?;
                let amount = line_total(cost, quantity)?;
                validate_cost_amount(amount)?;
                Some(CostOperation {
                    id: Uuid::new_v4().to_string(),
                    category: CostCategory::Inventory,
                    amount,
                    description: Some(format!("Restock {} × {}", quantity, cost)),
                    related_entity: Some(RelatedEntity::product(product_id)),
                    actor: actor.as_str().to_string(),
                    occurred_at: now,
                    created_at: now,
                })
            }
            None => None,
        };

        let mut change = StockChange::new(product_id, LedgerKind::Addition, quantity, actor.as_str(), now)
            .reason(reason);
        if let Some(op) = &purchase {
            change = change.reference(&op.id);
        }

        let entry = self.apply_change(change, purchase.as_ref()).await?;
        info!(
            product_id = %product_id,
            quantity = quantity,
            new_quantity = entry.new_quantity,
            cost_recorded = purchase.is_some(),
            "Stock received"
        );
        Ok(entry)
    }

    /// Takes stock out for kitchen use.
    pub async fn record_usage(
        &self,
        product_id: &str,
        quantity: i64,
        reason: Option<String>,
        actor: &Actor,
    ) -> EngineResult<LedgerEntry> {
        validate_movement_quantity(quantity)?;

        let change = StockChange::new(
            product_id,
            LedgerKind::Usage,
            -quantity,
            actor.as_str(),
            self.clock.now(),
        )
        .reason(reason);

        self.apply_change(change, None).await
    }

    /// Applies a signed correction. A reason is mandatory.
    pub async fn adjust(
        &self,
        product_id: &str,
        delta: i64,
        reason: &str,
        actor: &Actor,
    ) -> EngineResult<LedgerEntry> {
        validate_adjustment_delta(delta)?;
        let reason = required_reason(reason)?;

        let change = StockChange::new(
            product_id,
            LedgerKind::Adjustment,
            delta,
            actor.as_str(),
            self.clock.now(),
        )
        .reason(Some(reason));

        let entry = self.apply_change(change, None).await?;
        info!(
            product_id = %product_id,
            delta = delta,
            new_quantity = entry.new_quantity,
            "Stock adjusted"
        );
        Ok(entry)
    }

    /// Sets the quantity to a physical count.
    ///
    /// ## Returns
    /// * `Ok(Some(entry))` - quantity corrected
    /// * `Ok(None)` - the count already matched; nothing written
    pub async fn adjust_to_count(
        &self,
        product_id: &str,
        counted: i64,
        reason: &str,
        actor: &Actor,
    ) -> EngineResult<Option<LedgerEntry>> {
        validate_stored_quantity("counted", counted)?;
        let reason = required_reason(reason)?;
        let now = self.clock.now();

        let mut tx = self.db.begin().await?;

        // Lock first so the quantity read below is the one we correct
        if !ProductRepository::lock_for_update(&mut *tx, product_id).await? {
            return Err(CoreError::ProductNotFound(product_id.to_string()).into());
        }
        let current = ProductRepository::fetch(&mut *tx, product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?
            .current_quantity;

        let delta = counted - current;
        if delta == 0 {
            debug!(product_id = %product_id, counted = counted, "Count matches, nothing to adjust");
            return Ok(None);
        }

        let change = StockChange::new(product_id, LedgerKind::Adjustment, delta, actor.as_str(), now)
            .reason(Some(reason));
        let entry = StockGuard::apply_delta(&mut *tx, change).await?;
        EventOutboxRepository::enqueue(&mut *tx, &DomainEvent::quantity_changed(&entry), now)
            .await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            product_id = %product_id,
            previous = entry.previous_quantity,
            counted = counted,
            "Stock counted"
        );

        self.dispatch_after_commit().await;
        Ok(Some(entry))
    }

    /// Runs one guarded change, plus an optional cost record, in its own
    /// transaction.
    async fn apply_change(
        &self,
        change: StockChange,
        cost: Option<&CostOperation>,
    ) -> EngineResult<LedgerEntry> {
        let mut tx = self.db.begin().await?;

        // The guard's UPDATE is the first statement, so the write lock is
        // taken before anything is read
        let entry = StockGuard::apply_delta(&mut *tx, change).await?;
        if let Some(op) = cost {
            CostOperationRepository::insert_on(&mut *tx, op).await?;
        }
        EventOutboxRepository::enqueue(
            &mut *tx,
            &DomainEvent::quantity_changed(&entry),
            entry.created_at,
        )
        .await?;

        tx.commit().await.map_err(DbError::from)?;

        self.dispatch_after_commit().await;
        Ok(entry)
    }

    // -------------------------------------------------------------------------
    // Prices & Allocation
    // -------------------------------------------------------------------------

    /// Changes the cost price, appending a history entry.
    ///
    /// ## Returns
    /// `Ok(None)` when the price is unchanged.
    pub async fn set_cost_price(
        &self,
        product_id: &str,
        cost_price: Decimal,
        reason: Option<&str>,
    ) -> EngineResult<Option<CostHistoryEntry>> {
        validate_price("cost_price", cost_price)?;

        self.db
            .products()
            .set_cost_price(product_id, cost_price, reason, self.clock.now())
            .await
            .map_err(|e| missing_product(e, product_id))
    }

    /// Replaces a product's allocation percentages.
    pub async fn update_allocation(
        &self,
        product_id: &str,
        allocation: CostAllocation,
    ) -> EngineResult<()> {
        validate_allocation(&allocation)?;

        self.db
            .products()
            .update_allocation(product_id, &allocation, self.clock.now())
            .await
            .map_err(|e| missing_product(e, product_id))?;

        info!(product_id = %product_id, total = %allocation.total(), "Allocation updated");
        Ok(())
    }

    /// Newest-first cost history, capped by `costing.cost_history_limit`.
    pub async fn cost_history(&self, product_id: &str) -> EngineResult<Vec<CostHistoryEntry>> {
        Ok(self
            .db
            .products()
            .cost_history(product_id, self.config.costing.cost_history_limit)
            .await?)
    }

    /// Keeps only the newest `keep` history entries per product.
    pub async fn prune_cost_history(&self, keep: i64) -> EngineResult<u64> {
        validate_stored_quantity("keep", keep)?;
        let deleted = self.db.products().prune_cost_history(keep).await?;
        if deleted > 0 {
            info!(keep = keep, deleted = deleted, "Pruned cost history");
        }
        Ok(deleted)
    }

    // -------------------------------------------------------------------------
    // Cost Records
    // -------------------------------------------------------------------------

    /// Appends a cost operation.
    ///
    /// ## Errors
    /// * `ValidationError` - amount not positive
    /// * `ProductNotFound` - the related product doesn't exist
    pub async fn record_cost(&self, record: CostRecord, actor: &Actor) -> EngineResult<CostOperation> {
        validate_cost_amount(record.amount)?;

        if let Some(product_id) = &record.related_product {
            if self.db.products().get_by_id(product_id).await?.is_none() {
                return Err(CoreError::ProductNotFound(product_id.clone()).into());
            }
        }

        let now = self.clock.now();
        let op = CostOperation {
            id: Uuid::new_v4().to_string(),
            category: record.category,
            amount: record.amount,
            description: record.description,
            related_entity: record.related_product.map(RelatedEntity::product),
            actor: actor.as_str().to_string(),
            occurred_at: record.occurred_at.unwrap_or(now),
            created_at: now,
        };

        self.db.costs().insert(&op).await?;

        info!(
            id = %op.id,
            category = %op.category,
            amount = %op.amount,
            "Cost recorded"
        );
        Ok(op)
    }

    // -------------------------------------------------------------------------
    // Ledger Queries
    // -------------------------------------------------------------------------

    /// Quantity timeline of one product, oldest first.
    pub async fn stock_history(&self, product_id: &str) -> EngineResult<Vec<QuantityPoint>> {
        Ok(self.db.ledger().history(product_id).await?)
    }

    /// Replays a product's ledger chain.
    pub async fn verify_chain(&self, product_id: &str) -> EngineResult<()> {
        Ok(self.db.ledger().verify_chain(product_id).await?)
    }

    async fn dispatch_after_commit(&self) {
        if let Err(e) = self.dispatcher.try_dispatch_pending().await {
            warn!(error = %e, "Event dispatch failed; will retry in background");
        }
    }
}

fn required_reason(reason: &str) -> Result<String, ValidationError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ValidationError::Required {
            field: "reason".to_string(),
        });
    }
    Ok(reason.to_string())
}

/// The repositories report a missing row generically.
fn missing_product(err: DbError, product_id: &str) -> EngineError {
    match err {
        DbError::NotFound { .. } => CoreError::ProductNotFound(product_id.to_string()).into(),
        other => other.into(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::Engine;
    use chrono::TimeZone;
    use pantry_core::{DateRange, FixedClock, ProductType};
    use rust_decimal_macros::dec;

    async fn engine() -> Engine {
        let db = Database::new(pantry_db::DbConfig::in_memory())
            .await
            .unwrap();
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()));
        Engine::new(db, EngineConfig::default(), clock)
    }

    async fn flour(engine: &Engine, stock: i64) -> Product {
        engine
            .inventory()
            .create_product(
                NewProduct::new("Flour", ProductType::Stock)
                    .cost_price(dec!(1.20))
                    .min_stock_level(10),
                stock,
                &Actor::system(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_product_opening_stock() {
        let engine = engine().await;
        let product = flour(&engine, 40).await;

        assert_eq!(product.current_quantity, 40);
        let entries = engine.db().ledger().by_product(&product.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, LedgerKind::Addition);
        assert_eq!(entries[0].previous_quantity, 0);

        let history = engine.inventory().cost_history(&product.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].cost_price, dec!(1.20));
    }

    #[tokio::test]
    async fn test_create_product_without_stock_has_no_ledger() {
        let engine = engine().await;
        let product = flour(&engine, 0).await;

        assert_eq!(product.current_quantity, 0);
        assert!(engine.db().ledger().by_product(&product.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_product_rejects_bad_allocation() {
        let engine = engine().await;
        let err = engine
            .inventory()
            .create_product(
                NewProduct::new("Oil", ProductType::Stock)
                    .cost_price(dec!(3.00))
                    .allocation(CostAllocation::new(dec!(50), dec!(10), dec!(10))),
                5,
                &Actor::system(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::InvalidAllocation);
        assert!(engine.inventory().list_products().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restock_records_purchase_cost() {
        let engine = engine().await;
        let product = flour(&engine, 5).await;

        let entry = engine
            .inventory()
            .restock(&product.id, 20, Some(dec!(1.25)), None, &Actor::new("chef"))
            .await
            .unwrap();

        assert_eq!(entry.new_quantity, 25);
        let costs = engine.db().costs().by_product(&product.id).await.unwrap();
        assert_eq!(costs.len(), 1);
        assert_eq!(costs[0].category, CostCategory::Inventory);
        assert_eq!(costs[0].amount, dec!(25.00));
        assert_eq!(entry.reference_id.as_deref(), Some(costs[0].id.as_str()));
    }

    #[tokio::test]
    async fn test_restock_unknown_product_records_nothing() {
        let engine = engine().await;

        let err = engine
            .inventory()
            .restock("missing", 5, Some(dec!(2.00)), None, &Actor::system())
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::ProductNotFound);
        assert!(engine.db().costs().list(&DateRange::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_usage_cannot_go_negative() {
        let engine = engine().await;
        let product = flour(&engine, 3).await;

        let err = engine
            .inventory()
            .record_usage(&product.id, 4, None, &Actor::system())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::InsufficientStock {
                available: 3,
                requested: 4,
                ..
            })
        ));

        let err = engine
            .inventory()
            .record_usage(&product.id, 0, None, &Actor::system())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_extreme_adjustment_rejected_without_writes() {
        let engine = engine().await;
        let product = flour(&engine, 10).await;
        let inventory = engine.inventory();

        for delta in [i64::MIN, i64::MAX] {
            let err = inventory
                .adjust(&product.id, delta, "count", &Actor::system())
                .await
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::ValidationError);
        }

        assert_eq!(inventory.get_product(&product.id).await.unwrap().current_quantity, 10);
        assert_eq!(engine.db().ledger().by_product(&product.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_prices_rejected() {
        let engine = engine().await;
        let inventory = engine.inventory();

        let err = inventory
            .create_product(
                NewProduct::new("Caviar", ProductType::Combination)
                    .cost_price(dec!(1.00))
                    .selling_price(Decimal::MAX),
                10,
                &Actor::system(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let product = flour(&engine, 10).await;
        let err = inventory
            .set_cost_price(&product.id, dec!(100000000000000000000000000), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err = inventory
            .restock(&product.id, 5, Some(Decimal::MAX), None, &Actor::system())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(inventory.get_product(&product.id).await.unwrap().current_quantity, 10);
    }

    #[tokio::test]
    async fn test_adjust_requires_reason_and_nonzero_delta() {
        let engine = engine().await;
        let product = flour(&engine, 10).await;
        let inventory = engine.inventory();

        let err = inventory.adjust(&product.id, -2, "  ", &Actor::system()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err = inventory.adjust(&product.id, 0, "spill", &Actor::system()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let entry = inventory.adjust(&product.id, -2, "spill", &Actor::system()).await.unwrap();
        assert_eq!(entry.new_quantity, 8);
        assert_eq!(entry.reason.as_deref(), Some("spill"));
    }

    #[tokio::test]
    async fn test_adjust_to_count() {
        let engine = engine().await;
        let product = flour(&engine, 10).await;
        let inventory = engine.inventory();

        let unchanged = inventory
            .adjust_to_count(&product.id, 10, "weekly count", &Actor::system())
            .await
            .unwrap();
        assert!(unchanged.is_none());

        let entry = inventory
            .adjust_to_count(&product.id, 7, "weekly count", &Actor::system())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.quantity_delta, -3);
        assert_eq!(entry.new_quantity, 7);

        let err = inventory
            .adjust_to_count("missing", 7, "weekly count", &Actor::system())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProductNotFound);
    }

    #[tokio::test]
    async fn test_set_cost_price() {
        let engine = engine().await;
        let product = flour(&engine, 10).await;
        let inventory = engine.inventory();

        let same = inventory
            .set_cost_price(&product.id, dec!(1.20), None)
            .await
            .unwrap();
        assert!(same.is_none());

        let changed = inventory
            .set_cost_price(&product.id, dec!(1.35), Some("supplier increase"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(changed.sequence, 2);

        let err = inventory
            .set_cost_price("missing", dec!(1.00), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProductNotFound);

        let err = inventory
            .set_cost_price(&product.id, dec!(-1.00), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_update_allocation() {
        let engine = engine().await;
        let product = flour(&engine, 10).await;
        let inventory = engine.inventory();

        let split = CostAllocation::new(dec!(70), dec!(20), dec!(10));
        inventory.update_allocation(&product.id, split).await.unwrap();
        let stored = inventory.get_product(&product.id).await.unwrap();
        assert_eq!(stored.cost_allocation, split);

        let negative = CostAllocation::new(dec!(110), dec!(-10), dec!(0));
        let err = inventory.update_allocation(&product.id, negative).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidAllocation);

        let err = inventory.update_allocation("missing", split).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProductNotFound);
    }

    #[tokio::test]
    async fn test_record_cost() {
        let engine = engine().await;
        let product = flour(&engine, 10).await;
        let inventory = engine.inventory();

        let op = inventory
            .record_cost(
                CostRecord::new(CostCategory::Operational, dec!(45.00))
                    .description("Flour delivery fee")
                    .product(&product.id),
                &Actor::new("manager"),
            )
            .await
            .unwrap();
        assert_eq!(op.related_entity, Some(RelatedEntity::product(&product.id)));
        assert_eq!(op.occurred_at, op.created_at);

        let err = inventory
            .record_cost(
                CostRecord::new(CostCategory::Overhead, dec!(10.00)).product("missing"),
                &Actor::system(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProductNotFound);

        let err = inventory
            .record_cost(CostRecord::new(CostCategory::Overhead, dec!(0)), &Actor::system())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_low_stock_and_history() {
        let engine = engine().await;
        let product = flour(&engine, 12).await;
        let inventory = engine.inventory();

        assert!(inventory.low_stock().await.unwrap().is_empty());
        inventory
            .record_usage(&product.id, 3, Some("bread".to_string()), &Actor::system())
            .await
            .unwrap();

        let low = inventory.low_stock().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].id, product.id);

        let history = inventory.stock_history(&product.id).await.unwrap();
        let quantities: Vec<i64> = history.iter().map(|point| point.quantity).collect();
        assert_eq!(quantities, vec![12, 9]);
        inventory.verify_chain(&product.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_prune_cost_history() {
        let engine = engine().await;
        let product = flour(&engine, 1).await;
        let inventory = engine.inventory();

        for price in [dec!(1.30), dec!(1.40), dec!(1.50)] {
            inventory.set_cost_price(&product.id, price, None).await.unwrap();
        }

        assert_eq!(inventory.prune_cost_history(2).await.unwrap(), 2);
        let history = inventory.cost_history(&product.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].cost_price, dec!(1.50));
    }
}
