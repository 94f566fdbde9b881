//! # Domain Types
//!
//! Core domain types used throughout Pantry.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │ SaleTransaction │   │  CostOperation  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  product_type   │   │  receipt_number │   │  category       │       │
//! │  │  current_qty    │   │  items[]        │   │  amount         │       │
//! │  │  cost_price     │   │  total_amount   │   │  related_entity │       │
//! │  │  selling_price  │   │  payment_method │   │  occurred_at    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  ProductType    │   │ PaymentMethod   │   │  CostCategory   │       │
//! │  │  Stock          │   │  Cash           │   │  Inventory      │       │
//! │  │  Sellable       │   │  Card           │   │  Operational    │       │
//! │  │  Combination    │   │  BankTransfer   │   │  Overhead       │       │
//! │  └─────────────────┘   │  MobileWallet   │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ledger entries live in [`crate::ledger`] next to the invariants that
//! guard their construction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::ledger::{LedgerEntry, LedgerKind};
use crate::money::line_total;

// =============================================================================
// Actor
// =============================================================================

/// Identity of whoever triggered a change.
///
/// Supplied by the authentication layer; the engine only records it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor(String);

impl Actor {
    /// Creates an actor from a user identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Actor(id.into())
    }

    /// Actor used for background jobs and seeding.
    pub fn system() -> Self {
        Actor("system".to_string())
    }

    /// Returns the identifier.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Product Type
// =============================================================================

/// What a product is used for.
///
/// ```text
///  stock        raw ingredient (flour, oil); usage/adjustment only
///  sellable     finished item on the menu (bottled water)
///  combination  made from stock items and sold (burger combo)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Stock,
    Sellable,
    Combination,
}

impl ProductType {
    /// Returns the canonical lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProductType::Stock => "stock",
            ProductType::Sellable => "sellable",
            ProductType::Combination => "combination",
        }
    }

    /// Only sellable and combination products appear on a receipt.
    #[inline]
    pub const fn is_sellable(&self) -> bool {
        matches!(self, ProductType::Sellable | ProductType::Combination)
    }

    /// Stock and combination products must carry a cost price.
    #[inline]
    pub const fn requires_cost_price(&self) -> bool {
        matches!(self, ProductType::Stock | ProductType::Combination)
    }

    /// Sellable and combination products must carry a selling price.
    #[inline]
    pub const fn requires_selling_price(&self) -> bool {
        self.is_sellable()
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stock" => Ok(ProductType::Stock),
            "sellable" => Ok(ProductType::Sellable),
            "combination" => Ok(ProductType::Combination),
            other => Err(ValidationError::InvalidFormat {
                field: "product_type".to_string(),
                reason: format!("unknown product type '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Cost Allocation
// =============================================================================

/// How a product's cost is split across categories, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CostAllocation {
    #[ts(type = "string")]
    pub inventory: Decimal,
    #[ts(type = "string")]
    pub operational: Decimal,
    #[ts(type = "string")]
    pub overhead: Decimal,
}

impl CostAllocation {
    /// Creates an allocation (unvalidated; see
    /// [`validate_allocation`](crate::validation::validate_allocation)).
    pub const fn new(inventory: Decimal, operational: Decimal, overhead: Decimal) -> Self {
        CostAllocation {
            inventory,
            operational,
            overhead,
        }
    }

    /// Sum of the three percentages.
    #[inline]
    pub fn total(&self) -> Decimal {
        self.inventory + self.operational + self.overhead
    }
}

impl Default for CostAllocation {
    fn default() -> Self {
        CostAllocation::new(Decimal::ONE_HUNDRED, Decimal::ZERO, Decimal::ZERO)
    }
}

// =============================================================================
// Product
// =============================================================================

/// An ingredient or menu item tracked by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown on receipts and reports.
    pub name: String,

    /// Optional business identifier.
    pub sku: Option<String>,

    /// What the product is used for.
    pub product_type: ProductType,

    /// Units on hand. Never negative.
    pub current_quantity: i64,

    /// Reorder threshold.
    pub min_stock_level: i64,

    /// Purchase cost per unit.
    #[ts(type = "string | null")]
    pub cost_price: Option<Decimal>,

    /// Menu price per unit.
    #[ts(type = "string | null")]
    pub selling_price: Option<Decimal>,

    /// Percent split of this product's cost across categories.
    pub cost_allocation: CostAllocation,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// `cost_price × current_quantity`, zero without a cost price.
    pub fn inventory_value(&self) -> CoreResult<Decimal> {
        match self.cost_price {
            Some(cost) => line_total(cost, self.current_quantity),
            None => Ok(Decimal::ZERO),
        }
    }

    /// Selling price if it is set and strictly positive.
    pub fn effective_selling_price(&self) -> Option<Decimal> {
        self.selling_price.filter(|price| *price > Decimal::ZERO)
    }

    /// Checks if the product is at or below its reorder threshold.
    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.current_quantity <= self.min_stock_level
    }

    /// Checks if `quantity` units can be taken from stock.
    #[inline]
    pub fn has_stock_for(&self, quantity: i64) -> bool {
        self.current_quantity >= quantity
    }
}

/// Fields supplied when registering a product.
///
/// Opening stock is not part of it; it enters through the ledger as an
/// addition so the first entry of every chain starts at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub sku: Option<String>,
    pub product_type: ProductType,
    pub min_stock_level: i64,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    #[serde(default)]
    pub cost_allocation: CostAllocation,
}

impl NewProduct {
    /// Starts a product with default allocation and no reorder level.
    pub fn new(name: impl Into<String>, product_type: ProductType) -> Self {
        NewProduct {
            name: name.into(),
            sku: None,
            product_type,
            min_stock_level: 0,
            cost_price: None,
            selling_price: None,
            cost_allocation: CostAllocation::default(),
        }
    }

    pub fn sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    pub fn cost_price(mut self, cost: Decimal) -> Self {
        self.cost_price = Some(cost);
        self
    }

    pub fn selling_price(mut self, price: Decimal) -> Self {
        self.selling_price = Some(price);
        self
    }

    pub fn min_stock_level(mut self, level: i64) -> Self {
        self.min_stock_level = level;
        self
    }

    pub fn allocation(mut self, allocation: CostAllocation) -> Self {
        self.cost_allocation = allocation;
        self
    }

    /// Builds the stored product with zero quantity on hand.
    pub fn into_product(self, id: String, now: DateTime<Utc>) -> Product {
        Product {
            id,
            name: self.name.trim().to_string(),
            sku: self.sku.map(|s| s.trim().to_string()),
            product_type: self.product_type,
            current_quantity: 0,
            min_stock_level: self.min_stock_level,
            cost_price: self.cost_price,
            selling_price: self.selling_price,
            cost_allocation: self.cost_allocation,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One recorded cost-price change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CostHistoryEntry {
    pub product_id: String,
    /// Per-product sequence, starting at 1.
    pub sequence: i64,
    #[ts(type = "string")]
    pub cost_price: Decimal,
    pub reason: Option<String>,
    #[ts(as = "String")]
    pub recorded_at: DateTime<Utc>,
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    MobileWallet,
}

impl PaymentMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::MobileWallet => "mobile_wallet",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" | "credit" | "debit" => Ok(PaymentMethod::Card),
            "bank_transfer" | "transfer" => Ok(PaymentMethod::BankTransfer),
            "mobile_wallet" | "wallet" => Ok(PaymentMethod::MobileWallet),
            other => Err(ValidationError::InvalidFormat {
                field: "payment_method".to_string(),
                reason: format!("unsupported payment method '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A requested sale line, as received from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleLineRequest {
    pub product_id: String,
    pub quantity: i64,
    /// Informational only; the product's selling price always wins.
    pub unit_price: Option<Decimal>,
}

impl SaleLineRequest {
    /// Creates a line without a client-side price.
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        SaleLineRequest {
            product_id: product_id.into(),
            quantity,
            unit_price: None,
        }
    }
}

/// A line item in a committed sale.
/// Product name is snapshotted so receipts survive renames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    #[ts(type = "string")]
    pub unit_price: Decimal,
    /// unit_price × quantity
    #[ts(type = "string")]
    pub total_price: Decimal,
}

/// A committed sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleTransaction {
    pub id: String,
    pub receipt_number: String,
    pub items: Vec<SaleItem>,
    #[ts(type = "string")]
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub actor: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Cost Operations
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CostCategory {
    Inventory,
    Operational,
    Overhead,
}

impl CostCategory {
    /// All categories in report order.
    pub const ALL: [CostCategory; 3] = [
        CostCategory::Inventory,
        CostCategory::Operational,
        CostCategory::Overhead,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            CostCategory::Inventory => "inventory",
            CostCategory::Operational => "operational",
            CostCategory::Overhead => "overhead",
        }
    }
}

impl FromStr for CostCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inventory" => Ok(CostCategory::Inventory),
            "operational" => Ok(CostCategory::Operational),
            "overhead" => Ok(CostCategory::Overhead),
            other => Err(ValidationError::InvalidFormat {
                field: "category".to_string(),
                reason: format!("unknown cost category '{}'", other),
            }),
        }
    }
}

impl fmt::Display for CostCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of entity a cost is attributed to.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Product,
}

/// Direct attribution of a cost record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RelatedEntity {
    pub entity_type: EntityType,
    pub id: String,
}

impl RelatedEntity {
    /// Attributes a cost to one product.
    pub fn product(id: impl Into<String>) -> Self {
        RelatedEntity {
            entity_type: EntityType::Product,
            id: id.into(),
        }
    }

    /// Checks if this attribution targets the given product.
    pub fn is_product(&self, product_id: &str) -> bool {
        self.entity_type == EntityType::Product && self.id == product_id
    }
}

/// An immutable cost record. Corrections are new records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CostOperation {
    pub id: String,
    pub category: CostCategory,
    #[ts(type = "string")]
    pub amount: Decimal,
    pub description: Option<String>,
    pub related_entity: Option<RelatedEntity>,
    pub actor: String,
    /// When the cost was incurred (drives monthly reports).
    #[ts(as = "String")]
    pub occurred_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Date Range
// =============================================================================

/// Inclusive start, exclusive end. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        DateRange { start, end }
    }

    /// Range with no bounds.
    pub fn all() -> Self {
        DateRange::default()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at < end)
    }
}

// =============================================================================
// Domain Events
// =============================================================================

/// Notifications emitted after a successful commit.
///
/// Consumed by audit logging and UI cache invalidation. Delivery is not
/// part of the commit: a failed delivery never undoes the change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    SaleCreated {
        sale: SaleTransaction,
    },
    QuantityChanged {
        product_id: String,
        new_quantity: i64,
        delta: i64,
        kind: LedgerKind,
    },
}

impl DomainEvent {
    /// Event describing a committed ledger entry.
    pub fn quantity_changed(entry: &LedgerEntry) -> Self {
        DomainEvent::QuantityChanged {
            product_id: entry.product_id.clone(),
            new_quantity: entry.new_quantity,
            delta: entry.quantity_delta,
            kind: entry.kind,
        }
    }

    /// Outbox event type column value.
    pub const fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::SaleCreated { .. } => "SALE_CREATED",
            DomainEvent::QuantityChanged { .. } => "QUANTITY_CHANGED",
        }
    }

    /// ID of the entity the event is about.
    pub fn aggregate_id(&self) -> &str {
        match self {
            DomainEvent::SaleCreated { sale } => &sale.id,
            DomainEvent::QuantityChanged { product_id, .. } => product_id,
        }
    }
}

// =============================================================================
// Event Outbox
// =============================================================================

/// An entry in the event outbox.
/// Written in the same transaction as the change it describes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: String,
    /// "SALE_CREATED", "QUANTITY_CHANGED"
    pub event_type: String,
    pub aggregate_id: String,
    /// The full DomainEvent as JSON.
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn product(cost: Option<Decimal>, qty: i64) -> Product {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Product {
            id: "p1".to_string(),
            name: "Burger".to_string(),
            sku: None,
            product_type: ProductType::Sellable,
            current_quantity: qty,
            min_stock_level: 5,
            cost_price: cost,
            selling_price: Some(dec!(12.00)),
            cost_allocation: CostAllocation::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_inventory_value() {
        assert_eq!(product(Some(dec!(8.00)), 25).inventory_value().unwrap(), dec!(200.00));
        assert_eq!(product(None, 25).inventory_value().unwrap(), Decimal::ZERO);
        assert!(product(Some(Decimal::MAX), 2).inventory_value().is_err());
    }

    #[test]
    fn test_low_stock() {
        assert!(product(None, 5).is_low_stock());
        assert!(!product(None, 6).is_low_stock());
    }

    #[test]
    fn test_product_type_rules() {
        assert!(!ProductType::Stock.is_sellable());
        assert!(ProductType::Sellable.is_sellable());
        assert!(ProductType::Combination.is_sellable());
        assert!(ProductType::Combination.requires_cost_price());
        assert!(!ProductType::Sellable.requires_cost_price());
        assert_eq!("Combination".parse::<ProductType>().unwrap(), ProductType::Combination);
        assert!("dish".parse::<ProductType>().is_err());
    }

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!("cash".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
        assert_eq!("debit".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
        assert!("cheque".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_default_allocation_sums_to_hundred() {
        assert_eq!(CostAllocation::default().total(), dec!(100));
    }

    #[test]
    fn test_date_range_bounds() {
        let jan = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let feb = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let range = DateRange::new(Some(jan), Some(feb));
        assert!(range.contains(jan));
        assert!(!range.contains(feb));
        assert!(DateRange::all().contains(feb));
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = DomainEvent::QuantityChanged {
            product_id: "p1".to_string(),
            new_quantity: 20,
            delta: -5,
            kind: LedgerKind::Sale,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "quantity_changed");
        assert_eq!(json["kind"], "sale");
        assert_eq!(event.event_type(), "QUANTITY_CHANGED");
        assert_eq!(event.aggregate_id(), "p1");
    }
}
