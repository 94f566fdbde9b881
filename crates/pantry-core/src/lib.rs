//! # pantry-core: Pure Business Logic for Pantry
//!
//! The inventory ledger rules, sale pricing and cost allocation math of the
//! Pantry restaurant engine, as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Pantry Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Request handlers (HTTP, UI, jobs)                  │   │
//! │  │    auth, permissions, routing: not part of this workspace       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    pantry-engine                                │   │
//! │  │    create_sale, restock, product_cost, total_costs, events      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ pantry-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  ledger   │  │  pricing  │  │  costing  │  │   │
//! │  │   │  Product  │  │  entries  │  │ pre-check │  │ allocation│  │   │
//! │  │   │   Sale    │  │  chains   │  │  totals   │  │  margins  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    pantry-db (Database Layer)                   │   │
//! │  │        SQLite, migrations, repositories, stock guard            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, SaleTransaction, CostOperation, etc.)
//! - [`ledger`] - Quantity ledger entries and their invariants
//! - [`pricing`] - Sale pre-check and line pricing
//! - [`costing`] - Cost allocation and period totals
//! - [`money`] - Decimal helpers (no floating point!)
//! - [`clock`] - Time source
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Decimal Money**: All monetary values are `rust_decimal::Decimal`
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use pantry_core::ledger::{LedgerDraft, LedgerKind};
//! use chrono::Utc;
//!
//! // Selling 5 of 25 burgers
//! let draft = LedgerDraft::new("burger", LedgerKind::Sale, -5, 25, 20, "cashier", Utc::now());
//! assert!(draft.is_ok());
//!
//! // Arithmetic that doesn't add up is rejected
//! let broken = LedgerDraft::new("burger", LedgerKind::Sale, -5, 25, 21, "cashier", Utc::now());
//! assert!(broken.is_err());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod costing;
pub mod error;
pub mod ledger;
pub mod money;
pub mod pricing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use pantry_core::LedgerEntry` instead of
// `use pantry_core::ledger::LedgerEntry`

pub use clock::{Clock, FixedClock, SystemClock};
pub use costing::{CostSnapshot, CostSummary, ProductCost};
pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::{LedgerDraft, LedgerEntry, LedgerKind};
pub use types::*;

use rust_decimal::Decimal;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single sale
///
/// ## Business Reason
/// Prevents runaway tickets and keeps the sale transaction short.
pub const MAX_SALE_LINES: usize = 100;

/// Maximum quantity of a single sale line
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10)
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Largest quantity a product may hold or a single movement may carry.
///
/// Keeps every `price × quantity` well inside the decimal range.
pub const MAX_STOCK_QUANTITY: i64 = 1_000_000_000;

/// Largest accepted price or cost amount (one billion).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Number of cost-history entries exposed per product.
pub const DEFAULT_COST_HISTORY_LIMIT: i64 = 50;
