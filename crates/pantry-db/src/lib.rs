//! # pantry-db: Persistence Layer for Pantry
//!
//! SQLite storage for products, the quantity ledger, sales, cost records
//! and the event outbox, using sqlx for async access.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Pantry Data Flow                                 │
//! │                                                                         │
//! │  pantry-engine (SaleProcessor, InventoryService, CostingService)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    pantry-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ ProductRepo   │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ LedgerRepo    │    │ 001_init.sql │  │   │
//! │  │   │ begin() → tx  │    │ SaleRepo      │    │ 002_outbox   │  │   │
//! │  │   │               │    │ CostOpRepo    │    │              │  │   │
//! │  │   └───────────────┘    │ OutboxRepo    │    └──────────────┘  │   │
//! │  │                        └───────────────┘                       │   │
//! │  │   ┌───────────────────────────────────────────────────────┐   │   │
//! │  │   │ StockGuard (stock.rs): conditional quantity update    │   │   │
//! │  │   │ + ledger append, on the caller's transaction          │   │   │
//! │  │   └───────────────────────────────────────────────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL, foreign keys on, busy_timeout)                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//! - [`stock`] - The guarded quantity write path
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pantry_db::{Database, DbConfig, StockChange, StockGuard};
//!
//! let db = Database::new(DbConfig::new("pantry.db")).await?;
//!
//! let mut tx = db.begin().await?;
//! StockGuard::apply_delta(&mut tx, StockChange::new(&id, LedgerKind::Usage, -2, "chef", now)).await?;
//! tx.commit().await?;
//!
//! let low = db.products().low_stock().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod stock;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use migrations::MigrationStatus;
pub use pool::{Database, DbConfig};
pub use stock::{StockChange, StockGuard};

// Repository re-exports for convenience
pub use repository::cost::CostOperationRepository;
pub use repository::ledger::LedgerRepository;
pub use repository::outbox::EventOutboxRepository;
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
