//! # pantry-engine: Orchestration Layer for Pantry
//!
//! Sales, stock movements and cost reports on top of `pantry-db`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Pantry Request Flow                              │
//! │                                                                         │
//! │  Request handlers (till, back office, reports)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Engine (THIS CRATE)                          │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐  ┌──────────────────┐  ┌───────────────┐  │   │
//! │  │   │ SaleProcessor │  │ InventoryService │  │ CostingService│  │   │
//! │  │   │  create_sale  │  │ restock, usage,  │  │ product_cost, │  │   │
//! │  │   │               │  │ adjust, costs    │  │ total_costs   │  │   │
//! │  │   └───────┬───────┘  └────────┬─────────┘  └───────┬───────┘  │   │
//! │  │           │ one tx each       │                    │ reads    │   │
//! │  │           ▼                   ▼                    ▼          │   │
//! │  │   ┌─────────────────────────────────────────────────────────┐ │   │
//! │  │   │ pantry-db: StockGuard, repositories, event_outbox       │ │   │
//! │  │   └─────────────────────────────────────────────────────────┘ │   │
//! │  │           │ after commit                                       │   │
//! │  │           ▼                                                    │   │
//! │  │   ┌─────────────────────────────────────────────────────────┐ │   │
//! │  │   │ EventDispatcher ──► BroadcastSink, custom EventSinks    │ │   │
//! │  │   └─────────────────────────────────────────────────────────┘ │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Engine configuration (TOML file + environment)
//! - [`error`] - Engine error type and caller-facing reports
//! - [`events`] - Outbox dispatch and event sinks
//! - [`sale`] - The sale unit of work
//! - [`inventory`] - Products, stock movements, cost records
//! - [`costing`] - Cost allocation reports
//! - [`telemetry`] - Tracing setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pantry_engine::{init_tracing, Engine, EngineConfig};
//!
//! let config = EngineConfig::load(None)?;
//! init_tracing(&config.logging);
//!
//! let engine = Engine::open(config).await?;
//! let dispatcher = engine.start_dispatcher();
//!
//! let sale = engine
//!     .sales()
//!     .create_sale(vec![SaleLineRequest::new(&burger_id, 2)], PaymentMethod::Cash, &actor)
//!     .await?;
//!
//! let report = engine.costing().product_cost(&burger_id).await?;
//! dispatcher.shutdown().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod costing;
pub mod error;
pub mod events;
pub mod inventory;
pub mod sale;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, EngineConfig};
pub use costing::CostingService;
pub use error::{EngineError, EngineResult, ErrorCode, ErrorReport};
pub use events::{
    BroadcastSink, DeliveryError, DispatchReport, DispatcherHandle, EventDispatcher, EventSink,
};
pub use inventory::{CostRecord, InventoryService};
pub use sale::SaleProcessor;
pub use telemetry::init_tracing;

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use pantry_core::{Clock, DomainEvent, SystemClock};
use pantry_db::Database;

// =============================================================================
// Engine
// =============================================================================

/// Entry point: one store, one clock, one dispatcher, shared by every
/// service handed out.
///
/// Cheap to clone; request handlers each take their own copy.
#[derive(Debug, Clone)]
pub struct Engine {
    db: Database,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
    dispatcher: EventDispatcher,
    broadcast: BroadcastSink,
}

impl Engine {
    /// Validates the configuration and opens the configured database.
    pub async fn open(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let path = config.database.resolved_path();
        info!(path = %path.display(), "Opening engine");

        let db = Database::new(config.database.to_db_config()).await?;
        Ok(Self::new(db, config, Arc::new(SystemClock)))
    }

    /// Builds an engine on an already opened database.
    pub fn new(db: Database, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let broadcast = BroadcastSink::new(config.events.broadcast_capacity);
        let sink: Arc<dyn EventSink> = Arc::new(broadcast.clone());
        let dispatcher = EventDispatcher::with_sinks(
            db.clone(),
            clock.clone(),
            config.events.clone(),
            vec![sink],
        );

        Engine {
            db,
            clock,
            config: Arc::new(config),
            dispatcher,
            broadcast,
        }
    }

    pub fn sales(&self) -> SaleProcessor {
        SaleProcessor::new(
            self.db.clone(),
            self.clock.clone(),
            self.config.clone(),
            self.dispatcher.clone(),
        )
    }

    pub fn inventory(&self) -> InventoryService {
        InventoryService::new(
            self.db.clone(),
            self.clock.clone(),
            self.config.clone(),
            self.dispatcher.clone(),
        )
    }

    pub fn costing(&self) -> CostingService {
        CostingService::new(self.db.clone())
    }

    /// The dispatcher, for registering sinks or dispatching by hand.
    pub fn events(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Receives every delivered event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.broadcast.subscribe()
    }

    /// Starts background retries and outbox cleanup.
    pub fn start_dispatcher(&self) -> DispatcherHandle {
        self.dispatcher.spawn()
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Closes the store. Call after stopping the dispatcher.
    pub async fn close(&self) {
        self.db.close().await;
        info!("Engine closed");
    }
}

// =============================================================================
// End-to-End Tests
// =============================================================================
