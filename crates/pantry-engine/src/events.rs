//! # Event Dispatcher
//!
//! Delivers committed domain events from the outbox to event sinks.
//!
//! ## Dispatch Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Event Dispatch Flow                                  │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    event_outbox Table                           │   │
//! │  │                                                                 │   │
//! │  │  seq | event_type       | aggregate_id | attempts | delivered  │   │
//! │  │  ────┼──────────────────┼──────────────┼──────────┼─────────── │   │
//! │  │  41  │ SALE_CREATED     │ sale-001     │ 0        │ NULL       │   │
//! │  │  42  │ QUANTITY_CHANGED │ burger       │ 0        │ NULL       │   │
//! │  │  43  │ QUANTITY_CHANGED │ fries        │ 2        │ NULL       │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    EventDispatcher                              │   │
//! │  │                                                                 │   │
//! │  │  1. Fetch: undelivered, attempts < max, ORDER BY seq           │   │
//! │  │  2. Decode: payload → DomainEvent                              │   │
//! │  │  3. Deliver: every registered EventSink                        │   │
//! │  │  4. Mark: delivered_at = now        (all sinks accepted)       │   │
//! │  │           attempts += 1, last_error (any sink failed)          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  TRIGGERS:                                                             │
//! │  • Right after each committing operation                              │
//! │  • Background loop every poll interval (picks up retries)             │
//! │                                                                         │
//! │  Delivery is at-least-once. It never touches the committed change.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Duration as ChronoDuration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use pantry_core::{Clock, DomainEvent, OutboxEntry};
use pantry_db::Database;

use crate::config::EventSettings;
use crate::error::EngineResult;

// =============================================================================
// Sinks
// =============================================================================

/// A sink rejected an event.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct DeliveryError(pub String);

/// Receives committed domain events (audit logging, cache invalidation...).
///
/// Sinks must not block: heavy work belongs on the receiving side of a
/// channel.
pub trait EventSink: Send + Sync {
    /// Short name used in logs and `last_error`.
    fn name(&self) -> &str;

    fn deliver(&self, event: &DomainEvent) -> Result<(), DeliveryError>;
}

/// Fans events out over a `tokio::sync::broadcast` channel.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<DomainEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        BroadcastSink { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn name(&self) -> &str {
        "broadcast"
    }

    fn deliver(&self, event: &DomainEvent) -> Result<(), DeliveryError> {
        // No subscribers means nobody is listening right now, not a failure
        if self.tx.send(event.clone()).is_err() {
            debug!(event_type = event.event_type(), "No broadcast subscribers");
        }
        Ok(())
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DispatchReport {
    fn absorb(&mut self, other: DispatchReport) {
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

/// Delivers pending outbox entries to the registered sinks.
///
/// Cheap to clone; clones share sinks and the dispatch lock.
#[derive(Clone)]
pub struct EventDispatcher {
    db: Database,
    clock: Arc<dyn Clock>,
    settings: EventSettings,
    sinks: Arc<RwLock<Vec<Arc<dyn EventSink>>>>,
    /// One pass at a time, so an entry isn't delivered twice concurrently.
    pass: Arc<Mutex<()>>,
    /// Set by callers that found a pass running; the holder runs again.
    rerun: Arc<AtomicBool>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    pub fn new(db: Database, clock: Arc<dyn Clock>, settings: EventSettings) -> Self {
        Self::with_sinks(db, clock, settings, Vec::new())
    }

    /// Creates a dispatcher with sinks already registered.
    pub fn with_sinks(
        db: Database,
        clock: Arc<dyn Clock>,
        settings: EventSettings,
        sinks: Vec<Arc<dyn EventSink>>,
    ) -> Self {
        EventDispatcher {
            db,
            clock,
            settings,
            sinks: Arc::new(RwLock::new(sinks)),
            pass: Arc::new(Mutex::new(())),
            rerun: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Adds a sink. It receives every event delivered from now on.
    pub async fn register(&self, sink: Arc<dyn EventSink>) {
        info!(sink = sink.name(), "Registering event sink");
        self.sinks.write().await.push(sink);
    }

    /// Delivers up to one batch of pending entries, waiting for a running
    /// pass to finish first. Used by the background loop.
    pub async fn dispatch_pending(&self) -> EngineResult<DispatchReport> {
        let mut report = {
            let _pass = self.pass.lock().await;
            self.rerun.store(false, Ordering::SeqCst);
            self.dispatch_batch().await?
        };

        if let Some(more) = self.dispatch_requested().await? {
            report.absorb(more);
        }
        Ok(report)
    }

    /// Delivers pending entries without ever waiting on the dispatch lock.
    ///
    /// If a pass is already running, this returns `None` at once and the
    /// running pass does one more batch before it lets go, so events committed
    /// meanwhile are not left for the background loop.
    pub async fn try_dispatch_pending(&self) -> EngineResult<Option<DispatchReport>> {
        self.rerun.store(true, Ordering::SeqCst);
        self.dispatch_requested().await
    }

    /// Runs batches while a rerun is requested and the lock is free.
    ///
    /// The guard is dropped before the flag is read again, so a caller whose
    /// `try_lock` failed has always set the flag before that read.
    async fn dispatch_requested(&self) -> EngineResult<Option<DispatchReport>> {
        let mut total: Option<DispatchReport> = None;

        while self.rerun.load(Ordering::SeqCst) {
            let Ok(_pass) = self.pass.try_lock() else {
                debug!("Dispatch pass already running, leaving the events to it");
                break;
            };
            self.rerun.store(false, Ordering::SeqCst);
            let report = self.dispatch_batch().await?;
            total.get_or_insert_with(DispatchReport::default).absorb(report);
        }

        Ok(total)
    }

    /// One batch. Callers hold the `pass` lock.
    async fn dispatch_batch(&self) -> EngineResult<DispatchReport> {

        let entries = self
            .db
            .outbox()
            .get_pending(self.settings.batch_size, self.settings.max_attempts)
            .await?;

        if entries.is_empty() {
            return Ok(DispatchReport::default());
        }

        let sinks: Vec<Arc<dyn EventSink>> = self.sinks.read().await.clone();
        let mut report = DispatchReport::default();

        for entry in &entries {
            match self.deliver(entry, &sinks) {
                Ok(()) => {
                    self.db
                        .outbox()
                        .mark_delivered(&entry.id, self.clock.now())
                        .await?;
                    report.delivered += 1;
                }
                Err(reason) => {
                    self.db
                        .outbox()
                        .mark_failed(&entry.id, &reason, self.clock.now())
                        .await?;
                    report.failed += 1;

                    if entry.attempts + 1 >= i64::from(self.settings.max_attempts) {
                        warn!(
                            id = %entry.id,
                            event_type = %entry.event_type,
                            aggregate_id = %entry.aggregate_id,
                            attempts = entry.attempts + 1,
                            "Event exceeded max delivery attempts, skipping from now on"
                        );
                    } else {
                        warn!(
                            id = %entry.id,
                            event_type = %entry.event_type,
                            error = %reason,
                            "Event delivery failed"
                        );
                    }
                }
            }
        }

        debug!(
            delivered = report.delivered,
            failed = report.failed,
            "Dispatch pass complete"
        );
        Ok(report)
    }

    /// Hands one entry to every sink. The first rejection fails the entry.
    fn deliver(&self, entry: &OutboxEntry, sinks: &[Arc<dyn EventSink>]) -> Result<(), String> {
        let event: DomainEvent = serde_json::from_str(&entry.payload)
            .map_err(|e| format!("undecodable payload: {}", e))?;

        for sink in sinks {
            sink.deliver(&event)
                .map_err(|e| format!("{}: {}", sink.name(), e))?;
        }
        Ok(())
    }

    /// Deletes delivered entries older than the retention window.
    pub async fn cleanup(&self) -> EngineResult<u64> {
        let cutoff = self.clock.now() - ChronoDuration::days(i64::from(self.settings.retention_days));
        let deleted = self.db.outbox().cleanup_delivered(cutoff).await?;
        if deleted > 0 {
            info!(deleted = deleted, "Cleaned up delivered events");
        }
        Ok(deleted)
    }

    /// Starts the background loop: dispatch every poll interval, cleanup
    /// once an hour.
    pub fn spawn(&self) -> DispatcherHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let dispatcher = self.clone();
        let poll_interval = Duration::from_secs(self.settings.poll_interval_secs.max(1));

        let task = tokio::spawn(async move {
            info!("Event dispatcher starting");

            let mut poll = tokio::time::interval(poll_interval);
            poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut cleanup = tokio::time::interval(Duration::from_secs(3600));
            cleanup.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = poll.tick() => {
                        if let Err(e) = dispatcher.dispatch_pending().await {
                            error!(error = %e, "Failed to dispatch events");
                        }
                    }

                    _ = cleanup.tick() => {
                        if let Err(e) = dispatcher.cleanup().await {
                            error!(error = %e, "Failed to clean up delivered events");
                        }
                    }

                    _ = shutdown_rx.recv() => {
                        info!("Event dispatcher shutting down");
                        break;
                    }
                }
            }

            info!("Event dispatcher stopped");
        });

        DispatcherHandle { shutdown_tx, task }
    }
}

/// Handle for the background dispatch loop.
#[derive(Debug)]
pub struct DispatcherHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Stops the loop and waits for the current pass to finish.
    pub async fn shutdown(self) {
        // Loop already gone if the send fails
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            error!(error = %e, "Event dispatcher task failed");
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pantry_core::{FixedClock, LedgerKind};
    use pantry_db::{DbConfig, EventOutboxRepository};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Rejects everything, counting attempts.
    struct FailingSink {
        calls: AtomicUsize,
    }

    impl EventSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn deliver(&self, _event: &DomainEvent) -> Result<(), DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(DeliveryError("audit log offline".to_string()))
        }
    }

    fn event(delta: i64) -> DomainEvent {
        DomainEvent::QuantityChanged {
            product_id: "p1".to_string(),
            new_quantity: 10 + delta,
            delta,
            kind: LedgerKind::Adjustment,
        }
    }

    async fn setup(settings: EventSettings) -> (Database, EventDispatcher) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()));
        let dispatcher = EventDispatcher::new(db.clone(), clock, settings);
        (db, dispatcher)
    }

    async fn enqueue(db: &Database, event: &DomainEvent) {
        let mut conn = db.pool().acquire().await.unwrap();
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap();
        EventOutboxRepository::enqueue(&mut *conn, event, at)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_broadcast_delivery_in_order() {
        let (db, dispatcher) = setup(EventSettings::default()).await;
        let sink = Arc::new(BroadcastSink::new(16));
        let mut rx = sink.subscribe();
        dispatcher.register(sink).await;

        enqueue(&db, &event(1)).await;
        enqueue(&db, &event(2)).await;

        let report = dispatcher.dispatch_pending().await.unwrap();
        assert_eq!(report, DispatchReport { delivered: 2, failed: 0 });
        assert_eq!(rx.recv().await.unwrap(), event(1));
        assert_eq!(rx.recv().await.unwrap(), event(2));
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_recorded_then_skipped() {
        let settings = EventSettings {
            max_attempts: 2,
            ..EventSettings::default()
        };
        let (db, dispatcher) = setup(settings).await;
        let sink = Arc::new(FailingSink {
            calls: AtomicUsize::new(0),
        });
        dispatcher.register(sink.clone()).await;
        enqueue(&db, &event(1)).await;

        let first = dispatcher.dispatch_pending().await.unwrap();
        assert_eq!(first.failed, 1);

        let pending = db.outbox().get_pending(10, 10).await.unwrap();
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(
            pending[0].last_error.as_deref(),
            Some("failing: audit log offline")
        );

        dispatcher.dispatch_pending().await.unwrap();
        // Limit reached: no third attempt
        let third = dispatcher.dispatch_pending().await.unwrap();
        assert_eq!(third, DispatchReport::default());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(db.outbox().count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_try_dispatch_never_waits_for_running_pass() {
        let (db, dispatcher) = setup(EventSettings::default()).await;
        let sink = Arc::new(BroadcastSink::new(16));
        let mut rx = sink.subscribe();
        dispatcher.register(sink).await;
        enqueue(&db, &event(1)).await;

        let running = dispatcher.pass.clone().lock_owned().await;
        let skipped = tokio::time::timeout(Duration::from_secs(1), dispatcher.try_dispatch_pending())
            .await
            .expect("returned without waiting")
            .unwrap();
        assert_eq!(skipped, None);
        assert!(dispatcher.rerun.load(Ordering::SeqCst));
        assert_eq!(db.outbox().count_pending().await.unwrap(), 1);

        // The holder owes one more batch once it lets go
        drop(running);
        let report = dispatcher.dispatch_pending().await.unwrap();
        assert_eq!(report.delivered, 1);
        assert!(!dispatcher.rerun.load(Ordering::SeqCst));
        assert_eq!(rx.recv().await.unwrap(), event(1));

        let idle = dispatcher.try_dispatch_pending().await.unwrap();
        assert_eq!(idle, Some(DispatchReport::default()));
    }

    #[tokio::test]
    async fn test_cleanup_respects_retention() {
        let (db, dispatcher) = setup(EventSettings::default()).await;
        enqueue(&db, &event(1)).await;
        enqueue(&db, &event(2)).await;

        let pending = db.outbox().get_pending(10, 10).await.unwrap();
        let old = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let recent = Utc.with_ymd_and_hms(2024, 5, 31, 12, 0, 0).unwrap();
        db.outbox().mark_delivered(&pending[0].id, old).await.unwrap();
        db.outbox().mark_delivered(&pending[1].id, recent).await.unwrap();

        assert_eq!(dispatcher.cleanup().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_background_loop_delivers_and_stops() {
        let settings = EventSettings {
            poll_interval_secs: 1,
            ..EventSettings::default()
        };
        let (db, dispatcher) = setup(settings).await;
        let sink = Arc::new(BroadcastSink::new(16));
        let mut rx = sink.subscribe();
        dispatcher.register(sink).await;
        enqueue(&db, &event(3)).await;

        let handle = dispatcher.spawn();
        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, event(3));

        handle.shutdown().await;
    }
}
