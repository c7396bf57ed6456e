//! Per-part-per-day movement tracker fed from the bus.
//!
//! Shipments must reach the external tracker, but a tracker outage must never
//! fail a confirmation. The relay delivers committed movements to the bus,
//! and [`TrackerWorker`] forwards the OUTBOUND ones here on its own thread.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

use stockledger_core::{BusinessDate, PartNumber, TransactionId};
use stockledger_events::{EventBus, EventEnvelope, Subscription, Topical};
use stockledger_inventory::{LedgerEvent, MovementPosted, TransactionType};

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("tracker unavailable: {0}")]
    Unavailable(String),

    #[error("malformed movement payload: {0}")]
    Malformed(String),
}

/// External sink for shipped quantities. Must tolerate redelivery.
pub trait MovementTracker: Send + Sync {
    fn track(&self, movement: &MovementPosted) -> Result<(), TrackerError>;
}

impl<T> MovementTracker for Arc<T>
where
    T: MovementTracker + ?Sized,
{
    fn track(&self, movement: &MovementPosted) -> Result<(), TrackerError> {
        (**self).track(movement)
    }
}

/// Tracker kept in memory; sums shipped units per part and business date.
#[derive(Debug, Default)]
pub struct InMemoryMovementTracker {
    inner: Mutex<TrackerState>,
    failing: AtomicBool,
}

#[derive(Debug, Default)]
struct TrackerState {
    seen: HashSet<TransactionId>,
    shipped: BTreeMap<(PartNumber, BusinessDate), i64>,
}

impl InMemoryMovementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault injection: fail every `track` call while set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Units shipped for `part` on `date`.
    pub fn shipped(&self, part: &PartNumber, date: BusinessDate) -> i64 {
        self.inner
            .lock()
            .ok()
            .and_then(|s| s.shipped.get(&(part.clone(), date)).copied())
            .unwrap_or(0)
    }

    pub fn tracked_count(&self) -> usize {
        self.inner.lock().map(|s| s.seen.len()).unwrap_or(0)
    }
}

impl MovementTracker for InMemoryMovementTracker {
    fn track(&self, movement: &MovementPosted) -> Result<(), TrackerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TrackerError::Unavailable("tracker switched off".into()));
        }
        let mut state = self
            .inner
            .lock()
            .map_err(|_| TrackerError::Unavailable("tracker state poisoned".into()))?;
        if !state.seen.insert(movement.transaction_id) {
            return Ok(());
        }
        *state
            .shipped
            .entry((movement.part_number.clone(), movement.date))
            .or_insert(0) += -movement.quantity;
        Ok(())
    }
}

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

#[derive(Debug)]
pub struct TrackerWorker;

impl TrackerWorker {
    /// Spawn a thread forwarding OUTBOUND movements from `bus` to `tracker`.
    ///
    /// A failed `track` call is retried per `retry`, then dropped with a warning.
    pub fn spawn<B, T>(bus: B, tracker: T, retry: RetryPolicy) -> std::io::Result<WorkerHandle>
    where
        B: EventBus<EventEnvelope<JsonValue>>,
        T: MovementTracker + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe();

        let join = thread::Builder::new()
            .name("movement-tracker".to_string())
            .spawn(move || worker_loop(sub, shutdown_rx, &tracker, &retry))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<T: MovementTracker>(
    sub: Subscription<EventEnvelope<JsonValue>>,
    shutdown_rx: mpsc::Receiver<()>,
    tracker: &T,
    retry: &RetryPolicy,
) {
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(envelope) => {
                if envelope.topic() != LedgerEvent::MOVEMENT_POSTED {
                    continue;
                }
                if let Err(err) = forward(&envelope, tracker, retry) {
                    warn!(event_id = %envelope.event_id(), error = %err, "movement not tracked");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn forward<T: MovementTracker>(
    envelope: &EventEnvelope<JsonValue>,
    tracker: &T,
    retry: &RetryPolicy,
) -> Result<(), TrackerError> {
    let LedgerEvent::MovementPosted(movement) = envelope
        .decode::<LedgerEvent>()
        .map_err(|e| TrackerError::Malformed(e.to_string()))?;
    if movement.kind != TransactionType::Outbound {
        return Ok(());
    }

    let mut retries = 0;
    loop {
        match tracker.track(&movement) {
            Ok(()) => {
                debug!(transaction_id = %movement.transaction_id, "movement tracked");
                return Ok(());
            }
            Err(err) if retry.should_retry(retries) => {
                retries += 1;
                warn!(
                    transaction_id = %movement.transaction_id,
                    retries,
                    error = %err,
                    "tracker call failed, retrying"
                );
                thread::sleep(retry.delay_for_attempt(retries));
            }
            Err(err) => return Err(err),
        }
    }
}
