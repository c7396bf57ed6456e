//! Transactional outbox relay.
//!
//! Every posted transaction gets an outbox row in the same commit. The relay
//! drains due rows to the event bus afterwards; a failed publish leaves the
//! row pending with a later `next_attempt_at`, so a bus outage never blocks
//! or undoes a ledger write.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use stockledger_events::{EventBus, EventEnvelope};
use stockledger_inventory::{LedgerEvent, MovementPosted, Transaction};

use crate::config::OutboxSettings;
use crate::retry::RetryPolicy;
use crate::store::{LedgerStore, NewOutboxMessage, StoreError};

pub const MOVEMENT_STREAM_TYPE: &str = "stock.transaction";

/// Outbox row announcing one committed transaction.
///
/// Keyed by the transaction id, so replaying a commit cannot queue it twice.
pub fn movement_message(tx: &Transaction) -> Result<NewOutboxMessage, StoreError> {
    let event = LedgerEvent::MovementPosted(MovementPosted::from(tx));
    let payload = serde_json::to_value(&event)
        .map_err(|e| StoreError::Backend(format!("outbox payload serialization failed: {e}")))?;
    Ok(NewOutboxMessage {
        event_id: *tx.id.as_uuid(),
        event_type: LedgerEvent::MOVEMENT_POSTED.to_string(),
        stream_type: MOVEMENT_STREAM_TYPE.to_string(),
        stream_id: *tx.id.as_uuid(),
        occurred_at: tx.created_at,
        payload,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub batch_size: usize,
    pub poll_interval: Duration,
    /// Failures after which a row is left for an operator.
    pub max_attempts: u32,
    pub retry: RetryPolicy,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from(&OutboxSettings::default())
    }
}

impl From<&OutboxSettings> for RelaySettings {
    fn from(settings: &OutboxSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            poll_interval: settings.poll_interval(),
            max_attempts: settings.max_attempts,
            retry: settings.retry_policy(),
        }
    }
}

/// Publishes pending outbox rows to a bus.
#[derive(Debug)]
pub struct OutboxRelay<S, B> {
    store: S,
    bus: B,
    settings: RelaySettings,
}

impl<S, B> OutboxRelay<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, settings: RelaySettings) -> Self {
        Self {
            store,
            bus,
            settings,
        }
    }

    /// Deliver one batch of due messages.
    pub async fn relay_once(&self) -> Result<RelayReport, StoreError> {
        let now = Utc::now();
        let pending = self
            .store
            .pending_outbox(self.settings.batch_size, self.settings.max_attempts, now)
            .await?;

        let mut report = RelayReport::default();
        let mut delivered = Vec::with_capacity(pending.len());
        for message in pending {
            match self.bus.publish(message.to_envelope()) {
                Ok(()) => delivered.push(message.id),
                Err(err) => {
                    let attempt = message.attempts + 1;
                    let next_attempt_at = now
                        + chrono::Duration::from_std(self.settings.retry.delay_for_attempt(attempt))
                            .unwrap_or_else(|_| chrono::Duration::seconds(60));
                    let error = format!("{err:?}");
                    warn!(
                        outbox_id = message.id,
                        event_id = %message.event_id,
                        attempt,
                        error = %error,
                        "outbox publish failed"
                    );
                    self.store
                        .record_outbox_failure(message.id, &error, next_attempt_at)
                        .await?;
                    report.failed += 1;
                }
            }
        }

        if !delivered.is_empty() {
            self.store.mark_outbox_delivered(&delivered).await?;
            report.delivered = delivered.len();
            debug!(delivered = report.delivered, "outbox batch delivered");
        }
        Ok(report)
    }
}

impl<S, B> OutboxRelay<S, B>
where
    S: LedgerStore + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    /// Run `relay_once` every poll interval on the current tokio runtime.
    pub fn spawn(self) -> RelayHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.settings.poll_interval);
            info!(poll_interval = ?self.settings.poll_interval, "outbox relay started");
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = tick.tick() => {
                        if let Err(err) = self.relay_once().await {
                            warn!(error = %err, "outbox relay pass failed");
                        }
                    }
                }
            }
            info!("outbox relay stopped");
        });
        RelayHandle {
            shutdown: Some(shutdown_tx),
            join,
        }
    }
}

#[derive(Debug)]
pub struct RelayHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl RelayHandle {
    /// Stop after the current pass and wait for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.join.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use chrono::NaiveDate;
    use stockledger_core::{PartNumber, TransactionId};
    use stockledger_events::InMemoryEventBus;
    use stockledger_inventory::TransactionType;

    use crate::store::{InMemoryLedgerStore, LedgerCommit};

    fn tx(key: &str) -> Transaction {
        Transaction {
            id: TransactionId::derive(key),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            part_number: PartNumber::parse("A1").unwrap(),
            kind: TransactionType::Inbound,
            quantity: 5,
            reference: "C-1".into(),
            notes: None,
            created_at: Utc::now(),
            balance_after: Some(5),
        }
    }

    async fn seed(store: &InMemoryLedgerStore, keys: &[&str]) {
        let txs: Vec<Transaction> = keys.iter().map(|k| tx(k)).collect();
        let outbox = txs.iter().map(|t| movement_message(t).unwrap()).collect();
        store
            .commit(LedgerCommit {
                transactions: txs,
                outbox,
                ..LedgerCommit::default()
            })
            .await
            .unwrap();
    }

    fn settings() -> RelaySettings {
        RelaySettings {
            batch_size: 10,
            poll_interval: Duration::from_millis(10),
            max_attempts: 3,
            retry: RetryPolicy::fixed(3, Duration::ZERO),
        }
    }

    #[test]
    fn message_is_keyed_by_transaction() {
        let t = tx("inbound:c1:l1");
        let msg = movement_message(&t).unwrap();
        assert_eq!(msg.event_id, *t.id.as_uuid());
        assert_eq!(msg.event_type, LedgerEvent::MOVEMENT_POSTED);

        let decoded: LedgerEvent = serde_json::from_value(msg.payload).unwrap();
        let LedgerEvent::MovementPosted(posted) = decoded;
        assert_eq!(posted.quantity, 5);
        assert_eq!(posted.transaction_id, t.id);
    }

    #[tokio::test]
    async fn offline_bus_keeps_messages_pending() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        seed(&store, &["a", "b"]).await;

        let relay = OutboxRelay::new(store.clone(), bus.clone(), settings());

        bus.set_offline(true);
        let report = relay.relay_once().await.unwrap();
        assert_eq!(report, RelayReport { delivered: 0, failed: 2 });
        assert!(sub.try_recv().is_err());

        bus.set_offline(false);
        let report = relay.relay_once().await.unwrap();
        assert_eq!(report, RelayReport { delivered: 2, failed: 0 });
        assert!(sub.try_recv().is_ok());
        assert!(sub.try_recv().is_ok());

        let report = relay.relay_once().await.unwrap();
        assert_eq!(report, RelayReport::default());
    }

    #[tokio::test]
    async fn exhausted_messages_are_left_alone() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        seed(&store, &["a"]).await;
        let relay = OutboxRelay::new(store.clone(), bus.clone(), settings());

        bus.set_offline(true);
        for _ in 0..3 {
            relay.relay_once().await.unwrap();
        }
        bus.set_offline(false);
        assert_eq!(relay.relay_once().await.unwrap(), RelayReport::default());
    }

    #[tokio::test]
    async fn spawned_relay_drains_and_stops() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        seed(&store, &["a"]).await;

        let handle = OutboxRelay::new(store.clone(), bus.clone(), settings()).spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown().await;

        let envelope = sub.try_recv().unwrap();
        assert_eq!(envelope.event_type(), LedgerEvent::MOVEMENT_POSTED);
    }
}
