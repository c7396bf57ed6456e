//! Infrastructure wiring: store, bus, workflow services and background workers.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use stockledger_events::{EventEnvelope, InMemoryEventBus};
use stockledger_infra::{
    catalog::{InMemoryPartCatalog, PartCatalog},
    config::LedgerSettings,
    ledger::StockLedger,
    outbox::{OutboxRelay, RelayHandle, RelaySettings},
    reconcile::ReconciliationJob,
    store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError},
    tracker::{InMemoryMovementTracker, TrackerWorker, WorkerHandle},
    workflows::{
        AdjustmentService, CountService, ReceivingService, RunnerSettings, ShipmentService,
        WorkflowRunner,
    },
};

pub type SharedStore = Arc<dyn LedgerStore>;
pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid settings: {0}")]
    Settings(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to start worker: {0}")]
    Worker(#[from] std::io::Error),
}

/// Everything the handlers need, shared behind one `Arc`.
pub struct AppServices {
    pub ledger: StockLedger<SharedStore>,
    pub receiving: ReceivingService<SharedStore>,
    pub shipments: ShipmentService<SharedStore>,
    pub counts: CountService<SharedStore>,
    pub adjustments: AdjustmentService<SharedStore>,
    pub reconciliation: ReconciliationJob<SharedStore>,
    pub relay: OutboxRelay<SharedStore, SharedBus>,
}

impl AppServices {
    pub fn new(
        store: SharedStore,
        bus: SharedBus,
        catalog: Arc<dyn PartCatalog>,
        settings: &LedgerSettings,
    ) -> Result<Self, SetupError> {
        let adjustment_parts = settings
            .quick_adjustment_parts()
            .map_err(|e| SetupError::Settings(e.to_string()))?;
        let runner_settings = RunnerSettings::from(settings);
        let runner = Arc::new(WorkflowRunner::new(store.clone(), runner_settings.clone()));

        Ok(Self {
            ledger: StockLedger::new(runner.clone()),
            receiving: ReceivingService::new(runner.clone(), catalog.clone()),
            shipments: ShipmentService::new(runner.clone(), catalog.clone()),
            counts: CountService::new(runner.clone(), catalog),
            adjustments: AdjustmentService::new(runner, adjustment_parts),
            reconciliation: ReconciliationJob::new(store.clone(), runner_settings),
            relay: OutboxRelay::new(store, bus, RelaySettings::from(&settings.outbox)),
        })
    }
}

/// Postgres when `database.url` is set, otherwise the in-memory store.
pub async fn open_store(settings: &LedgerSettings) -> Result<SharedStore, SetupError> {
    match settings.database.url.as_deref() {
        Some(url) => {
            let store = PostgresLedgerStore::connect(url, settings.database.max_connections).await?;
            store.migrate().await?;
            tracing::info!("using postgres ledger store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("database.url not set; ledger data lives in memory only");
            Ok(Arc::new(InMemoryLedgerStore::new()))
        }
    }
}

pub fn catalog_from(settings: &LedgerSettings) -> Result<Arc<dyn PartCatalog>, SetupError> {
    let parts = settings
        .catalog_parts()
        .map_err(|e| SetupError::Settings(e.to_string()))?;
    Ok(Arc::new(InMemoryPartCatalog::with_parts(parts)))
}

/// Outbox relay task plus the movement tracker fed from the bus.
pub struct BackgroundWorkers {
    relay: RelayHandle,
    tracker: WorkerHandle,
}

impl BackgroundWorkers {
    pub fn start(store: SharedStore, bus: SharedBus, settings: &LedgerSettings) -> Result<Self, SetupError> {
        let tracker = TrackerWorker::spawn(
            bus.clone(),
            Arc::new(InMemoryMovementTracker::new()),
            settings.outbox.retry_policy(),
        )?;
        let relay = OutboxRelay::new(store, bus, RelaySettings::from(&settings.outbox)).spawn();
        Ok(Self { relay, tracker })
    }

    pub async fn shutdown(self) {
        self.relay.shutdown().await;
        // Joining the tracker thread blocks.
        let tracker = self.tracker;
        let _ = tokio::task::spawn_blocking(move || tracker.shutdown()).await;
    }
}
