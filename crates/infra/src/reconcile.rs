//! Stock table vs. transaction log reconciliation job.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use stockledger_core::BusinessDate;
use stockledger_inventory::{ReconciliationReport, Transaction, reconcile};

use crate::outbox::movement_message;
use crate::store::{LedgerCommit, LedgerStore, with_timeout};
use crate::workflows::{RunnerSettings, WorkflowError};

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationRun {
    pub report: ReconciliationReport,
    /// Repair rows appended in this run (empty unless repairing).
    pub repaired: Vec<Transaction>,
}

/// Compares every stock record with the running sum of its log rows and,
/// when asked to, appends ADJUSTMENT rows so the log explains the stock.
///
/// Stock and log are compared from one snapshot. Repairs never touch stock:
/// the stock table is taken as the truth.
pub struct ReconciliationJob<S> {
    store: S,
    settings: RunnerSettings,
}

impl<S: LedgerStore> ReconciliationJob<S> {
    pub fn new(store: S, settings: RunnerSettings) -> Self {
        Self { store, settings }
    }

    #[instrument(skip(self))]
    pub async fn run(&self, repair: bool, date: BusinessDate) -> Result<ReconciliationRun, WorkflowError> {
        self.run_at(repair, date, Utc::now()).await
    }

    async fn run_at(
        &self,
        repair: bool,
        date: BusinessDate,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationRun, WorkflowError> {
        let limit = self.settings.store_timeout;
        let snapshot = with_timeout(limit, self.store.snapshot()).await?;
        let report = reconcile(&snapshot.stock, &snapshot.transactions);

        for d in &report.divergences {
            warn!(
                part_number = %d.part_number,
                recorded_stock = d.recorded_stock,
                ledger_sum = d.ledger_sum,
                "stock diverges from transaction log"
            );
        }
        for m in &report.balance_mismatches {
            warn!(
                transaction_id = %m.transaction_id,
                part_number = %m.part_number,
                running_sum = m.running_sum,
                balance_after = m.balance_after,
                "balance_after disagrees with running sum"
            );
        }

        let mut repaired = Vec::new();
        if repair && !report.divergences.is_empty() {
            let reference = format!("RECON-{}", now.format("%Y%m%d%H%M%S"));
            let transactions = report
                .divergences
                .iter()
                .map(|d| d.repair(date, &reference).into_transaction(now))
                .collect::<Result<Vec<_>, _>>()?;
            let outbox = transactions
                .iter()
                .map(movement_message)
                .collect::<Result<Vec<_>, _>>()?;

            let receipt = with_timeout(
                limit,
                self.store.commit(LedgerCommit {
                    transactions: transactions.clone(),
                    outbox,
                    ..LedgerCommit::default()
                }),
            )
            .await?;
            repaired = transactions
                .into_iter()
                .filter(|t| receipt.appended.contains(&t.id))
                .collect();
            info!(reference = %reference, repaired = repaired.len(), "reconciliation repairs appended");
        }

        info!(
            checked_parts = report.checked_parts,
            divergences = report.divergences.len(),
            balance_mismatches = report.balance_mismatches.len(),
            "reconciliation finished"
        );
        Ok(ReconciliationRun { report, repaired })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use stockledger_core::{PartNumber, TransactionId};
    use stockledger_inventory::{StockRecord, StockWrite, TransactionQuery, TransactionType};
    use uuid::Uuid;

    use crate::store::{
        CommitReceipt, DocumentHead, InMemoryLedgerStore, LedgerSnapshot, OutboxMessage, StoreError,
        StoredEvent,
    };

    fn part(s: &str) -> PartNumber {
        PartNumber::parse(s).unwrap()
    }

    fn date() -> BusinessDate {
        NaiveDate::from_ymd_opt(2024, 4, 2).unwrap()
    }

    fn record(p: &str, stock: i64) -> StockRecord {
        let mut r = StockRecord::empty(part(p), Utc::now());
        r.current_stock = stock;
        r.version = 1;
        r
    }

    /// Lands a +5 receipt for A1 right before every read after the first,
    /// the way a workflow commit would between two separate reads.
    struct BusyStore {
        inner: InMemoryLedgerStore,
        reads: AtomicUsize,
    }

    impl BusyStore {
        async fn read_happens(&self) {
            if self.reads.fetch_add(1, Ordering::SeqCst) == 0 {
                return;
            }
            let a1 = part("A1");
            let current = self.inner.stock_records(&[a1.clone()]).await.unwrap();
            let (stock, version) = current
                .first()
                .map(|r| (r.current_stock, r.version))
                .unwrap_or((0, 0));
            let mut written = record("A1", stock + 5);
            written.version = version + 1;
            let id = TransactionId::derive(&format!("busy:{version}"));
            self.inner
                .commit(LedgerCommit {
                    stock_writes: vec![StockWrite {
                        record: written,
                        expected_version: version,
                    }],
                    transactions: vec![Transaction {
                        id,
                        date: date(),
                        part_number: a1,
                        kind: TransactionType::Inbound,
                        quantity: 5,
                        reference: "C-BUSY".into(),
                        notes: None,
                        created_at: Utc::now(),
                        balance_after: Some(stock + 5),
                    }],
                    ..LedgerCommit::default()
                })
                .await
                .unwrap();
        }
    }

    #[async_trait]
    impl LedgerStore for BusyStore {
        async fn load_stream(&self, stream_type: &str, stream_id: Uuid) -> Result<Vec<StoredEvent>, StoreError> {
            self.inner.load_stream(stream_type, stream_id).await
        }

        async fn document_heads(&self, stream_type: &str) -> Result<Vec<DocumentHead>, StoreError> {
            self.inner.document_heads(stream_type).await
        }

        async fn stock_records(&self, parts: &[PartNumber]) -> Result<Vec<StockRecord>, StoreError> {
            self.inner.stock_records(parts).await
        }

        async fn all_stock(&self) -> Result<Vec<StockRecord>, StoreError> {
            self.read_happens().await;
            self.inner.all_stock().await
        }

        async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, StoreError> {
            self.read_happens().await;
            self.inner.transactions(query).await
        }

        async fn snapshot(&self) -> Result<LedgerSnapshot, StoreError> {
            self.read_happens().await;
            self.inner.snapshot().await
        }

        async fn commit(&self, commit: LedgerCommit) -> Result<CommitReceipt, StoreError> {
            self.inner.commit(commit).await
        }

        async fn pending_outbox(
            &self,
            limit: usize,
            max_attempts: u32,
            now: DateTime<Utc>,
        ) -> Result<Vec<OutboxMessage>, StoreError> {
            self.inner.pending_outbox(limit, max_attempts, now).await
        }

        async fn mark_outbox_delivered(&self, ids: &[u64]) -> Result<(), StoreError> {
            self.inner.mark_outbox_delivered(ids).await
        }

        async fn record_outbox_failure(
            &self,
            id: u64,
            error: &str,
            next_attempt_at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.inner.record_outbox_failure(id, error, next_attempt_at).await
        }
    }

    #[tokio::test]
    async fn receipts_landing_between_runs_are_not_repaired() {
        let store = Arc::new(BusyStore {
            inner: InMemoryLedgerStore::new(),
            reads: AtomicUsize::new(0),
        });
        let job = ReconciliationJob::new(store.clone(), RunnerSettings::default());

        for _ in 0..3 {
            let run = job.run(true, date()).await.unwrap();
            assert!(run.report.is_consistent());
            assert!(run.repaired.is_empty());
        }

        let snapshot = store.inner.snapshot().await.unwrap();
        assert_eq!(snapshot.stock[0].current_stock, 10);
        let sum: i64 = snapshot.transactions.iter().map(|t| t.quantity).sum();
        assert_eq!(sum, 10);
    }

    #[tokio::test]
    async fn clean_ledger_reports_nothing() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let job = ReconciliationJob::new(store, RunnerSettings::default());
        let run = job.run(true, date()).await.unwrap();
        assert!(run.report.is_consistent());
        assert!(run.repaired.is_empty());
    }

    #[tokio::test]
    async fn repair_explains_unlogged_stock() {
        let store = Arc::new(InMemoryLedgerStore::new());
        store.force_stock(record("A1", 6)).unwrap();
        let job = ReconciliationJob::new(store.clone(), RunnerSettings::default());

        let dry = job.run(false, date()).await.unwrap();
        assert_eq!(dry.report.divergences.len(), 1);
        assert!(dry.repaired.is_empty());

        let run = job.run(true, date()).await.unwrap();
        assert_eq!(run.repaired.len(), 1);
        assert_eq!(run.repaired[0].quantity, 6);
        assert_eq!(run.repaired[0].kind, TransactionType::Adjustment);
        assert!(run.repaired[0].reference.starts_with("RECON-"));

        let after = job.run(false, date()).await.unwrap();
        assert!(after.report.is_consistent());
    }
}
