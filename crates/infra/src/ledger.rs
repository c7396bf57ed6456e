//! Stock table and transaction log primitives.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use stockledger_core::{BusinessDate, PartNumber};
use stockledger_inventory::{
    Movement, NewTransaction, StockRecord, StockWrite, Transaction, TransactionQuery,
};

use crate::outbox::movement_message;
use crate::store::{LedgerCommit, LedgerStore, StoreError};
use crate::workflows::{PostingOutcome, WorkflowError, WorkflowRunner};

/// Result of [`StockLedger::append_transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    pub transaction: Transaction,
    /// The id was already in the log; nothing was written.
    pub duplicate: bool,
}

pub struct StockLedger<S> {
    runner: Arc<WorkflowRunner<S>>,
}

impl<S: LedgerStore> StockLedger<S> {
    pub fn new(runner: Arc<WorkflowRunner<S>>) -> Self {
        Self { runner }
    }

    /// Current stock; 0 for parts never touched.
    pub async fn get_stock(&self, part_number: &PartNumber) -> Result<i64, WorkflowError> {
        Ok(self
            .stock_record(part_number)
            .await?
            .map(|r| r.current_stock)
            .unwrap_or(0))
    }

    pub async fn stock_record(&self, part_number: &PartNumber) -> Result<Option<StockRecord>, WorkflowError> {
        let records = self
            .runner
            .stock_records(std::slice::from_ref(part_number))
            .await?;
        Ok(records.into_iter().next())
    }

    pub async fn all_stock(&self) -> Result<Vec<StockRecord>, WorkflowError> {
        Ok(self.runner.call(self.runner.store().all_stock()).await?)
    }

    /// Create the zero row for a part that has none. No transaction is logged.
    #[instrument(skip(self), fields(part_number = %part_number))]
    pub async fn ensure_stock(&self, part_number: &PartNumber) -> Result<StockRecord, WorkflowError> {
        if let Some(record) = self.stock_record(part_number).await? {
            return Ok(record);
        }

        let write = StockWrite::create_empty(part_number.clone(), Utc::now());
        let record = write.record.clone();
        let commit = LedgerCommit {
            stock_writes: vec![write],
            ..LedgerCommit::default()
        };
        match self.runner.call(self.runner.store().commit(commit)).await {
            Ok(_) => {
                debug!("stock record created");
                Ok(record)
            }
            // Someone else created it first.
            Err(StoreError::Conflict(_)) => self
                .stock_record(part_number)
                .await?
                .ok_or_else(|| WorkflowError::NotFound(format!("stock for {part_number}"))),
            Err(err) => Err(err.into()),
        }
    }

    /// Set stock to `value`, logging the signed difference as an ADJUSTMENT.
    ///
    /// Setting the current value again writes nothing.
    #[instrument(skip(self, notes), fields(part_number = %part_number))]
    pub async fn upsert_stock(
        &self,
        part_number: &PartNumber,
        value: i64,
        date: BusinessDate,
        reference: &str,
        notes: Option<String>,
    ) -> Result<PostingOutcome, WorkflowError> {
        if reference.trim().is_empty() {
            return Err(WorkflowError::Validation("reference cannot be empty".to_string()));
        }
        let parts = std::slice::from_ref(part_number);
        let outcome = self
            .runner
            .post(parts, |records| {
                let version = records.first().map(|r| r.version).unwrap_or(0);
                Ok(vec![Movement::adjustment(
                    format!("upsert:{reference}:{part_number}:{version}:{value}"),
                    part_number.clone(),
                    value,
                    date,
                    reference,
                    notes.clone(),
                )])
            })
            .await?;

        if value == 0 && outcome.transactions.is_empty() {
            self.ensure_stock(part_number).await?;
        }
        Ok(outcome)
    }

    /// Append a log row without touching stock.
    ///
    /// The id is the caller's; appending the same id again reports a duplicate
    /// instead of writing a second row.
    #[instrument(skip(self, tx), fields(transaction_id = %tx.id, part_number = %tx.part_number))]
    pub async fn append_transaction(&self, tx: NewTransaction) -> Result<AppendOutcome, WorkflowError> {
        let transaction = tx.into_transaction(Utc::now())?;
        let commit = LedgerCommit {
            outbox: vec![movement_message(&transaction)?],
            transactions: vec![transaction.clone()],
            ..LedgerCommit::default()
        };
        let receipt = self.runner.call(self.runner.store().commit(commit)).await?;
        let duplicate = receipt.skipped.contains(&transaction.id);
        Ok(AppendOutcome {
            transaction,
            duplicate,
        })
    }

    /// Log rows matching `query`, in append order.
    pub async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, WorkflowError> {
        Ok(self.runner.call(self.runner.store().transactions(query)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;
    use stockledger_core::TransactionId;
    use stockledger_inventory::TransactionType;

    use crate::store::InMemoryLedgerStore;
    use crate::workflows::RunnerSettings;

    fn part(s: &str) -> PartNumber {
        PartNumber::parse(s).unwrap()
    }

    fn date(d: u32) -> BusinessDate {
        NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
    }

    fn ledger() -> StockLedger<Arc<InMemoryLedgerStore>> {
        let store = Arc::new(InMemoryLedgerStore::new());
        StockLedger::new(Arc::new(WorkflowRunner::new(store, RunnerSettings::default())))
    }

    #[tokio::test]
    async fn absent_part_reads_as_zero() {
        let ledger = ledger();
        assert_eq!(ledger.get_stock(&part("A1")).await.unwrap(), 0);
        assert!(ledger.stock_record(&part("A1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ensure_stock_creates_once_without_logging() {
        let ledger = ledger();
        let first = ledger.ensure_stock(&part("A1")).await.unwrap();
        let second = ledger.ensure_stock(&part("A1")).await.unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 1);
        assert!(ledger.transactions(&TransactionQuery::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_logs_signed_delta_and_is_idempotent() {
        let ledger = ledger();
        let a1 = part("A1");

        let up = ledger.upsert_stock(&a1, 7, date(1), "INIT", None).await.unwrap();
        assert_eq!(up.transactions[0].quantity, 7);
        assert_eq!(up.transactions[0].kind, TransactionType::Adjustment);

        let down = ledger.upsert_stock(&a1, 4, date(2), "INIT", None).await.unwrap();
        assert_eq!(down.transactions[0].quantity, -3);
        assert_eq!(down.transactions[0].balance_after, Some(4));

        let again = ledger.upsert_stock(&a1, 4, date(2), "INIT", None).await.unwrap();
        assert!(again.transactions.is_empty());

        assert_eq!(ledger.get_stock(&a1).await.unwrap(), 4);
        let log = ledger.transactions(&TransactionQuery::for_part(a1)).await.unwrap();
        assert_eq!(log.iter().map(|t| t.quantity).sum::<i64>(), 4);
    }

    #[tokio::test]
    async fn upsert_back_to_an_earlier_value_is_logged() {
        let ledger = ledger();
        let a1 = part("A1");

        ledger.upsert_stock(&a1, 10, date(1), "INIT", None).await.unwrap();
        ledger.upsert_stock(&a1, 0, date(1), "INIT", None).await.unwrap();
        let third = ledger.upsert_stock(&a1, 10, date(1), "INIT", None).await.unwrap();
        assert_eq!(third.transactions.len(), 1);
        assert_eq!(third.transactions[0].quantity, 10);

        let log = ledger.transactions(&TransactionQuery::for_part(a1.clone())).await.unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log.iter().map(|t| t.quantity).sum::<i64>(), 10);
        assert_eq!(ledger.get_stock(&a1).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn upsert_to_zero_creates_the_record() {
        let ledger = ledger();
        ledger.upsert_stock(&part("B2"), 0, date(1), "INIT", None).await.unwrap();
        assert!(ledger.stock_record(&part("B2")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn negative_value_is_rejected() {
        let ledger = ledger();
        let err = ledger
            .upsert_stock(&part("A1"), -1, date(1), "INIT", None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[tokio::test]
    async fn append_is_deduplicated_by_id() {
        let ledger = ledger();
        let tx = NewTransaction {
            id: TransactionId::derive("manual:1"),
            date: date(3),
            part_number: part("A1"),
            kind: TransactionType::Inbound,
            quantity: 5,
            reference: "MANUAL".into(),
            notes: None,
        };

        assert!(!ledger.append_transaction(tx.clone()).await.unwrap().duplicate);
        assert!(ledger.append_transaction(tx.clone()).await.unwrap().duplicate);
        assert_eq!(ledger.transactions(&TransactionQuery::default()).await.unwrap().len(), 1);
        assert_eq!(ledger.get_stock(&part("A1")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn append_enforces_sign_convention() {
        let ledger = ledger();
        let err = ledger
            .append_transaction(NewTransaction {
                id: TransactionId::derive("manual:2"),
                date: date(3),
                part_number: part("A1"),
                kind: TransactionType::Outbound,
                quantity: 5,
                reference: "MANUAL".into(),
                notes: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }
}
