//! Workflow execution pipeline.
//!
//! ```text
//! command
//!   ↓
//! 1. load the document stream and rehydrate
//!   ↓
//! 2. decide events (pure; empty = accepted no-op)
//!   ↓
//! 3. apply them, collecting stock movements
//!   ↓
//! 4. read touched stock rows, plan stock writes + log rows
//!   ↓
//! 5. one atomic commit: events, stock, log, outbox
//! ```
//!
//! A version conflict anywhere in step 5 sends the command back to step 1.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use stockledger_core::{DomainError, DomainResult, PartNumber};
use stockledger_inventory::{
    LedgerPostings, Movement, PostingPlan, PostingSettings, StockRecord, StockWarning,
    Transaction, apply_with_effects,
};

use crate::config::LedgerSettings;
use crate::outbox::movement_message;
use crate::retry::RetryPolicy;
use crate::store::{
    CommitReceipt, DocumentAppend, LedgerCommit, LedgerStore, StoreError, StoredEvent, UncommittedEvent,
    stream_version, validate_loaded_stream, with_timeout,
};

use super::document::LedgerDocument;
use super::error::WorkflowError;

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub posting: PostingSettings,
    pub store_timeout: Duration,
    pub conflict_retry: RetryPolicy,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            posting: PostingSettings::default(),
            store_timeout: Duration::from_secs(5),
            conflict_retry: RetryPolicy::default(),
        }
    }
}

impl From<&LedgerSettings> for RunnerSettings {
    fn from(settings: &LedgerSettings) -> Self {
        Self {
            posting: settings.posting(),
            store_timeout: settings.store_timeout(),
            conflict_retry: settings.conflict_retry(),
        }
    }
}

/// Result of one document command.
#[derive(Debug, Clone)]
pub struct WorkflowOutcome<D> {
    /// State after the command.
    pub document: D,
    /// Events appended; empty when the command was a no-op.
    pub events: Vec<StoredEvent>,
    pub transactions: Vec<Transaction>,
    pub warnings: Vec<StockWarning>,
}

impl<D> WorkflowOutcome<D> {
    fn unchanged(document: D) -> Self {
        Self {
            document,
            events: Vec::new(),
            transactions: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn changed(&self) -> bool {
        !self.events.is_empty()
    }
}

/// Result of a document-less posting (quick adjustment, direct upsert).
#[derive(Debug, Clone, Default)]
pub struct PostingOutcome {
    pub transactions: Vec<Transaction>,
    pub warnings: Vec<StockWarning>,
}

/// Why a single attempt stopped.
enum StepError {
    /// Lost a version race; re-read and decide again.
    Stale(String),
    Failed(WorkflowError),
}

impl From<StoreError> for StepError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => StepError::Stale(msg),
            other => StepError::Failed(other.into()),
        }
    }
}

impl From<DomainError> for StepError {
    fn from(value: DomainError) -> Self {
        StepError::Failed(value.into())
    }
}

impl From<WorkflowError> for StepError {
    fn from(value: WorkflowError) -> Self {
        StepError::Failed(value)
    }
}

/// Shared execution engine behind every workflow service.
#[derive(Debug)]
pub struct WorkflowRunner<S> {
    store: S,
    settings: RunnerSettings,
}

impl<S> WorkflowRunner<S> {
    pub fn new(store: S, settings: RunnerSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }
}

impl<S> WorkflowRunner<S>
where
    S: LedgerStore,
{
    /// Run a store call under the configured timeout.
    pub async fn call<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        with_timeout(self.settings.store_timeout, call).await
    }

    /// Current state of a document (possibly never created).
    pub async fn load<D: LedgerDocument>(&self, stream_id: Uuid) -> Result<D, WorkflowError> {
        let (document, _) = self.rehydrate::<D>(stream_id).await?;
        Ok(document)
    }

    pub async fn stock_records(&self, parts: &[PartNumber]) -> Result<Vec<StockRecord>, WorkflowError> {
        if parts.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.call(self.store.stock_records(parts)).await?)
    }

    /// Decide `command` against the latest state and commit the outcome.
    #[instrument(skip(self, command), fields(stream_type = D::STREAM_TYPE, stream_id = %stream_id))]
    pub async fn execute<D: LedgerDocument>(
        &self,
        stream_id: Uuid,
        command: D::Command,
    ) -> Result<WorkflowOutcome<D>, WorkflowError> {
        let mut retries = 0;
        loop {
            match self.try_execute::<D>(stream_id, &command).await {
                Ok(outcome) => return Ok(outcome),
                Err(StepError::Failed(err)) => return Err(err),
                Err(StepError::Stale(reason)) => {
                    if !self.settings.conflict_retry.should_retry(retries) {
                        return Err(WorkflowError::Conflict(reason));
                    }
                    retries += 1;
                    self.back_off(retries, &reason).await;
                }
            }
        }
    }

    /// Plan movements against fresh stock for `parts` and commit them without
    /// a document. `plan` is re-run on every retry.
    #[instrument(skip(self, parts, plan), fields(part_count = parts.len()))]
    pub async fn post<F>(&self, parts: &[PartNumber], plan: F) -> Result<PostingOutcome, WorkflowError>
    where
        F: Fn(&[StockRecord]) -> DomainResult<Vec<Movement>> + Send + Sync,
    {
        let mut retries = 0;
        loop {
            match self.try_post(parts, &plan).await {
                Ok(outcome) => return Ok(outcome),
                Err(StepError::Failed(err)) => return Err(err),
                Err(StepError::Stale(reason)) => {
                    if !self.settings.conflict_retry.should_retry(retries) {
                        return Err(WorkflowError::Conflict(reason));
                    }
                    retries += 1;
                    self.back_off(retries, &reason).await;
                }
            }
        }
    }

    async fn back_off(&self, retries: u32, reason: &str) {
        let delay = self.settings.conflict_retry.delay_for_attempt(retries);
        debug!(retries, ?delay, reason, "write conflict, deciding again");
        tokio::time::sleep(delay).await;
    }

    async fn rehydrate<D: LedgerDocument>(&self, stream_id: Uuid) -> Result<(D, u64), WorkflowError> {
        let history = self.call(self.store.load_stream(D::STREAM_TYPE, stream_id)).await?;
        validate_loaded_stream(D::STREAM_TYPE, stream_id, &history)?;

        let events = history
            .iter()
            .map(|stored| {
                serde_json::from_value::<D::Event>(stored.payload.clone()).map_err(|e| {
                    WorkflowError::Store(format!(
                        "cannot decode {} #{}: {e}",
                        stored.event_type, stored.sequence_number
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut document = D::for_stream(stream_id);
        document.replay(&events);
        Ok((document, stream_version(&history)))
    }

    async fn try_execute<D: LedgerDocument>(
        &self,
        stream_id: Uuid,
        command: &D::Command,
    ) -> Result<WorkflowOutcome<D>, StepError> {
        let (mut document, version) = self.rehydrate::<D>(stream_id).await?;

        let decided = document.handle(command)?;
        if decided.is_empty() {
            return Ok(WorkflowOutcome::unchanged(document));
        }

        let movements = apply_with_effects(&mut document, &decided);
        let now = Utc::now();
        let records = self.stock_records(&touched_parts(&movements)).await?;
        let postings = self.plan_postings(&records, &movements, now)?;

        let events = decided
            .iter()
            .map(|event| UncommittedEvent::from_typed(D::STREAM_TYPE, stream_id, Uuid::now_v7(), event))
            .collect::<Result<Vec<_>, _>>()?;

        let (commit, transactions, warnings) = into_commit(postings)?;
        let commit = LedgerCommit {
            document: Some(DocumentAppend {
                stream_type: D::STREAM_TYPE.to_string(),
                stream_id,
                expected_version: version,
                events,
                head: document.head(now),
            }),
            ..commit
        };

        let receipt = self.call(self.store.commit(commit)).await?;
        let transactions = logged(transactions, &receipt);
        report(&transactions, &warnings);

        Ok(WorkflowOutcome {
            document,
            events: receipt.events,
            transactions,
            warnings,
        })
    }

    async fn try_post<F>(&self, parts: &[PartNumber], plan: &F) -> Result<PostingOutcome, StepError>
    where
        F: Fn(&[StockRecord]) -> DomainResult<Vec<Movement>> + Send + Sync,
    {
        let records = self.stock_records(parts).await?;
        let movements = plan(&records)?;
        if movements.is_empty() {
            return Ok(PostingOutcome::default());
        }

        let mut records = records;
        let missing: Vec<PartNumber> = touched_parts(&movements)
            .into_iter()
            .filter(|p| !parts.contains(p))
            .collect();
        records.extend(self.stock_records(&missing).await?);

        let postings = self.plan_postings(&records, &movements, Utc::now())?;
        let (commit, transactions, warnings) = into_commit(postings)?;
        if commit.is_empty() {
            return Ok(PostingOutcome::default());
        }

        let receipt = self.call(self.store.commit(commit)).await?;
        let transactions = logged(transactions, &receipt);
        report(&transactions, &warnings);
        Ok(PostingOutcome {
            transactions,
            warnings,
        })
    }

    fn plan_postings(
        &self,
        records: &[StockRecord],
        movements: &[Movement],
        now: DateTime<Utc>,
    ) -> Result<LedgerPostings, WorkflowError> {
        let mut plan = PostingPlan::new(now, self.settings.posting);
        for part in touched_parts(movements) {
            let record = records.iter().find(|r| r.part_number == part).cloned();
            plan.seed(part, record);
        }
        plan.post_all(movements)?;
        Ok(plan.finish())
    }
}

fn touched_parts(movements: &[Movement]) -> Vec<PartNumber> {
    movements
        .iter()
        .map(|m| m.part_number.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

type Planned = (LedgerCommit, Vec<Transaction>, Vec<StockWarning>);

fn into_commit(postings: LedgerPostings) -> Result<Planned, StoreError> {
    let outbox = postings
        .transactions
        .iter()
        .map(movement_message)
        .collect::<Result<Vec<_>, _>>()?;
    let commit = LedgerCommit {
        document: None,
        stock_writes: postings.stock_writes,
        transactions: postings.transactions.clone(),
        outbox,
    };
    Ok((commit, postings.transactions, postings.warnings))
}

/// Keep only the rows the store actually inserted.
fn logged(transactions: Vec<Transaction>, receipt: &CommitReceipt) -> Vec<Transaction> {
    transactions
        .into_iter()
        .filter(|t| receipt.appended.contains(&t.id))
        .collect()
}

fn report(transactions: &[Transaction], warnings: &[StockWarning]) {
    for warning in warnings {
        match warning {
            StockWarning::NegativeStock {
                part_number,
                before,
                after,
                reference,
            } => warn!(
                part_number = %part_number,
                before,
                after,
                reference = %reference,
                "stock went negative"
            ),
        }
    }
    for tx in transactions {
        info!(
            transaction_id = %tx.id,
            part_number = %tx.part_number,
            kind = %tx.kind,
            quantity = tx.quantity,
            balance_after = ?tx.balance_after,
            date = %tx.date,
            reference = %tx.reference,
            "movement posted"
        );
    }
}
