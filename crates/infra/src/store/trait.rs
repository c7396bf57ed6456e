use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use stockledger_core::{PartNumber, TransactionId};
use stockledger_inventory::{StockRecord, StockWrite, Transaction, TransactionQuery};

use super::stream::{DocumentAppend, DocumentHead, NewOutboxMessage, OutboxMessage, StoredEvent};

/// Ledger store operation error.
///
/// Infrastructure failures only; domain rejections never reach the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A version check failed: something else wrote the record first.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store backend failure: {0}")]
    Backend(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// The commit may or may not have been applied (acknowledgement lost).
    #[error("commit outcome unknown: {0}")]
    CommitOutcomeUnknown(String),
}

/// Everything one workflow step writes. Applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerCommit {
    pub document: Option<DocumentAppend>,
    pub stock_writes: Vec<StockWrite>,
    pub transactions: Vec<Transaction>,
    pub outbox: Vec<NewOutboxMessage>,
}

impl LedgerCommit {
    pub fn is_empty(&self) -> bool {
        self.document.is_none()
            && self.stock_writes.is_empty()
            && self.transactions.is_empty()
            && self.outbox.is_empty()
    }

    /// Whether this commit also writes stock for `part_number`.
    pub fn writes_stock_for(&self, part_number: &PartNumber) -> bool {
        self.stock_writes
            .iter()
            .any(|w| &w.record.part_number == part_number)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    pub events: Vec<StoredEvent>,
    /// Log rows actually inserted.
    pub appended: Vec<TransactionId>,
    /// Log rows skipped because their id was already present.
    pub skipped: Vec<TransactionId>,
}

/// Every stock record and the whole log, read at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub stock: Vec<StockRecord>,
    /// In append order.
    pub transactions: Vec<Transaction>,
}

/// Durable home of document streams, stock records, the transaction log and
/// the outbox.
///
/// `commit` is the only write path for ledger data and must be atomic:
///
/// - the document append is checked against `expected_version`;
/// - every stock write is checked against its `expected_version`
///   (0 means the row must not exist yet);
/// - log rows whose id already exists are skipped, unless the commit also
///   writes stock for that row's part: a stock write never lands without
///   its log row, so that case is a conflict;
/// - outbox rows whose `event_id` already exists are skipped.
///
/// Any failed check aborts the whole commit with [`StoreError::Conflict`].
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn load_stream(
        &self,
        stream_type: &str,
        stream_id: Uuid,
    ) -> Result<Vec<StoredEvent>, StoreError>;

    async fn document_heads(&self, stream_type: &str) -> Result<Vec<DocumentHead>, StoreError>;

    /// Records for the given parts. Parts without a row are simply missing.
    async fn stock_records(&self, parts: &[PartNumber]) -> Result<Vec<StockRecord>, StoreError>;

    async fn all_stock(&self) -> Result<Vec<StockRecord>, StoreError>;

    /// Matching log rows in append order.
    async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, StoreError>;

    /// Stock and log as of one instant; no commit lands between the two reads.
    async fn snapshot(&self) -> Result<LedgerSnapshot, StoreError>;

    async fn commit(&self, commit: LedgerCommit) -> Result<CommitReceipt, StoreError>;

    /// Undelivered messages due at `now` with fewer than `max_attempts` failures,
    /// oldest first.
    async fn pending_outbox(
        &self,
        limit: usize,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxMessage>, StoreError>;

    async fn mark_outbox_delivered(&self, ids: &[u64]) -> Result<(), StoreError>;

    async fn record_outbox_failure(
        &self,
        id: u64,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn load_stream(
        &self,
        stream_type: &str,
        stream_id: Uuid,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        (**self).load_stream(stream_type, stream_id).await
    }

    async fn document_heads(&self, stream_type: &str) -> Result<Vec<DocumentHead>, StoreError> {
        (**self).document_heads(stream_type).await
    }

    async fn stock_records(&self, parts: &[PartNumber]) -> Result<Vec<StockRecord>, StoreError> {
        (**self).stock_records(parts).await
    }

    async fn all_stock(&self) -> Result<Vec<StockRecord>, StoreError> {
        (**self).all_stock().await
    }

    async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, StoreError> {
        (**self).transactions(query).await
    }

    async fn snapshot(&self) -> Result<LedgerSnapshot, StoreError> {
        (**self).snapshot().await
    }

    async fn commit(&self, commit: LedgerCommit) -> Result<CommitReceipt, StoreError> {
        (**self).commit(commit).await
    }

    async fn pending_outbox(
        &self,
        limit: usize,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        (**self).pending_outbox(limit, max_attempts, now).await
    }

    async fn mark_outbox_delivered(&self, ids: &[u64]) -> Result<(), StoreError> {
        (**self).mark_outbox_delivered(ids).await
    }

    async fn record_outbox_failure(
        &self,
        id: u64,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self)
            .record_outbox_failure(id, error, next_attempt_at)
            .await
    }
}
