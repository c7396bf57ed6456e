use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use stockledger_core::{PartNumber, TransactionId};
use stockledger_inventory::{StockRecord, Transaction, TransactionQuery};

use super::stream::{DocumentHead, OutboxMessage, StoredEvent};
use super::r#trait::{CommitReceipt, LedgerCommit, LedgerSnapshot, LedgerStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    stream_type: String,
    stream_id: Uuid,
}

/// Where an injected commit failure strikes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FailPoint {
    /// Nothing is written; the call fails with `Backend`.
    BeforeApply,
    /// Everything is written, then the call fails with `CommitOutcomeUnknown`.
    AfterApply,
}

#[derive(Debug, Default)]
struct State {
    streams: HashMap<StreamKey, Vec<StoredEvent>>,
    heads: HashMap<StreamKey, DocumentHead>,
    stock: BTreeMap<PartNumber, StockRecord>,
    log: Vec<Transaction>,
    log_ids: HashSet<TransactionId>,
    outbox: Vec<(OutboxMessage, bool)>,
    outbox_event_ids: HashSet<Uuid>,
}

/// In-memory ledger store.
///
/// Intended for tests/dev. A commit runs under one write lock, so it is as
/// atomic as the Postgres transaction it stands in for.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<State>,
    fail_next: Mutex<Option<FailPoint>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit` fail at the given point.
    pub fn fail_next_commit(&self, point: FailPoint) {
        if let Ok(mut slot) = self.fail_next.lock() {
            *slot = Some(point);
        }
    }

    /// Overwrite a stock row without logging anything. Simulates an
    /// out-of-band write for reconciliation drills.
    pub fn force_stock(&self, record: StockRecord) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.stock.insert(record.part_number.clone(), record);
        Ok(())
    }

    /// All outbox messages with their delivered flag, oldest first.
    pub fn outbox_snapshot(&self) -> Result<Vec<(OutboxMessage, bool)>, StoreError> {
        Ok(self.read()?.outbox.clone())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn take_fail_point(&self) -> Option<FailPoint> {
        self.fail_next.lock().ok().and_then(|mut slot| slot.take())
    }
}

fn check(state: &State, commit: &LedgerCommit) -> Result<(), StoreError> {
    if let Some(doc) = &commit.document {
        let key = StreamKey {
            stream_type: doc.stream_type.clone(),
            stream_id: doc.stream_id,
        };
        let current = state
            .streams
            .get(&key)
            .and_then(|s| s.last())
            .map(|e| e.sequence_number)
            .unwrap_or(0);
        if current != doc.expected_version {
            return Err(StoreError::Conflict(format!(
                "{} {} is at version {current}, expected {}",
                doc.stream_type, doc.stream_id, doc.expected_version
            )));
        }
    }

    for write in &commit.stock_writes {
        let current = state
            .stock
            .get(&write.record.part_number)
            .map(|r| r.version)
            .unwrap_or(0);
        if current != write.expected_version {
            return Err(StoreError::Conflict(format!(
                "stock for {} is at version {current}, expected {}",
                write.record.part_number, write.expected_version
            )));
        }
    }

    let mut incoming = HashSet::new();
    for tx in &commit.transactions {
        let duplicate = state.log_ids.contains(&tx.id) || !incoming.insert(tx.id);
        if duplicate && commit.writes_stock_for(&tx.part_number) {
            return Err(StoreError::Conflict(format!(
                "transaction {} is already logged; stock write for {} refused",
                tx.id, tx.part_number
            )));
        }
    }

    Ok(())
}

fn apply(state: &mut State, commit: LedgerCommit) -> CommitReceipt {
    let mut receipt = CommitReceipt::default();

    if let Some(doc) = commit.document {
        let key = StreamKey {
            stream_type: doc.stream_type,
            stream_id: doc.stream_id,
        };
        let stream = state.streams.entry(key.clone()).or_default();
        let mut next = doc.expected_version + 1;
        for event in doc.events {
            let stored = StoredEvent::from_uncommitted(event, next);
            next += 1;
            stream.push(stored.clone());
            receipt.events.push(stored);
        }
        let mut head = doc.head;
        head.version = next - 1;
        state.heads.insert(key, head);
    }

    for write in commit.stock_writes {
        state
            .stock
            .insert(write.record.part_number.clone(), write.record);
    }

    for tx in commit.transactions {
        if state.log_ids.insert(tx.id) {
            receipt.appended.push(tx.id);
            state.log.push(tx);
        } else {
            receipt.skipped.push(tx.id);
        }
    }

    for message in commit.outbox {
        if !state.outbox_event_ids.insert(message.event_id) {
            continue;
        }
        let id = state.outbox.len() as u64 + 1;
        state.outbox.push((
            OutboxMessage {
                id,
                event_id: message.event_id,
                event_type: message.event_type,
                stream_type: message.stream_type,
                stream_id: message.stream_id,
                occurred_at: message.occurred_at,
                payload: message.payload,
                attempts: 0,
                last_error: None,
                next_attempt_at: message.occurred_at,
            },
            false,
        ));
    }

    receipt
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn load_stream(
        &self,
        stream_type: &str,
        stream_id: Uuid,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let state = self.read()?;
        let key = StreamKey {
            stream_type: stream_type.to_string(),
            stream_id,
        };
        Ok(state.streams.get(&key).cloned().unwrap_or_default())
    }

    async fn document_heads(&self, stream_type: &str) -> Result<Vec<DocumentHead>, StoreError> {
        let state = self.read()?;
        let mut heads: Vec<DocumentHead> = state
            .heads
            .values()
            .filter(|h| h.stream_type == stream_type)
            .cloned()
            .collect();
        heads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(heads)
    }

    async fn stock_records(&self, parts: &[PartNumber]) -> Result<Vec<StockRecord>, StoreError> {
        let state = self.read()?;
        Ok(parts
            .iter()
            .filter_map(|p| state.stock.get(p).cloned())
            .collect())
    }

    async fn all_stock(&self) -> Result<Vec<StockRecord>, StoreError> {
        Ok(self.read()?.stock.values().cloned().collect())
    }

    async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, StoreError> {
        let state = self.read()?;
        Ok(state
            .log
            .iter()
            .filter(|tx| query.matches(tx))
            .cloned()
            .collect())
    }

    async fn snapshot(&self) -> Result<LedgerSnapshot, StoreError> {
        let state = self.read()?;
        Ok(LedgerSnapshot {
            stock: state.stock.values().cloned().collect(),
            transactions: state.log.clone(),
        })
    }

    async fn commit(&self, commit: LedgerCommit) -> Result<CommitReceipt, StoreError> {
        let fail_point = self.take_fail_point();
        if fail_point == Some(FailPoint::BeforeApply) {
            return Err(StoreError::Backend("injected failure before apply".to_string()));
        }

        let receipt = {
            let mut state = self.write()?;
            check(&state, &commit)?;
            apply(&mut state, commit)
        };

        if fail_point == Some(FailPoint::AfterApply) {
            return Err(StoreError::CommitOutcomeUnknown(
                "injected failure after apply".to_string(),
            ));
        }
        Ok(receipt)
    }

    async fn pending_outbox(
        &self,
        limit: usize,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        let state = self.read()?;
        Ok(state
            .outbox
            .iter()
            .filter(|(m, delivered)| {
                !*delivered && m.attempts < max_attempts && m.next_attempt_at <= now
            })
            .take(limit)
            .map(|(m, _)| m.clone())
            .collect())
    }

    async fn mark_outbox_delivered(&self, ids: &[u64]) -> Result<(), StoreError> {
        let mut state = self.write()?;
        for (message, delivered) in state.outbox.iter_mut() {
            if ids.contains(&message.id) {
                *delivered = true;
            }
        }
        Ok(())
    }

    async fn record_outbox_failure(
        &self,
        id: u64,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let (message, _) = state
            .outbox
            .iter_mut()
            .find(|(m, _)| m.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("outbox message {id}")))?;
        message.attempts += 1;
        message.last_error = Some(error.to_string());
        message.next_attempt_at = next_attempt_at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use stockledger_inventory::{StockWrite, TransactionType};

    use crate::store::stream::{DocumentAppend, NewOutboxMessage, UncommittedEvent};

    fn part(s: &str) -> PartNumber {
        PartNumber::parse(s).unwrap()
    }

    fn write(p: &str, stock: i64, expected_version: u64) -> StockWrite {
        let mut record = StockRecord::empty(part(p), Utc::now());
        record.set_stock(stock, 10, Utc::now());
        record.version = expected_version + 1;
        StockWrite {
            record,
            expected_version,
        }
    }

    fn tx(key: &str, p: &str, quantity: i64) -> Transaction {
        Transaction {
            id: TransactionId::derive(key),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            part_number: part(p),
            kind: TransactionType::Inbound,
            quantity,
            reference: "R".into(),
            notes: None,
            created_at: Utc::now(),
            balance_after: Some(quantity),
        }
    }

    fn doc(stream_id: Uuid, expected_version: u64, events: usize) -> DocumentAppend {
        DocumentAppend {
            stream_type: "test.doc".into(),
            stream_id,
            expected_version,
            events: (0..events)
                .map(|_| UncommittedEvent {
                    event_id: Uuid::now_v7(),
                    stream_type: "test.doc".into(),
                    stream_id,
                    event_type: "test.doc.touched".into(),
                    event_version: 1,
                    occurred_at: Utc::now(),
                    payload: serde_json::json!({}),
                })
                .collect(),
            head: DocumentHead {
                stream_type: "test.doc".into(),
                stream_id,
                version: 0,
                status: "PENDING".into(),
                label: "doc".into(),
                business_date: None,
                updated_at: Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn commit_assigns_sequence_numbers_and_head_version() {
        let store = InMemoryLedgerStore::new();
        let id = Uuid::now_v7();

        let receipt = store
            .commit(LedgerCommit {
                document: Some(doc(id, 0, 2)),
                ..LedgerCommit::default()
            })
            .await
            .unwrap();

        let seqs: Vec<u64> = receipt.events.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2]);
        let heads = store.document_heads("test.doc").await.unwrap();
        assert_eq!(heads[0].version, 2);
    }

    #[tokio::test]
    async fn stale_stock_version_aborts_everything() {
        let store = InMemoryLedgerStore::new();
        store
            .commit(LedgerCommit {
                stock_writes: vec![write("A1", 5, 0)],
                transactions: vec![tx("a", "A1", 5)],
                ..LedgerCommit::default()
            })
            .await
            .unwrap();

        let err = store
            .commit(LedgerCommit {
                stock_writes: vec![write("A1", 9, 0)],
                transactions: vec![tx("b", "A1", 4)],
                ..LedgerCommit::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.transactions(&TransactionQuery::default()).await.unwrap().len(), 1);
        let stock = store.stock_records(&[part("A1")]).await.unwrap();
        assert_eq!(stock[0].current_stock, 5);
    }

    #[tokio::test]
    async fn duplicate_transaction_ids_are_skipped() {
        let store = InMemoryLedgerStore::new();
        let commit = LedgerCommit {
            transactions: vec![tx("same", "A1", 5)],
            ..LedgerCommit::default()
        };
        store.commit(commit.clone()).await.unwrap();
        let receipt = store.commit(commit).await.unwrap();

        assert!(receipt.appended.is_empty());
        assert_eq!(receipt.skipped.len(), 1);
        assert_eq!(store.transactions(&TransactionQuery::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn logged_id_cannot_carry_a_stock_write() {
        let store = InMemoryLedgerStore::new();
        store
            .commit(LedgerCommit {
                stock_writes: vec![write("A1", 5, 0)],
                transactions: vec![tx("same", "A1", 5)],
                ..LedgerCommit::default()
            })
            .await
            .unwrap();

        let err = store
            .commit(LedgerCommit {
                stock_writes: vec![write("A1", 10, 1)],
                transactions: vec![tx("same", "A1", 5)],
                ..LedgerCommit::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        let stock = store.stock_records(&[part("A1")]).await.unwrap();
        assert_eq!(stock[0].current_stock, 5);
        assert_eq!(stock[0].version, 1);
    }

    #[tokio::test]
    async fn fail_points() {
        let store = InMemoryLedgerStore::new();

        store.fail_next_commit(FailPoint::BeforeApply);
        let err = store
            .commit(LedgerCommit {
                stock_writes: vec![write("A1", 5, 0)],
                ..LedgerCommit::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(store.all_stock().await.unwrap().is_empty());

        store.fail_next_commit(FailPoint::AfterApply);
        let err = store
            .commit(LedgerCommit {
                stock_writes: vec![write("A1", 5, 0)],
                ..LedgerCommit::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CommitOutcomeUnknown(_)));
        assert_eq!(store.all_stock().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn outbox_attempts_and_delivery() {
        let store = InMemoryLedgerStore::new();
        let event_id = Uuid::now_v7();
        let message = NewOutboxMessage {
            event_id,
            event_type: "stock.movement.posted".into(),
            stream_type: "ledger.transaction".into(),
            stream_id: event_id,
            occurred_at: Utc::now(),
            payload: serde_json::json!({}),
        };
        let commit = LedgerCommit {
            outbox: vec![message.clone(), message],
            ..LedgerCommit::default()
        };
        store.commit(commit).await.unwrap();

        let now = Utc::now();
        let pending = store.pending_outbox(10, 2, now).await.unwrap();
        assert_eq!(pending.len(), 1);

        store.record_outbox_failure(pending[0].id, "down", now).await.unwrap();
        store.record_outbox_failure(pending[0].id, "down", now).await.unwrap();
        assert!(store.pending_outbox(10, 2, now).await.unwrap().is_empty());
        assert_eq!(store.pending_outbox(10, 3, now).await.unwrap()[0].attempts, 2);

        store.mark_outbox_delivered(&[pending[0].id]).await.unwrap();
        assert!(store.pending_outbox(10, 3, now).await.unwrap().is_empty());
    }
}
