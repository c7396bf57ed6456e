//! Postgres-backed ledger store.
//!
//! One `LedgerStore::commit` is one database transaction. Concurrency is
//! optimistic: document heads and touched stock rows are read `FOR UPDATE`,
//! compared with the expected versions, and written with a version predicate.
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | StoreError |
//! |------------|-----------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Conflict` |
//! | Database (other) | any other | `Backend` |
//! | Any non-database error during `COMMIT` | n/a | `CommitOutcomeUnknown` |
//! | Anything else | n/a | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction as PgTransaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use stockledger_core::{PartNumber, TransactionId};
use stockledger_inventory::{StockRecord, StockWrite, Transaction, TransactionQuery};

use super::stream::{DocumentAppend, DocumentHead, NewOutboxMessage, OutboxMessage, StoredEvent};
use super::r#trait::{CommitReceipt, LedgerCommit, LedgerSnapshot, LedgerStore, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_ledger.sql");

const ALL_STOCK: &str = r#"
    SELECT part_number, current_stock, status, last_updated, version
    FROM stock_records
    ORDER BY part_number
"#;

#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the ledger tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip(self), fields(event_count = tracing::field::Empty), err)]
    async fn load_stream(
        &self,
        stream_type: &str,
        stream_id: Uuid,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                event_id,
                stream_type,
                stream_id,
                sequence_number,
                event_type,
                event_version,
                occurred_at,
                payload
            FROM document_events
            WHERE stream_type = $1 AND stream_id = $2
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(stream_type)
        .bind(stream_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let stored = StoredEventRow::from_row(&row).map_err(|e| decode_error("event", e))?;
            events.push(stored.into());
        }

        Span::current().record("event_count", events.len());
        Ok(events)
    }

    #[instrument(skip(self), err)]
    async fn document_heads(&self, stream_type: &str) -> Result<Vec<DocumentHead>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT stream_type, stream_id, version, status, label, business_date, updated_at
            FROM document_heads
            WHERE stream_type = $1
            ORDER BY updated_at DESC
            "#,
        )
        .bind(stream_type)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("document_heads", e))?;

        rows.iter()
            .map(|row| {
                DocumentHeadRow::from_row(row)
                    .map(DocumentHead::from)
                    .map_err(|e| decode_error("document head", e))
            })
            .collect()
    }

    #[instrument(skip(self, parts), fields(part_count = parts.len()), err)]
    async fn stock_records(&self, parts: &[PartNumber]) -> Result<Vec<StockRecord>, StoreError> {
        let keys: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
        let rows = sqlx::query(
            r#"
            SELECT part_number, current_stock, status, last_updated, version
            FROM stock_records
            WHERE part_number = ANY($1)
            ORDER BY part_number
            "#,
        )
        .bind(&keys)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stock_records", e))?;

        rows.iter().map(stock_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn all_stock(&self) -> Result<Vec<StockRecord>, StoreError> {
        let rows = sqlx::query(ALL_STOCK)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("all_stock", e))?;

        rows.iter().map(stock_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                business_date,
                part_number,
                type,
                quantity,
                reference,
                notes,
                created_at,
                balance_after
            FROM stock_transactions
            WHERE ($1::text IS NULL OR part_number = $1)
              AND ($2::date IS NULL OR business_date >= $2)
              AND ($3::date IS NULL OR business_date <= $3)
              AND ($4::text IS NULL OR reference = $4)
              AND ($5::text IS NULL OR type = $5)
            ORDER BY seq ASC
            "#,
        )
        .bind(query.part.as_ref().map(|p| p.as_str()))
        .bind(query.from)
        .bind(query.to)
        .bind(query.reference.as_deref())
        .bind(query.kind.map(|k| k.as_str()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("transactions", e))?;

        rows.iter()
            .map(|row| {
                TransactionRow::from_row(row)
                    .map_err(|e| decode_error("transaction", e))?
                    .try_into()
            })
            .collect()
    }

    /// Both reads run in one REPEATABLE READ transaction, so they share a
    /// snapshot.
    #[instrument(skip(self), err)]
    async fn snapshot(&self) -> Result<LedgerSnapshot, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("snapshot_isolation", e))?;

        let stock_rows = sqlx::query(ALL_STOCK)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("snapshot_stock", e))?;
        let log_rows = sqlx::query(
            r#"
            SELECT
                id,
                business_date,
                part_number,
                type,
                quantity,
                reference,
                notes,
                created_at,
                balance_after
            FROM stock_transactions
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("snapshot_transactions", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("snapshot_commit", e))?;

        Ok(LedgerSnapshot {
            stock: stock_rows
                .iter()
                .map(stock_from_row)
                .collect::<Result<Vec<_>, StoreError>>()?,
            transactions: log_rows
                .iter()
                .map(|row| {
                    TransactionRow::from_row(row)
                        .map_err(|e| decode_error("transaction", e))?
                        .try_into()
                })
                .collect::<Result<Vec<Transaction>, StoreError>>()?,
        })
    }

    #[instrument(
        skip(self, commit),
        fields(
            stock_writes = commit.stock_writes.len(),
            transactions = commit.transactions.len(),
            has_document = commit.document.is_some(),
            appended = tracing::field::Empty
        ),
        err
    )]
    async fn commit(&self, commit: LedgerCommit) -> Result<CommitReceipt, StoreError> {
        let mut receipt = CommitReceipt::default();

        // Dropping `tx` on an early return rolls everything back.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        if let Some(document) = commit.document {
            receipt.events = append_document(&mut tx, document).await?;
        }

        // Lock rows in a stable order so concurrent commits cannot deadlock.
        let mut writes = commit.stock_writes;
        writes.sort_by(|a, b| a.record.part_number.cmp(&b.record.part_number));
        for write in &writes {
            write_stock(&mut tx, write).await?;
        }

        for transaction in &commit.transactions {
            if insert_transaction(&mut tx, transaction).await? {
                receipt.appended.push(transaction.id);
            } else if writes.iter().any(|w| w.record.part_number == transaction.part_number) {
                return Err(StoreError::Conflict(format!(
                    "transaction {} is already logged; stock write for {} refused",
                    transaction.id, transaction.part_number
                )));
            } else {
                receipt.skipped.push(transaction.id);
            }
        }

        for message in &commit.outbox {
            insert_outbox(&mut tx, message).await?;
        }

        tx.commit().await.map_err(map_commit_error)?;

        Span::current().record("appended", receipt.appended.len());
        Ok(receipt)
    }

    #[instrument(skip(self), err)]
    async fn pending_outbox(
        &self,
        limit: usize,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id,
                event_id,
                event_type,
                stream_type,
                stream_id,
                occurred_at,
                payload,
                attempts,
                last_error,
                next_attempt_at
            FROM outbox
            WHERE delivered_at IS NULL
              AND attempts < $1
              AND next_attempt_at <= $2
            ORDER BY id ASC
            LIMIT $3
            "#,
        )
        .bind(max_attempts as i32)
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("pending_outbox", e))?;

        rows.iter()
            .map(|row| {
                OutboxRow::from_row(row)
                    .map(OutboxMessage::from)
                    .map_err(|e| decode_error("outbox message", e))
            })
            .collect()
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn mark_outbox_delivered(&self, ids: &[u64]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = ids.iter().map(|id| *id as i64).collect();
        sqlx::query("UPDATE outbox SET delivered_at = NOW() WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("mark_outbox_delivered", e))?;
        Ok(())
    }

    #[instrument(skip(self, error), err)]
    async fn record_outbox_failure(
        &self,
        id: u64,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET attempts = attempts + 1, last_error = $2, next_attempt_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id as i64)
        .bind(error)
        .bind(next_attempt_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_outbox_failure", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("outbox message {id}")));
        }
        Ok(())
    }
}

async fn append_document(
    tx: &mut PgTransaction<'_, Postgres>,
    document: DocumentAppend,
) -> Result<Vec<StoredEvent>, StoreError> {
    let current: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT version FROM document_heads
        WHERE stream_type = $1 AND stream_id = $2
        FOR UPDATE
        "#,
    )
    .bind(&document.stream_type)
    .bind(document.stream_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_document_version", e))?;

    let current = current.unwrap_or(0) as u64;
    if current != document.expected_version {
        return Err(StoreError::Conflict(format!(
            "{} {} is at version {current}, expected {}",
            document.stream_type, document.stream_id, document.expected_version
        )));
    }

    let mut stored = Vec::with_capacity(document.events.len());
    let mut next_sequence = current + 1;
    for event in document.events {
        sqlx::query(
            r#"
            INSERT INTO document_events (
                event_id,
                stream_type,
                stream_id,
                sequence_number,
                event_type,
                event_version,
                occurred_at,
                payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.event_id)
        .bind(&event.stream_type)
        .bind(event.stream_id)
        .bind(next_sequence as i64)
        .bind(&event.event_type)
        .bind(event.event_version as i32)
        .bind(event.occurred_at)
        .bind(&event.payload)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            // Another writer created the stream between our read and insert.
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "concurrent append detected: sequence_number {next_sequence} already exists"
                ))
            } else {
                map_sqlx_error("insert_event", e)
            }
        })?;

        stored.push(StoredEvent::from_uncommitted(event, next_sequence));
        next_sequence += 1;
    }

    let head = document.head;
    sqlx::query(
        r#"
        INSERT INTO document_heads (
            stream_type, stream_id, version, status, label, business_date, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (stream_type, stream_id) DO UPDATE SET
            version = EXCLUDED.version,
            status = EXCLUDED.status,
            label = EXCLUDED.label,
            business_date = EXCLUDED.business_date,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&document.stream_type)
    .bind(document.stream_id)
    .bind((next_sequence - 1) as i64)
    .bind(&head.status)
    .bind(&head.label)
    .bind(head.business_date)
    .bind(head.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("upsert_document_head", e))?;

    Ok(stored)
}

async fn write_stock(
    tx: &mut PgTransaction<'_, Postgres>,
    write: &StockWrite,
) -> Result<(), StoreError> {
    let record = &write.record;
    let current: Option<i64> =
        sqlx::query_scalar("SELECT version FROM stock_records WHERE part_number = $1 FOR UPDATE")
            .bind(record.part_number.as_str())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("lock_stock", e))?;

    let current = current.unwrap_or(0) as u64;
    if current != write.expected_version {
        return Err(StoreError::Conflict(format!(
            "stock for {} is at version {current}, expected {}",
            record.part_number, write.expected_version
        )));
    }

    let result = if write.expected_version == 0 {
        sqlx::query(
            r#"
            INSERT INTO stock_records (part_number, current_stock, status, last_updated, version)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.part_number.as_str())
        .bind(record.current_stock)
        .bind(record.status.as_str())
        .bind(record.last_updated)
        .bind(record.version as i64)
        .execute(&mut **tx)
        .await
    } else {
        sqlx::query(
            r#"
            UPDATE stock_records
            SET current_stock = $2, status = $3, last_updated = $4, version = $5
            WHERE part_number = $1 AND version = $6
            "#,
        )
        .bind(record.part_number.as_str())
        .bind(record.current_stock)
        .bind(record.status.as_str())
        .bind(record.last_updated)
        .bind(record.version as i64)
        .bind(write.expected_version as i64)
        .execute(&mut **tx)
        .await
    }
    .map_err(|e| map_sqlx_error("write_stock", e))?;

    if result.rows_affected() != 1 {
        return Err(StoreError::Conflict(format!(
            "stock for {} changed during commit",
            record.part_number
        )));
    }
    Ok(())
}

/// Returns `false` when a row with the same id is already logged.
async fn insert_transaction(
    tx: &mut PgTransaction<'_, Postgres>,
    transaction: &Transaction,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO stock_transactions (
            id,
            business_date,
            part_number,
            type,
            quantity,
            reference,
            notes,
            created_at,
            balance_after
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(transaction.id.as_uuid())
    .bind(transaction.date)
    .bind(transaction.part_number.as_str())
    .bind(transaction.kind.as_str())
    .bind(transaction.quantity)
    .bind(&transaction.reference)
    .bind(transaction.notes.as_deref())
    .bind(transaction.created_at)
    .bind(transaction.balance_after)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_transaction", e))?;

    Ok(result.rows_affected() == 1)
}

async fn insert_outbox(
    tx: &mut PgTransaction<'_, Postgres>,
    message: &NewOutboxMessage,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO outbox (
            event_id, event_type, stream_type, stream_id, occurred_at, payload, next_attempt_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $5)
        ON CONFLICT (event_id) DO NOTHING
        "#,
    )
    .bind(message.event_id)
    .bind(&message.event_type)
    .bind(&message.stream_type)
    .bind(message.stream_id)
    .bind(message.occurred_at)
    .bind(&message.payload)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_outbox", e))?;
    Ok(())
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Backend(format!("no connection available in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

/// The server answered the COMMIT: it was rejected and rolled back. Any other
/// failure leaves the outcome unknown.
fn map_commit_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(_) => map_sqlx_error("commit_transaction", err),
        other => StoreError::CommitOutcomeUnknown(format!("commit acknowledgement lost: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

fn decode_error(what: &str, err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode {what} row: {err}"))
}

fn stock_from_row(row: &PgRow) -> Result<StockRecord, StoreError> {
    StockRow::from_row(row)
        .map_err(|e| decode_error("stock", e))?
        .try_into()
}

// SQLx row types

#[derive(Debug)]
struct StoredEventRow {
    event_id: Uuid,
    stream_type: String,
    stream_id: Uuid,
    sequence_number: i64,
    event_type: String,
    event_version: i32,
    occurred_at: DateTime<Utc>,
    payload: serde_json::Value,
}

impl<'r> FromRow<'r, PgRow> for StoredEventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredEventRow {
            event_id: row.try_get("event_id")?,
            stream_type: row.try_get("stream_type")?,
            stream_id: row.try_get("stream_id")?,
            sequence_number: row.try_get("sequence_number")?,
            event_type: row.try_get("event_type")?,
            event_version: row.try_get("event_version")?,
            occurred_at: row.try_get("occurred_at")?,
            payload: row.try_get("payload")?,
        })
    }
}

impl From<StoredEventRow> for StoredEvent {
    fn from(row: StoredEventRow) -> Self {
        StoredEvent {
            event_id: row.event_id,
            stream_type: row.stream_type,
            stream_id: row.stream_id,
            sequence_number: row.sequence_number as u64,
            event_type: row.event_type,
            event_version: row.event_version as u32,
            occurred_at: row.occurred_at,
            payload: row.payload,
        }
    }
}

#[derive(Debug)]
struct DocumentHeadRow {
    stream_type: String,
    stream_id: Uuid,
    version: i64,
    status: String,
    label: String,
    business_date: Option<NaiveDate>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for DocumentHeadRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(DocumentHeadRow {
            stream_type: row.try_get("stream_type")?,
            stream_id: row.try_get("stream_id")?,
            version: row.try_get("version")?,
            status: row.try_get("status")?,
            label: row.try_get("label")?,
            business_date: row.try_get("business_date")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<DocumentHeadRow> for DocumentHead {
    fn from(row: DocumentHeadRow) -> Self {
        DocumentHead {
            stream_type: row.stream_type,
            stream_id: row.stream_id,
            version: row.version as u64,
            status: row.status,
            label: row.label,
            business_date: row.business_date,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug)]
struct StockRow {
    part_number: String,
    current_stock: i64,
    status: String,
    last_updated: DateTime<Utc>,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for StockRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StockRow {
            part_number: row.try_get("part_number")?,
            current_stock: row.try_get("current_stock")?,
            status: row.try_get("status")?,
            last_updated: row.try_get("last_updated")?,
            version: row.try_get("version")?,
        })
    }
}

impl TryFrom<StockRow> for StockRecord {
    type Error = StoreError;

    fn try_from(row: StockRow) -> Result<Self, Self::Error> {
        Ok(StockRecord {
            part_number: PartNumber::parse(&row.part_number)
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            current_stock: row.current_stock,
            status: row
                .status
                .parse()
                .map_err(|e: stockledger_core::DomainError| StoreError::Backend(e.to_string()))?,
            last_updated: row.last_updated,
            version: row.version as u64,
        })
    }
}

#[derive(Debug)]
struct TransactionRow {
    id: Uuid,
    business_date: NaiveDate,
    part_number: String,
    kind: String,
    quantity: i64,
    reference: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    balance_after: Option<i64>,
}

impl<'r> FromRow<'r, PgRow> for TransactionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TransactionRow {
            id: row.try_get("id")?,
            business_date: row.try_get("business_date")?,
            part_number: row.try_get("part_number")?,
            kind: row.try_get("type")?,
            quantity: row.try_get("quantity")?,
            reference: row.try_get("reference")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            balance_after: row.try_get("balance_after")?,
        })
    }
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: TransactionId::from_uuid(row.id),
            date: row.business_date,
            part_number: PartNumber::parse(&row.part_number)
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            kind: row
                .kind
                .parse()
                .map_err(|e: stockledger_core::DomainError| StoreError::Backend(e.to_string()))?,
            quantity: row.quantity,
            reference: row.reference,
            notes: row.notes,
            created_at: row.created_at,
            balance_after: row.balance_after,
        })
    }
}

#[derive(Debug)]
struct OutboxRow {
    id: i64,
    event_id: Uuid,
    event_type: String,
    stream_type: String,
    stream_id: Uuid,
    occurred_at: DateTime<Utc>,
    payload: serde_json::Value,
    attempts: i32,
    last_error: Option<String>,
    next_attempt_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for OutboxRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OutboxRow {
            id: row.try_get("id")?,
            event_id: row.try_get("event_id")?,
            event_type: row.try_get("event_type")?,
            stream_type: row.try_get("stream_type")?,
            stream_id: row.try_get("stream_id")?,
            occurred_at: row.try_get("occurred_at")?,
            payload: row.try_get("payload")?,
            attempts: row.try_get("attempts")?,
            last_error: row.try_get("last_error")?,
            next_attempt_at: row.try_get("next_attempt_at")?,
        })
    }
}

impl From<OutboxRow> for OutboxMessage {
    fn from(row: OutboxRow) -> Self {
        OutboxMessage {
            id: row.id as u64,
            event_id: row.event_id,
            event_type: row.event_type,
            stream_type: row.stream_type,
            stream_id: row.stream_id,
            occurred_at: row.occurred_at,
            payload: row.payload,
            attempts: row.attempts.max(0) as u32,
            last_error: row.last_error,
            next_attempt_at: row.next_attempt_at,
        }
    }
}
