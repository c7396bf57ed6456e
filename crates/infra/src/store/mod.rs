//! Ledger persistence: document streams, stock records, transaction log and
//! outbox behind one atomic commit.

pub mod in_memory;
pub mod postgres;
pub mod stream;
pub mod r#trait;

use std::future::Future;
use std::time::Duration;

pub use in_memory::{FailPoint, InMemoryLedgerStore};
pub use postgres::PostgresLedgerStore;
pub use stream::{
    DocumentAppend, DocumentHead, NewOutboxMessage, OutboxMessage, StoredEvent, UncommittedEvent,
    stream_version, validate_loaded_stream,
};
pub use r#trait::{CommitReceipt, LedgerCommit, LedgerSnapshot, LedgerStore, StoreError};

/// Bound a store call. An elapsed timer is reported as [`StoreError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
