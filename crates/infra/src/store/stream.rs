use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockledger_events::EventEnvelope;

use super::r#trait::StoreError;

/// A document event ready to be appended (no sequence number yet).
///
/// Built from a typed domain event with [`UncommittedEvent::from_typed`]; the
/// payload is the serde representation the aggregate is rehydrated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub stream_type: String,
    pub stream_id: Uuid,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl UncommittedEvent {
    pub fn from_typed<E>(
        stream_type: impl Into<String>,
        stream_id: Uuid,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, StoreError>
    where
        E: stockledger_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| StoreError::Backend(format!("payload serialization failed: {e}")))?;

        Ok(Self {
            event_id,
            stream_type: stream_type.into(),
            stream_id,
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// A persisted document event.
///
/// Sequence numbers start at 1 and are contiguous per `(stream_type, stream_id)`;
/// the last one is the document version used for optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub stream_type: String,
    pub stream_id: Uuid,

    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub(crate) fn from_uncommitted(event: UncommittedEvent, sequence_number: u64) -> Self {
        Self {
            event_id: event.event_id,
            stream_type: event.stream_type,
            stream_id: event.stream_id,
            sequence_number,
            event_type: event.event_type,
            event_version: event.event_version,
            occurred_at: event.occurred_at,
            payload: event.payload,
        }
    }
}

/// Version of a loaded stream (0 when the document does not exist).
pub fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

/// Reject streams a correct backend can never return.
pub fn validate_loaded_stream(
    stream_type: &str,
    stream_id: Uuid,
    stream: &[StoredEvent],
) -> Result<(), StoreError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.stream_type != stream_type || e.stream_id != stream_id {
            return Err(StoreError::Backend(format!(
                "loaded stream contains a foreign event at index {idx}"
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(StoreError::Backend(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

/// Listing row for a document, kept next to its stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHead {
    pub stream_type: String,
    pub stream_id: Uuid,
    pub version: u64,
    pub status: String,
    pub label: String,
    pub business_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

/// Events to append to one document stream inside a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentAppend {
    pub stream_type: String,
    pub stream_id: Uuid,
    /// Stream version the events were decided against.
    pub expected_version: u64,
    pub events: Vec<UncommittedEvent>,
    /// Head as of the last appended event.
    pub head: DocumentHead,
}

/// Message written in the same commit as the movement it announces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOutboxMessage {
    /// Dedupe key; repeated inserts with the same id are ignored.
    pub event_id: Uuid,
    pub event_type: String,
    pub stream_type: String,
    pub stream_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxMessage {
    /// Store-assigned, increasing in commit order.
    pub id: u64,
    pub event_id: Uuid,
    pub event_type: String,
    pub stream_type: String,
    pub stream_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
}

impl OutboxMessage {
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            self.event_id,
            self.event_type.clone(),
            self.stream_type.clone(),
            self.stream_id,
            self.id,
            self.occurred_at,
            self.payload.clone(),
        )
    }
}
