use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// What travels on the bus: a payload plus where and when it was committed.
///
/// `sequence_number` is the outbox row id, increasing per store rather than
/// per stream. Consumers deduplicate on `event_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    event_type: String,
    stream_type: String,
    stream_id: Uuid,
    sequence_number: u64,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        event_type: impl Into<String>,
        stream_type: impl Into<String>,
        stream_id: Uuid,
        sequence_number: u64,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            stream_type: stream_type.into(),
            stream_id,
            sequence_number,
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }
}

impl EventEnvelope<JsonValue> {
    /// Decode the JSON payload as `T` without cloning it.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Moved {
        part: String,
        quantity: i64,
    }

    fn envelope(payload: JsonValue) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            "stock.movement.posted",
            "stock.transaction",
            Uuid::now_v7(),
            1,
            Utc::now(),
            payload,
        )
    }

    #[test]
    fn decodes_typed_payload() {
        let env = envelope(serde_json::json!({ "part": "A1", "quantity": -8 }));
        let moved: Moved = env.decode().unwrap();
        assert_eq!(moved, Moved { part: "A1".into(), quantity: -8 });
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let env = envelope(serde_json::json!({ "part": 12 }));
        assert!(env.decode::<Moved>().is_err());
    }
}
