//! Binding between workflow aggregates and their persisted streams.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use stockledger_core::{Aggregate, ContainerId, DomainError, SequenceId, SessionId};
use stockledger_counting::{CountSession, SessionStatus};
use stockledger_inventory::StockEffects;
use stockledger_receiving::{ReceivingContainer, ReceivingStatus};
use stockledger_shipping::{SequenceStatus, ShipmentSequence};

use crate::store::DocumentHead;

/// An event-sourced document the runner can load, decide on and commit.
pub trait LedgerDocument:
    StockEffects
    + Aggregate<
        Error = DomainError,
        Event: stockledger_events::Event + Serialize + DeserializeOwned,
        Command: Send + Sync,
    > + Clone
    + Send
    + Sync
    + 'static
{
    const STREAM_TYPE: &'static str;

    /// Empty instance to rehydrate the stream into.
    fn for_stream(stream_id: Uuid) -> Self;

    fn stream_id(&self) -> Uuid;

    /// Created and not deleted.
    fn is_live(&self) -> bool;

    fn head(&self, updated_at: DateTime<Utc>) -> DocumentHead;
}

impl LedgerDocument for ReceivingContainer {
    const STREAM_TYPE: &'static str = "receiving.container";

    fn for_stream(stream_id: Uuid) -> Self {
        ReceivingContainer::empty(ContainerId::from_uuid(stream_id))
    }

    fn stream_id(&self) -> Uuid {
        *self.id_typed().as_uuid()
    }

    fn is_live(&self) -> bool {
        self.exists()
    }

    fn head(&self, updated_at: DateTime<Utc>) -> DocumentHead {
        let status = if self.is_deleted() {
            "DELETED"
        } else {
            match self.status() {
                ReceivingStatus::Pending => "PENDING",
                ReceivingStatus::Completed => "COMPLETED",
            }
        };
        DocumentHead {
            stream_type: Self::STREAM_TYPE.to_string(),
            stream_id: LedgerDocument::stream_id(self),
            version: 0,
            status: status.to_string(),
            label: self.container_no().to_string(),
            business_date: self.arrival_date(),
            updated_at,
        }
    }
}

impl LedgerDocument for ShipmentSequence {
    const STREAM_TYPE: &'static str = "shipping.sequence";

    fn for_stream(stream_id: Uuid) -> Self {
        ShipmentSequence::empty(SequenceId::from_uuid(stream_id))
    }

    fn stream_id(&self) -> Uuid {
        *self.id_typed().as_uuid()
    }

    fn is_live(&self) -> bool {
        self.exists()
    }

    fn head(&self, updated_at: DateTime<Utc>) -> DocumentHead {
        let status = match self.status() {
            SequenceStatus::Pending => "PENDING",
            SequenceStatus::Confirmed => "CONFIRMED",
        };
        DocumentHead {
            stream_type: Self::STREAM_TYPE.to_string(),
            stream_id: LedgerDocument::stream_id(self),
            version: 0,
            status: status.to_string(),
            label: self.label().map(|l| l.to_string()).unwrap_or_default(),
            business_date: self.business_date(),
            updated_at,
        }
    }
}

impl LedgerDocument for CountSession {
    const STREAM_TYPE: &'static str = "counting.session";

    fn for_stream(stream_id: Uuid) -> Self {
        CountSession::empty(SessionId::from_uuid(stream_id))
    }

    fn stream_id(&self) -> Uuid {
        *self.id_typed().as_uuid()
    }

    fn is_live(&self) -> bool {
        self.exists()
    }

    fn head(&self, updated_at: DateTime<Utc>) -> DocumentHead {
        let status = match self.status() {
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Completed => "COMPLETED",
        };
        DocumentHead {
            stream_type: Self::STREAM_TYPE.to_string(),
            stream_id: LedgerDocument::stream_id(self),
            version: 0,
            status: status.to_string(),
            label: self.label().to_string(),
            business_date: self.count_date(),
            updated_at,
        }
    }
}
