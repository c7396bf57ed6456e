use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{BusinessDate, PartNumber, TransactionId};
use stockledger_events::Event;

use crate::transaction::{Transaction, TransactionType};

/// Event: a transaction was committed together with its stock write.
///
/// This is what downstream consumers (movement tracker, daily roll-up) see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPosted {
    pub transaction_id: TransactionId,
    pub part_number: PartNumber,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub quantity: i64,
    pub balance_after: Option<i64>,
    pub date: BusinessDate,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

impl From<&Transaction> for MovementPosted {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.id,
            part_number: tx.part_number.clone(),
            kind: tx.kind,
            quantity: tx.quantity,
            balance_after: tx.balance_after,
            date: tx.date,
            reference: tx.reference.clone(),
            occurred_at: tx.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    MovementPosted(MovementPosted),
}

impl LedgerEvent {
    pub const MOVEMENT_POSTED: &'static str = "stock.movement.posted";
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::MovementPosted(_) => Self::MOVEMENT_POSTED,
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::MovementPosted(e) => e.occurred_at,
        }
    }
}
