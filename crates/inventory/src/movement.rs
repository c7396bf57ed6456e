use serde::{Deserialize, Serialize};

use stockledger_core::{Aggregate, BusinessDate, PartNumber, TransactionId};

use crate::transaction::TransactionType;

/// How a movement changes the stock figure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum StockChange {
    Increment(i64),
    Decrement(i64),
    /// Absolute overwrite (count completion, quick adjustment).
    Overwrite(i64),
}

/// One intended stock movement, produced by a workflow document when it is
/// confirmed or completed.
///
/// `source_key` identifies the movement within its document; the transaction
/// id is derived from it, so re-planning the same document yields the same ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub source_key: String,
    pub part_number: PartNumber,
    pub change: StockChange,
    pub kind: TransactionType,
    pub date: BusinessDate,
    pub reference: String,
    pub notes: Option<String>,
}

impl Movement {
    pub fn inbound(
        source_key: impl Into<String>,
        part_number: PartNumber,
        quantity: i64,
        date: BusinessDate,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            source_key: source_key.into(),
            part_number,
            change: StockChange::Increment(quantity),
            kind: TransactionType::Inbound,
            date,
            reference: reference.into(),
            notes: None,
        }
    }

    pub fn outbound(
        source_key: impl Into<String>,
        part_number: PartNumber,
        quantity: i64,
        date: BusinessDate,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            source_key: source_key.into(),
            part_number,
            change: StockChange::Decrement(quantity),
            kind: TransactionType::Outbound,
            date,
            reference: reference.into(),
            notes: None,
        }
    }

    pub fn physical_count(
        source_key: impl Into<String>,
        part_number: PartNumber,
        counted: i64,
        date: BusinessDate,
        reference: impl Into<String>,
        notes: Option<String>,
    ) -> Self {
        Self {
            source_key: source_key.into(),
            part_number,
            change: StockChange::Overwrite(counted),
            kind: TransactionType::PhysicalInventory,
            date,
            reference: reference.into(),
            notes,
        }
    }

    pub fn adjustment(
        source_key: impl Into<String>,
        part_number: PartNumber,
        new_value: i64,
        date: BusinessDate,
        reference: impl Into<String>,
        notes: Option<String>,
    ) -> Self {
        Self {
            source_key: source_key.into(),
            part_number,
            change: StockChange::Overwrite(new_value),
            kind: TransactionType::Adjustment,
            date,
            reference: reference.into(),
            notes,
        }
    }

    pub fn transaction_id(&self) -> TransactionId {
        TransactionId::derive(&self.source_key)
    }
}

/// Documents whose events move stock.
///
/// Evaluated against the state *before* `event` is applied, so a document can
/// describe the lines it is about to close. Events with no stock effect
/// return nothing.
pub trait StockEffects: Aggregate {
    fn stock_effects(&self, event: &Self::Event) -> Vec<Movement>;
}

/// Fold `events` into `state`, collecting the movements they imply.
pub fn apply_with_effects<A: StockEffects>(state: &mut A, events: &[A::Event]) -> Vec<Movement> {
    let mut movements = Vec::new();
    for event in events {
        movements.extend(state.stock_effects(event));
        state.apply(event);
    }
    movements
}
