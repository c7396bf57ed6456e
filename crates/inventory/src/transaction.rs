//! Immutable ledger rows.
//!
//! Quantities are signed: positive increments stock, negative decrements it.
//! Summing every row for a part from zero yields its current stock.

use chrono::{DateTime, Utc};
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use stockledger_core::{BusinessDate, DomainError, DomainResult, PartNumber, TransactionId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Inbound,
    Outbound,
    PhysicalInventory,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Inbound => "INBOUND",
            TransactionType::Outbound => "OUTBOUND",
            TransactionType::PhysicalInventory => "PHYSICAL_INVENTORY",
            TransactionType::Adjustment => "ADJUSTMENT",
        }
    }

    /// Enforce the sign convention for this type.
    ///
    /// INBOUND > 0, OUTBOUND < 0, corrections (count, adjustment) ≠ 0.
    pub fn check_quantity(&self, quantity: i64) -> DomainResult<()> {
        let ok = match self {
            TransactionType::Inbound => quantity > 0,
            TransactionType::Outbound => quantity < 0,
            TransactionType::PhysicalInventory | TransactionType::Adjustment => quantity != 0,
        };
        if ok {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "quantity {quantity} is not valid for a {} transaction",
                self.as_str()
            )))
        }
    }
}

impl core::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INBOUND" => Ok(TransactionType::Inbound),
            "OUTBOUND" => Ok(TransactionType::Outbound),
            "PHYSICAL_INVENTORY" => Ok(TransactionType::PhysicalInventory),
            "ADJUSTMENT" => Ok(TransactionType::Adjustment),
            other => Err(DomainError::validation(format!(
                "unknown transaction type: {other}"
            ))),
        }
    }
}

/// A logged stock movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Business date the movement belongs to (arrival, shipment or count date).
    pub date: BusinessDate,
    pub part_number: PartNumber,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub quantity: i64,
    pub reference: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Stock right after this movement, when the writer knew it.
    pub balance_after: Option<i64>,
}

/// Input for a direct log append (repair and manual corrections).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub id: TransactionId,
    pub date: BusinessDate,
    pub part_number: PartNumber,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub quantity: i64,
    pub reference: String,
    pub notes: Option<String>,
}

impl NewTransaction {
    pub fn validate(&self) -> DomainResult<()> {
        self.kind.check_quantity(self.quantity)?;
        if self.reference.trim().is_empty() {
            return Err(DomainError::validation("reference cannot be empty"));
        }
        Ok(())
    }

    pub fn into_transaction(self, created_at: DateTime<Utc>) -> DomainResult<Transaction> {
        self.validate()?;
        Ok(Transaction {
            id: self.id,
            date: self.date,
            part_number: self.part_number,
            kind: self.kind,
            quantity: self.quantity,
            reference: self.reference,
            notes: self.notes,
            created_at,
            balance_after: None,
        })
    }
}

/// Filter for reading the log. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionQuery {
    pub part: Option<PartNumber>,
    pub from: Option<BusinessDate>,
    pub to: Option<BusinessDate>,
    pub reference: Option<String>,
    pub kind: Option<TransactionType>,
}

impl TransactionQuery {
    pub fn for_part(part: PartNumber) -> Self {
        Self {
            part: Some(part),
            ..Self::default()
        }
    }

    pub fn for_reference(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        self.part.as_ref().is_none_or(|p| *p == tx.part_number)
            && self.from.is_none_or(|d| tx.date >= d)
            && self.to.is_none_or(|d| tx.date <= d)
            && self.reference.as_deref().is_none_or(|r| r == tx.reference)
            && self.kind.is_none_or(|k| k == tx.kind)
    }
}
