//! Strongly-typed identifiers used across the ledger.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Receiving container (intake batch).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(Uuid);

/// Line of a receiving container.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceivingLineId(Uuid);

/// Outbound shipment sequence.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceId(Uuid);

/// Line of a shipment sequence.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipmentLineId(Uuid);

/// Physical count session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

/// Counted item within a session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountItemId(Uuid);

/// Identifier of a ledger transaction.
///
/// Always generated by the client so an append can be retried without
/// producing a duplicate row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(ContainerId, "ContainerId");
impl_uuid_newtype!(ReceivingLineId, "ReceivingLineId");
impl_uuid_newtype!(SequenceId, "SequenceId");
impl_uuid_newtype!(ShipmentLineId, "ShipmentLineId");
impl_uuid_newtype!(SessionId, "SessionId");
impl_uuid_newtype!(CountItemId, "CountItemId");
impl_uuid_newtype!(TransactionId, "TransactionId");

/// Namespace for deterministic transaction ids (UUIDv5).
const TRANSACTION_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93d7_4b0e_8f51_7c2d_0a9e_b354);

impl TransactionId {
    /// Derive a stable id from the movement that produced the transaction.
    ///
    /// The same source key always yields the same id, so re-running a workflow
    /// step after an ambiguous failure cannot append a second row.
    pub fn derive(source_key: &str) -> Self {
        Self(Uuid::new_v5(&TRANSACTION_NAMESPACE, source_key.as_bytes()))
    }
}

/// Maximum accepted part number length.
pub const PART_NUMBER_MAX_LEN: usize = 64;

/// Catalogue part number.
///
/// Normalised on construction: surrounding whitespace is trimmed; empty
/// values, control characters and over-long values are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartNumber(String);

impl PartNumber {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("part number cannot be empty"));
        }
        if trimmed.chars().count() > PART_NUMBER_MAX_LEN {
            return Err(DomainError::validation(format!(
                "part number exceeds {PART_NUMBER_MAX_LEN} characters"
            )));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(DomainError::validation(
                "part number contains control characters",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PartNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PartNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for PartNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PartNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PartNumber> for String {
    fn from(value: PartNumber) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_number_is_trimmed() {
        let p = PartNumber::parse("  A1-200 ").unwrap();
        assert_eq!(p.as_str(), "A1-200");
    }

    #[test]
    fn empty_part_number_is_rejected() {
        assert!(matches!(
            PartNumber::parse("   "),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn overlong_part_number_is_rejected() {
        let raw = "X".repeat(PART_NUMBER_MAX_LEN + 1);
        assert!(PartNumber::parse(&raw).is_err());
    }

    #[test]
    fn part_number_deserialization_validates() {
        let ok: PartNumber = serde_json::from_str("\" B7 \"").unwrap();
        assert_eq!(ok.as_str(), "B7");
        assert!(serde_json::from_str::<PartNumber>("\"\"").is_err());
    }

    #[test]
    fn derived_transaction_ids_are_stable() {
        let a = TransactionId::derive("shipment:1:line:2");
        let b = TransactionId::derive("shipment:1:line:2");
        let c = TransactionId::derive("shipment:1:line:3");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn uuid_ids_parse_from_strings() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(matches!(
            "nope".parse::<SessionId>(),
            Err(DomainError::InvalidId(_))
        ));
    }
}
