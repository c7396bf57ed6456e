//! Domain building blocks shared by the ledger crates: ids, part numbers,
//! aggregate traits and the domain error type. No infrastructure here.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot};
pub use entity::{Entity, find_entity};
pub use error::{DomainError, DomainResult};
pub use id::{
    ContainerId, CountItemId, PartNumber, ReceivingLineId, SequenceId, SessionId, ShipmentLineId,
    TransactionId,
};

/// Business ("as-of") date entered by users; independent of wall-clock time.
pub type BusinessDate = chrono::NaiveDate;
