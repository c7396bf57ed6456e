//! Workflow services over the ledger store.
//!
//! Each service turns user actions into aggregate commands and hands them to
//! the shared [`WorkflowRunner`], which commits the document change, stock
//! writes, log rows and outbox messages together.

pub mod adjustment;
pub mod counting;
pub mod document;
pub mod error;
pub mod receiving;
pub mod runner;
pub mod shipment;

pub use adjustment::{AdjustmentOutcome, AdjustmentService};
pub use counting::{CountService, SessionView};
pub use document::LedgerDocument;
pub use error::WorkflowError;
pub use receiving::ReceivingService;
pub use runner::{PostingOutcome, RunnerSettings, WorkflowOutcome, WorkflowRunner};
pub use shipment::ShipmentService;
