//! Shipping domain module (outbound shipment sequences, event-sourced).
//!
//! A sequence is one outbound batch for a business date. Lines are editable
//! while PENDING; confirmation deducts each selected line's actual quantity
//! exactly once and leaves the sequence CONFIRMED for good.

pub mod sequence;

pub use sequence::{
    ActualEdited, ConfirmSelection, ConfirmSequence, EditActual, LineRemoved, LineStatus,
    NewShipmentLine, RecordScan, RegisterSequence, RemoveLine, ScanRecorded, SequenceConfirmed,
    SequenceLabel, SequenceRegistered, SequenceStatus, ShipmentCommand, ShipmentEvent,
    ShipmentLine, ShipmentSequence, ShipmentTotals,
};
