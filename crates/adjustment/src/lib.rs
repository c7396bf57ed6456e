//! Quick adjustment: direct stock overwrites over a curated list of parts.
//!
//! Unlike the other workflows there is no persisted document; a batch of
//! values is planned against the sheet and committed in one go.

pub mod paste;
pub mod sheet;

pub use paste::{PasteReport, PastedValue, RejectedLine, UnmatchedPart};
pub use sheet::{AdjustmentSheet, AdjustmentValue, SheetRow, adjustment_reference};
