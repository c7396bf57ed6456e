//! Inventory ledger primitives.
//!
//! Pure types and arithmetic shared by every workflow: stock records, the
//! transaction log row, movements and the posting plan that turns movements
//! into stock writes plus log rows. Storage lives in `stockledger-infra`.

pub mod event;
pub mod movement;
pub mod part;
pub mod posting;
pub mod reconcile;
pub mod stock;
pub mod transaction;

pub use event::{LedgerEvent, MovementPosted};
pub use movement::{Movement, StockChange, StockEffects, apply_with_effects};
pub use part::{Part, PartStatus};
pub use posting::{
    LedgerPostings, NegativeStockPolicy, PostingPlan, PostingSettings, StockWarning, StockWrite,
};
pub use reconcile::{BalanceMismatch, Divergence, ReconciliationReport, reconcile};
pub use stock::{DEFAULT_LOW_STOCK_THRESHOLD, StockRecord, StockStatus};
pub use transaction::{NewTransaction, Transaction, TransactionQuery, TransactionType};
