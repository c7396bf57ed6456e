//! Counting domain module (physical count sessions, event-sourced).
//!
//! Items snapshot the stock on record when added. Completing the session
//! overwrites stock with the counted value for every item that differs and
//! logs the signed correction.

pub mod pending;
pub mod session;

pub use pending::{ItemEdit, PendingEdit, PendingEdits};
pub use session::{
    AddItem, CompleteSession, CountCommand, CountEvent, CountItem, CountItemView, CountSession,
    DisplayStatus, ItemAdded, ItemSaved, ItemStatus, OpenSession, SaveItem, SessionCompleted,
    SessionOpened, SessionStatus,
};
