//! Ledger events and their distribution.
//!
//! Events here are facts already committed to the store; the bus only fans
//! them out to side-effect consumers.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod topic;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use topic::Topical;
