//! Infrastructure layer: ledger store, workflow services, outbox, config.

pub mod catalog;
pub mod config;
pub mod ledger;
pub mod outbox;
pub mod reconcile;
pub mod retry;
pub mod store;
pub mod tracker;
pub mod workflows;
