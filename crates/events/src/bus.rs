//! Fan-out of committed ledger facts to side-effect consumers.
//!
//! The outbox relay is the only publisher and publishes strictly after the
//! store commit. Delivery is at-least-once: a relay retry can publish the same
//! message again, so consumers deduplicate by event id. The bus keeps nothing;
//! undelivered work lives in the outbox table.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// Receiving end handed to one consumer. Not meant to be shared across threads.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Wait up to `timeout`; worker loops use the timeout to poll for shutdown.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Publish/subscribe seam between the relay and its consumers.
///
/// A failed `publish` is not fatal: the relay leaves the outbox row pending
/// and tries again on a later pass.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    /// Every subscriber receives its own copy of each later message.
    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
