//! Workflow documents as pure state machines.

/// Identity and stream revision of a document.
///
/// Receiving containers, shipment sequences and count sessions implement
/// this. The revision equals the number of events folded into the document,
/// and it is what the store checks a new append against.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    fn version(&self) -> u64;
}

/// Decide-then-fold command handling.
///
/// `handle` never mutates: it inspects the current state and returns the
/// events a command produces. `apply` folds one event into the state and must
/// accept every event `handle` can return, including on replay.
///
/// `Ok(vec![])` is an accepted repeat, e.g. confirming a sequence twice. Callers
/// treat it as success with nothing to write.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Fold a whole stream, e.g. when rehydrating from the store.
    fn replay<'a>(&mut self, events: impl IntoIterator<Item = &'a Self::Event>)
    where
        Self::Event: 'a,
    {
        for event in events {
            self.apply(event);
        }
    }
}
