use crate::EventEnvelope;

/// Messages that can be routed by event type.
///
/// Workers use this to pick the messages they care about off a shared bus
/// (e.g. the movement tracker only consumes stock movements).
pub trait Topical {
    fn topic(&self) -> &str;
}

impl<E> Topical for EventEnvelope<E> {
    fn topic(&self) -> &str {
        self.event_type()
    }
}
