use chrono::{DateTime, Utc};

/// A document or ledger fact as written to a stream.
///
/// `event_type` and `version` are persisted next to the payload so old rows
/// stay decodable after the payload shape changes. `occurred_at` is the wall
/// clock; business dates are part of the payload.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name, e.g. `shipping.sequence.confirmed`.
    fn event_type(&self) -> &'static str;

    fn version(&self) -> u32;

    fn occurred_at(&self) -> DateTime<Utc>;
}
