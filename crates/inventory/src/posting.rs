//! Stock arithmetic for a batch of movements.
//!
//! A [`PostingPlan`] is seeded with the current record of every part a
//! workflow touches, then fed that workflow's movements in order. Movements on
//! the same part chain through a running balance. The plan yields:
//!
//! - one [`StockWrite`] per changed part, carrying the version it was read at;
//! - one [`Transaction`] per non-zero movement, with the signed delta and
//!   `balance_after`;
//! - [`StockWarning`]s the caller should surface (negative stock under the
//!   `warn` policy).
//!
//! Nothing here touches storage; the infra layer commits the result atomically.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, PartNumber, TransactionId};

use crate::movement::{Movement, StockChange};
use crate::stock::{DEFAULT_LOW_STOCK_THRESHOLD, StockRecord};
use crate::transaction::Transaction;

/// What to do when an outbound movement would drive stock below zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NegativeStockPolicy {
    /// Allow it and report a [`StockWarning::NegativeStock`].
    #[default]
    Warn,
    /// Fail the whole plan before anything is written.
    Reject,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingSettings {
    pub low_stock_threshold: i64,
    pub negative_stock: NegativeStockPolicy,
}

impl Default for PostingSettings {
    fn default() -> Self {
        Self {
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            negative_stock: NegativeStockPolicy::Warn,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockWarning {
    NegativeStock {
        part_number: PartNumber,
        before: i64,
        after: i64,
        reference: String,
    },
}

/// A stock row to persist. `expected_version` is the version the row had when
/// it was read (0 = insert); `record.version` is the version after the write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockWrite {
    pub record: StockRecord,
    pub expected_version: u64,
}

impl StockWrite {
    /// Create the zero-stock row for a part that has none yet.
    pub fn create_empty(part_number: PartNumber, now: DateTime<Utc>) -> Self {
        let mut record = StockRecord::empty(part_number, now);
        record.version = 1;
        Self {
            record,
            expected_version: 0,
        }
    }
}

/// Output of a finished plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerPostings {
    pub stock_writes: Vec<StockWrite>,
    pub transactions: Vec<Transaction>,
    pub warnings: Vec<StockWarning>,
}

impl LedgerPostings {
    pub fn is_empty(&self) -> bool {
        self.stock_writes.is_empty() && self.transactions.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Working {
    record: StockRecord,
    read_version: u64,
    dirty: bool,
}

#[derive(Debug, Clone)]
pub struct PostingPlan {
    now: DateTime<Utc>,
    settings: PostingSettings,
    records: BTreeMap<PartNumber, Working>,
    transactions: Vec<Transaction>,
    warnings: Vec<StockWarning>,
}

impl PostingPlan {
    pub fn new(now: DateTime<Utc>, settings: PostingSettings) -> Self {
        Self {
            now,
            settings,
            records: BTreeMap::new(),
            transactions: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Register the current state of a part. `None` means no row exists yet.
    pub fn seed(&mut self, part_number: PartNumber, record: Option<StockRecord>) {
        let record = record.unwrap_or_else(|| StockRecord::empty(part_number.clone(), self.now));
        let read_version = record.version;
        self.records.insert(
            part_number,
            Working {
                record,
                read_version,
                dirty: false,
            },
        );
    }

    /// Running balance of a seeded part.
    pub fn current(&self, part_number: &PartNumber) -> Option<i64> {
        self.records.get(part_number).map(|w| w.record.current_stock)
    }

    /// Apply one movement. Returns the transaction it produced, or `None` when
    /// the movement leaves stock unchanged.
    pub fn post(&mut self, movement: &Movement) -> DomainResult<Option<&Transaction>> {
        let id = movement.transaction_id();
        if self.transactions.iter().any(|t| t.id == id) {
            return Err(DomainError::invariant(format!(
                "movement {} posted twice",
                movement.source_key
            )));
        }

        let working = self.records.get_mut(&movement.part_number).ok_or_else(|| {
            DomainError::invariant(format!(
                "stock for {} was not loaded before posting",
                movement.part_number
            ))
        })?;

        let before = working.record.current_stock;
        let after = match movement.change {
            StockChange::Increment(q) => {
                if q <= 0 {
                    return Err(DomainError::validation(format!(
                        "received quantity for {} must be positive",
                        movement.part_number
                    )));
                }
                before.checked_add(q).ok_or_else(|| overflow(movement))?
            }
            StockChange::Decrement(q) => {
                if q < 0 {
                    return Err(DomainError::validation(format!(
                        "shipped quantity for {} cannot be negative",
                        movement.part_number
                    )));
                }
                before.checked_sub(q).ok_or_else(|| overflow(movement))?
            }
            StockChange::Overwrite(v) => {
                if v < 0 {
                    return Err(DomainError::validation(format!(
                        "stock for {} cannot be set below zero",
                        movement.part_number
                    )));
                }
                v
            }
        };

        let delta = after.checked_sub(before).ok_or_else(|| overflow(movement))?;
        if delta == 0 {
            return Ok(None);
        }

        if after < 0 && matches!(movement.change, StockChange::Decrement(_)) {
            match self.settings.negative_stock {
                NegativeStockPolicy::Reject => {
                    return Err(DomainError::validation(format!(
                        "shipping {} of {} would leave stock at {after} (currently {before})",
                        -delta, movement.part_number
                    )));
                }
                NegativeStockPolicy::Warn => {
                    self.warnings.push(StockWarning::NegativeStock {
                        part_number: movement.part_number.clone(),
                        before,
                        after,
                        reference: movement.reference.clone(),
                    });
                }
            }
        }

        movement.kind.check_quantity(delta)?;

        working
            .record
            .set_stock(after, self.settings.low_stock_threshold, self.now);
        working.dirty = true;

        self.transactions.push(Transaction {
            id,
            date: movement.date,
            part_number: movement.part_number.clone(),
            kind: movement.kind,
            quantity: delta,
            reference: movement.reference.clone(),
            notes: movement.notes.clone(),
            created_at: self.now,
            balance_after: Some(after),
        });
        Ok(self.transactions.last())
    }

    pub fn post_all(&mut self, movements: &[Movement]) -> DomainResult<()> {
        for movement in movements {
            self.post(movement)?;
        }
        Ok(())
    }

    /// Ids of the transactions planned so far.
    pub fn transaction_ids(&self) -> Vec<TransactionId> {
        self.transactions.iter().map(|t| t.id).collect()
    }

    pub fn finish(self) -> LedgerPostings {
        let stock_writes = self
            .records
            .into_values()
            .filter(|w| w.dirty)
            .map(|w| {
                let mut record = w.record;
                record.version = w.read_version + 1;
                StockWrite {
                    record,
                    expected_version: w.read_version,
                }
            })
            .collect();

        LedgerPostings {
            stock_writes,
            transactions: self.transactions,
            warnings: self.warnings,
        }
    }
}

fn overflow(movement: &Movement) -> DomainError {
    DomainError::validation(format!(
        "movement {} on {} takes stock out of range",
        movement.reference, movement.part_number
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionType;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn part(s: &str) -> PartNumber {
        PartNumber::parse(s).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn record(p: &str, stock: i64, version: u64) -> StockRecord {
        let mut r = StockRecord::empty(part(p), Utc::now());
        r.current_stock = stock;
        r.version = version;
        r
    }

    fn plan(policy: NegativeStockPolicy) -> PostingPlan {
        PostingPlan::new(
            Utc::now(),
            PostingSettings {
                low_stock_threshold: 10,
                negative_stock: policy,
            },
        )
    }

    #[test]
    fn receive_then_ship_chains_balances() {
        let mut plan = plan(NegativeStockPolicy::Warn);
        plan.seed(part("A1"), Some(record("A1", 10, 4)));

        plan.post(&Movement::inbound("c:1", part("A1"), 5, day(10), "C1"))
            .unwrap();
        plan.post(&Movement::outbound("s:1", part("A1"), 5, day(11), "S1"))
            .unwrap();

        let out = plan.finish();
        assert_eq!(out.transactions.len(), 2);
        assert_eq!(out.transactions[0].quantity, 5);
        assert_eq!(out.transactions[0].balance_after, Some(15));
        assert_eq!(out.transactions[1].quantity, -5);
        assert_eq!(out.transactions[1].balance_after, Some(10));

        assert_eq!(out.stock_writes.len(), 1);
        let write = &out.stock_writes[0];
        assert_eq!(write.expected_version, 4);
        assert_eq!(write.record.version, 5);
        assert_eq!(write.record.current_stock, 10);
    }

    #[test]
    fn missing_record_is_created_at_version_one() {
        let mut plan = plan(NegativeStockPolicy::Warn);
        plan.seed(part("A1"), None);
        plan.post(&Movement::inbound("c:1", part("A1"), 20, day(10), "C1"))
            .unwrap();

        let out = plan.finish();
        assert_eq!(out.stock_writes[0].expected_version, 0);
        assert_eq!(out.stock_writes[0].record.version, 1);
        assert_eq!(out.stock_writes[0].record.current_stock, 20);
    }

    #[test]
    fn overwrite_logs_signed_delta() {
        let mut plan = plan(NegativeStockPolicy::Warn);
        plan.seed(part("A1"), Some(record("A1", 12, 2)));
        let tx = plan
            .post(&Movement::physical_count(
                "n:1",
                part("A1"),
                10,
                day(12),
                "N1",
                None,
            ))
            .unwrap()
            .cloned()
            .unwrap();
        assert_eq!(tx.kind, TransactionType::PhysicalInventory);
        assert_eq!(tx.quantity, -2);
        assert_eq!(tx.balance_after, Some(10));
    }

    #[test]
    fn unchanged_overwrite_produces_nothing() {
        let mut plan = plan(NegativeStockPolicy::Warn);
        plan.seed(part("A1"), Some(record("A1", 7, 1)));
        let tx = plan
            .post(&Movement::adjustment("a:1", part("A1"), 7, day(1), "ADJ", None))
            .unwrap();
        assert!(tx.is_none());
        assert!(plan.finish().is_empty());
    }

    #[test]
    fn zero_shipment_produces_nothing() {
        let mut plan = plan(NegativeStockPolicy::Warn);
        plan.seed(part("A1"), Some(record("A1", 7, 1)));
        assert!(
            plan.post(&Movement::outbound("s:1", part("A1"), 0, day(1), "S"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn negative_stock_warns_by_default() {
        let mut plan = plan(NegativeStockPolicy::Warn);
        plan.seed(part("A1"), Some(record("A1", 3, 1)));
        plan.post(&Movement::outbound("s:1", part("A1"), 5, day(1), "S1"))
            .unwrap();

        let out = plan.finish();
        assert_eq!(out.stock_writes[0].record.current_stock, -2);
        assert_eq!(
            out.warnings,
            vec![StockWarning::NegativeStock {
                part_number: part("A1"),
                before: 3,
                after: -2,
                reference: "S1".into(),
            }]
        );
    }

    #[test]
    fn negative_stock_rejected_under_reject_policy() {
        let mut plan = plan(NegativeStockPolicy::Reject);
        plan.seed(part("A1"), Some(record("A1", 3, 1)));
        let err = plan
            .post(&Movement::outbound("s:1", part("A1"), 5, day(1), "S1"))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn stock_past_i64_range_is_rejected() {
        let mut plan = plan(NegativeStockPolicy::Warn);
        plan.seed(part("A1"), None);
        plan.post(&Movement::inbound("c:1", part("A1"), i64::MAX, day(1), "C1"))
            .unwrap();
        let err = plan
            .post(&Movement::inbound("c:2", part("A1"), 1, day(1), "C2"))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let mut plan = self::plan(NegativeStockPolicy::Warn);
        plan.seed(part("A1"), Some(record("A1", -5, 1)));
        let err = plan
            .post(&Movement::outbound("s:1", part("A1"), i64::MAX, day(1), "S1"))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn unseeded_part_is_an_invariant_violation() {
        let mut plan = plan(NegativeStockPolicy::Warn);
        let err = plan
            .post(&Movement::inbound("c:1", part("ZZ"), 1, day(1), "C"))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn duplicate_source_key_is_rejected() {
        let mut plan = plan(NegativeStockPolicy::Warn);
        plan.seed(part("A1"), None);
        let m = Movement::inbound("c:1", part("A1"), 1, day(1), "C");
        plan.post(&m).unwrap();
        assert!(plan.post(&m).is_err());
    }

    fn arb_change() -> impl Strategy<Value = StockChange> {
        prop_oneof![
            (1i64..500).prop_map(StockChange::Increment),
            (0i64..500).prop_map(StockChange::Decrement),
            (0i64..500).prop_map(StockChange::Overwrite),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: starting stock plus the signed sum of planned transactions
        /// equals the final stock, and each balance_after is the running sum.
        #[test]
        fn running_sum_matches_final_stock(
            start in 0i64..1_000,
            changes in prop::collection::vec(arb_change(), 1..30)
        ) {
            let mut plan = plan(NegativeStockPolicy::Warn);
            plan.seed(part("P"), Some(record("P", start, 3)));

            for (i, change) in changes.iter().enumerate() {
                let kind = match change {
                    StockChange::Increment(_) => TransactionType::Inbound,
                    StockChange::Decrement(_) => TransactionType::Outbound,
                    StockChange::Overwrite(_) => TransactionType::Adjustment,
                };
                let movement = Movement {
                    source_key: format!("m:{i}"),
                    part_number: part("P"),
                    change: *change,
                    kind,
                    date: day(1),
                    reference: "R".into(),
                    notes: None,
                };
                plan.post(&movement).unwrap();
            }

            let out = plan.finish();
            let mut running = start;
            for tx in &out.transactions {
                prop_assert!(tx.quantity != 0);
                running += tx.quantity;
                prop_assert_eq!(tx.balance_after, Some(running));
            }

            match out.stock_writes.first() {
                Some(write) => prop_assert_eq!(write.record.current_stock, running),
                None => prop_assert_eq!(running, start),
            }
        }
    }
}
