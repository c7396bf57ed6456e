//! Consistency checks between the stock table and the transaction log.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockledger_core::{BusinessDate, PartNumber, TransactionId};

use crate::stock::StockRecord;
use crate::transaction::{NewTransaction, Transaction, TransactionType};

/// A part whose stock does not equal the sum of its logged movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    pub part_number: PartNumber,
    pub recorded_stock: i64,
    pub ledger_sum: i64,
}

impl Divergence {
    /// `recorded_stock - ledger_sum`: what the log is missing.
    pub fn difference(&self) -> i64 {
        self.recorded_stock.saturating_sub(self.ledger_sum)
    }

    /// ADJUSTMENT that makes the log agree with the stock table again.
    pub fn repair(&self, date: BusinessDate, reference: &str) -> NewTransaction {
        NewTransaction {
            id: TransactionId::derive(&format!(
                "repair:{reference}:{}",
                self.part_number
            )),
            date,
            part_number: self.part_number.clone(),
            kind: TransactionType::Adjustment,
            quantity: self.difference(),
            reference: reference.to_string(),
            notes: Some(format!(
                "reconciliation: log sum {} vs stock {}",
                self.ledger_sum, self.recorded_stock
            )),
        }
    }
}

/// A logged `balance_after` that disagrees with the running sum at that point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceMismatch {
    pub transaction_id: TransactionId,
    pub part_number: PartNumber,
    pub running_sum: i64,
    pub balance_after: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub checked_parts: usize,
    pub divergences: Vec<Divergence>,
    pub balance_mismatches: Vec<BalanceMismatch>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.divergences.is_empty() && self.balance_mismatches.is_empty()
    }
}

/// Compare stock records with the log. `transactions` must be in append order.
///
/// Parts with log rows but no stock record are treated as stock 0.
pub fn reconcile(records: &[StockRecord], transactions: &[Transaction]) -> ReconciliationReport {
    let mut sums: BTreeMap<&PartNumber, i64> = BTreeMap::new();
    let mut balance_mismatches = Vec::new();

    for tx in transactions {
        let running = sums.entry(&tx.part_number).or_insert(0);
        *running = running.saturating_add(tx.quantity);
        if let Some(balance_after) = tx.balance_after {
            if balance_after != *running {
                balance_mismatches.push(BalanceMismatch {
                    transaction_id: tx.id,
                    part_number: tx.part_number.clone(),
                    running_sum: *running,
                    balance_after,
                });
            }
        }
    }

    let mut stock: BTreeMap<&PartNumber, i64> = records
        .iter()
        .map(|r| (&r.part_number, r.current_stock))
        .collect();
    for part in sums.keys() {
        stock.entry(*part).or_insert(0);
    }

    let divergences: Vec<Divergence> = stock
        .iter()
        .filter_map(|(part, &recorded)| {
            let ledger_sum = sums.get(part).copied().unwrap_or(0);
            (recorded != ledger_sum).then(|| Divergence {
                part_number: (*part).clone(),
                recorded_stock: recorded,
                ledger_sum,
            })
        })
        .collect();

    ReconciliationReport {
        checked_parts: stock.len(),
        divergences,
        balance_mismatches,
    }
}
