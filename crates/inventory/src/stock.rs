use chrono::{DateTime, Utc};
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, PartNumber};

/// Default quantity at or below which a part counts as low on stock.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

/// Status derived from the current stock figure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    pub fn classify(current_stock: i64, low_stock_threshold: i64) -> Self {
        if current_stock <= 0 {
            StockStatus::OutOfStock
        } else if current_stock <= low_stock_threshold {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::LowStock => "low_stock",
            StockStatus::OutOfStock => "out_of_stock",
        }
    }
}

impl FromStr for StockStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_stock" => Ok(StockStatus::InStock),
            "low_stock" => Ok(StockStatus::LowStock),
            "out_of_stock" => Ok(StockStatus::OutOfStock),
            other => Err(DomainError::validation(format!("unknown stock status: {other}"))),
        }
    }
}

/// Authoritative stock-on-hand for one part.
///
/// `version` counts persisted writes; 0 means the row does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub part_number: PartNumber,
    pub current_stock: i64,
    pub status: StockStatus,
    pub last_updated: DateTime<Utc>,
    pub version: u64,
}

impl StockRecord {
    /// The record a part has before anything was ever written for it.
    pub fn empty(part_number: PartNumber, now: DateTime<Utc>) -> Self {
        Self {
            part_number,
            current_stock: 0,
            status: StockStatus::OutOfStock,
            last_updated: now,
            version: 0,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.version > 0
    }

    /// Set a new stock figure, re-deriving the status.
    pub fn set_stock(&mut self, value: i64, low_stock_threshold: i64, now: DateTime<Utc>) {
        self.current_stock = value;
        self.status = StockStatus::classify(value, low_stock_threshold);
        self.last_updated = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_thresholds() {
        assert_eq!(StockStatus::classify(-3, 10), StockStatus::OutOfStock);
        assert_eq!(StockStatus::classify(0, 10), StockStatus::OutOfStock);
        assert_eq!(StockStatus::classify(1, 10), StockStatus::LowStock);
        assert_eq!(StockStatus::classify(10, 10), StockStatus::LowStock);
        assert_eq!(StockStatus::classify(11, 10), StockStatus::InStock);
    }

    #[test]
    fn empty_record_is_not_persisted() {
        let part = PartNumber::parse("A1").unwrap();
        let mut record = StockRecord::empty(part, Utc::now());
        assert!(!record.is_persisted());
        assert_eq!(record.current_stock, 0);

        record.set_stock(25, DEFAULT_LOW_STOCK_THRESHOLD, Utc::now());
        assert_eq!(record.status, StockStatus::InStock);
    }
}
