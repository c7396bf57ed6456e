use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{BusinessDate, DomainError, DomainResult, PartNumber};
use stockledger_inventory::{Movement, StockRecord, StockStatus};

/// One editable row of the quick-adjustment sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetRow {
    pub part_number: PartNumber,
    pub current_stock: i64,
    pub status: StockStatus,
}

/// Requested absolute stock value for one part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentValue {
    pub part_number: PartNumber,
    pub new_value: i64,
}

/// Fixed list of parts open to direct stock overwrites.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdjustmentSheet {
    rows: Vec<SheetRow>,
}

impl AdjustmentSheet {
    /// Build the sheet for `parts` in the given order. Parts without a stock
    /// record show as zero.
    pub fn new(parts: &[PartNumber], records: &[StockRecord], low_stock_threshold: i64) -> Self {
        let rows = parts
            .iter()
            .map(|part| {
                let current_stock = records
                    .iter()
                    .find(|r| &r.part_number == part)
                    .map(|r| r.current_stock)
                    .unwrap_or(0);
                SheetRow {
                    part_number: part.clone(),
                    current_stock,
                    status: StockStatus::classify(current_stock, low_stock_threshold),
                }
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[SheetRow] {
        &self.rows
    }

    pub fn row(&self, part_number: &PartNumber) -> Option<&SheetRow> {
        self.rows.iter().find(|r| &r.part_number == part_number)
    }

    /// Turn requested values into overwrite movements.
    ///
    /// Parts whose value equals the displayed stock are skipped. The note is
    /// the shared `reason` when given, otherwise `before→after`.
    pub fn plan(
        &self,
        values: &[AdjustmentValue],
        reason: Option<&str>,
        date: BusinessDate,
        reference: &str,
    ) -> DomainResult<Vec<Movement>> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        let mut movements = Vec::new();

        for (idx, value) in values.iter().enumerate() {
            if values[..idx]
                .iter()
                .any(|v| v.part_number == value.part_number)
            {
                return Err(DomainError::validation(format!(
                    "part {} appears twice",
                    value.part_number
                )));
            }
            let row = self.row(&value.part_number).ok_or_else(|| {
                DomainError::validation(format!(
                    "part {} is not on the adjustment sheet",
                    value.part_number
                ))
            })?;
            if value.new_value < 0 {
                return Err(DomainError::validation(format!(
                    "stock for {} cannot be set below zero",
                    value.part_number
                )));
            }
            if value.new_value == row.current_stock {
                continue;
            }

            let note = match reason {
                Some(r) => r.to_string(),
                None => format!("{}→{}", row.current_stock, value.new_value),
            };
            movements.push(Movement::adjustment(
                format!("adjustment:{reference}:{}", value.part_number),
                value.part_number.clone(),
                value.new_value,
                date,
                reference,
                Some(note),
            ));
        }

        Ok(movements)
    }
}

/// Reference shared by every transaction of one adjustment batch:
/// `ADJ-<yyyymmddHHMMSS>-<8 hex>`.
pub fn adjustment_reference(now: DateTime<Utc>, nonce: u32) -> String {
    format!("ADJ-{}-{nonce:08x}", now.format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use stockledger_inventory::{StockChange, TransactionType};

    fn part(s: &str) -> PartNumber {
        PartNumber::parse(s).unwrap()
    }

    fn record(p: &str, stock: i64) -> StockRecord {
        let mut r = StockRecord::empty(part(p), Utc::now());
        r.current_stock = stock;
        r.version = 1;
        r
    }

    fn sheet() -> AdjustmentSheet {
        AdjustmentSheet::new(
            &[part("A1"), part("B2"), part("C3")],
            &[record("A1", 12), record("B2", 40)],
            10,
        )
    }

    fn value(p: &str, new_value: i64) -> AdjustmentValue {
        AdjustmentValue {
            part_number: part(p),
            new_value,
        }
    }

    fn day() -> BusinessDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn rows_follow_curated_order() {
        let sheet = sheet();
        let parts: Vec<&str> = sheet.rows().iter().map(|r| r.part_number.as_str()).collect();
        assert_eq!(parts, vec!["A1", "B2", "C3"]);
        assert_eq!(sheet.rows()[2].current_stock, 0);
        assert_eq!(sheet.rows()[2].status, StockStatus::OutOfStock);
        assert_eq!(sheet.rows()[0].status, StockStatus::InStock);
    }

    #[test]
    fn unchanged_values_are_skipped() {
        let movements = sheet()
            .plan(&[value("A1", 12), value("B2", 35)], None, day(), "ADJ-1")
            .unwrap();
        assert_eq!(movements.len(), 1);
        let m = &movements[0];
        assert_eq!(m.part_number, part("B2"));
        assert_eq!(m.kind, TransactionType::Adjustment);
        assert_eq!(m.change, StockChange::Overwrite(35));
        assert_eq!(m.notes.as_deref(), Some("40→35"));
    }

    #[test]
    fn shared_reason_becomes_the_note() {
        let movements = sheet()
            .plan(&[value("C3", 7)], Some(" found in back room "), day(), "ADJ-1")
            .unwrap();
        assert_eq!(movements[0].notes.as_deref(), Some("found in back room"));
        assert_eq!(movements[0].reference, "ADJ-1");
    }

    #[test]
    fn parts_off_the_sheet_are_rejected() {
        let err = sheet()
            .plan(&[value("Z9", 1)], None, day(), "ADJ-1")
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn negative_and_duplicate_values_are_rejected() {
        assert!(sheet().plan(&[value("A1", -1)], None, day(), "R").is_err());
        assert!(
            sheet()
                .plan(&[value("A1", 1), value("A1", 2)], None, day(), "R")
                .is_err()
        );
    }

    #[test]
    fn reference_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 7).unwrap();
        assert_eq!(adjustment_reference(now, 0xbeef), "ADJ-20240301090507-0000beef");
    }
}
