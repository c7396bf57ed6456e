//! Bulk paste of `(part, value)` pairs onto the adjustment sheet.
//!
//! One pair per line, separated by tab, comma, semicolon or whitespace (what
//! spreadsheets and plain text editors produce). A leading header row is
//! ignored. Nothing is applied here; the report tells the caller which values
//! matched a sheet row.

use serde::{Deserialize, Serialize};

use stockledger_core::PartNumber;

use crate::sheet::{AdjustmentSheet, AdjustmentValue};

/// A pasted value that matched a sheet row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PastedValue {
    pub line: usize,
    pub part_number: PartNumber,
    pub new_value: i64,
}

/// A well-formed line naming a part that is not on the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedPart {
    pub line: usize,
    pub part_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedLine {
    pub line: usize,
    pub text: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasteReport {
    pub accepted: Vec<PastedValue>,
    pub unmatched: Vec<UnmatchedPart>,
    pub rejected: Vec<RejectedLine>,
}

impl PasteReport {
    pub fn values(&self) -> Vec<AdjustmentValue> {
        self.accepted
            .iter()
            .map(|v| AdjustmentValue {
                part_number: v.part_number.clone(),
                new_value: v.new_value,
            })
            .collect()
    }
}

fn is_separator(c: char) -> bool {
    matches!(c, '\t' | ',' | ';') || c.is_whitespace()
}

impl AdjustmentSheet {
    pub fn paste(&self, text: &str) -> PasteReport {
        let mut report = PasteReport::default();
        let mut seen_content = false;

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let fields: Vec<&str> = raw.split(is_separator).filter(|f| !f.is_empty()).collect();
            if fields.is_empty() {
                continue;
            }
            let first_content_line = !seen_content;
            seen_content = true;

            let reject = |reason: &str| RejectedLine {
                line,
                text: raw.trim().to_string(),
                reason: reason.to_string(),
            };

            if fields.len() != 2 {
                if !first_content_line {
                    report
                        .rejected
                        .push(reject("expected a part number and a value"));
                }
                continue;
            }

            let value = match fields[1].parse::<i64>() {
                Ok(v) => v,
                // "part<TAB>qty" style headers.
                Err(_) if first_content_line => continue,
                Err(_) => {
                    report.rejected.push(reject("value is not a whole number"));
                    continue;
                }
            };
            if value < 0 {
                report.rejected.push(reject("value cannot be negative"));
                continue;
            }

            let part_number = match PartNumber::parse(fields[0]) {
                Ok(p) => p,
                Err(e) => {
                    report.rejected.push(reject(&e.to_string()));
                    continue;
                }
            };
            if self.row(&part_number).is_none() {
                report.unmatched.push(UnmatchedPart {
                    line,
                    part_number: part_number.to_string(),
                });
                continue;
            }

            // A part pasted twice keeps its last value.
            report.accepted.retain(|v| v.part_number != part_number);
            report.accepted.push(PastedValue {
                line,
                part_number,
                new_value: value,
            });
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockledger_inventory::StockRecord;

    fn part(s: &str) -> PartNumber {
        PartNumber::parse(s).unwrap()
    }

    fn sheet() -> AdjustmentSheet {
        let mut a1 = StockRecord::empty(part("A1"), Utc::now());
        a1.current_stock = 12;
        AdjustmentSheet::new(&[part("A1"), part("B2")], &[a1], 10)
    }

    #[test]
    fn header_and_mixed_separators() {
        let report = sheet().paste("Part\tQty\nA1\t15\nB2, 3\n");
        assert!(report.rejected.is_empty());
        assert_eq!(report.accepted.len(), 2);
        assert_eq!(report.accepted[0].new_value, 15);
        assert_eq!(report.accepted[1].part_number, part("B2"));
        assert_eq!(report.accepted[1].line, 3);
    }

    #[test]
    fn unknown_parts_are_reported_not_applied() {
        let report = sheet().paste("A1;4\nZZ-9;7");
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(
            report.unmatched,
            vec![UnmatchedPart {
                line: 2,
                part_number: "ZZ-9".into()
            }]
        );
    }

    #[test]
    fn bad_lines_are_rejected_with_line_numbers() {
        let report = sheet().paste("A1 5\nB2 lots\nA1 -3\nB2 1 2\n\n");
        assert_eq!(report.accepted.len(), 1);
        let lines: Vec<usize> = report.rejected.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![2, 3, 4]);
    }

    #[test]
    fn repeated_part_keeps_last_value() {
        let report = sheet().paste("A1 5\nA1 6");
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.values()[0].new_value, 6);
    }
}
