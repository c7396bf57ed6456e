//! Unsaved item edits of an open count session.
//!
//! Edits made while a session is ACTIVE are buffered here, keyed by item, and
//! only reach the ledger when the session is completed. The buffer is never
//! persisted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockledger_core::{CountItemId, DomainError, DomainResult};

/// One buffered edit. `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEdit {
    pub physical_stock: Option<i64>,
    pub notes: Option<String>,
}

impl PendingEdit {
    /// Fold a newer edit into this one; fields it sets win.
    pub fn merge(&mut self, newer: PendingEdit) {
        if newer.physical_stock.is_some() {
            self.physical_stock = newer.physical_stock;
        }
        if newer.notes.is_some() {
            self.notes = newer.notes;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.physical_stock.is_none() && self.notes.is_none()
    }
}

/// An edit addressed to a specific item, as handed to session completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemEdit {
    pub item_id: CountItemId,
    pub physical_stock: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingEdits {
    edits: BTreeMap<CountItemId, PendingEdit>,
}

impl PendingEdits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&mut self, item_id: CountItemId, edit: PendingEdit) -> DomainResult<()> {
        if let Some(value) = edit.physical_stock {
            if value < 0 {
                return Err(DomainError::validation("physical stock cannot be negative"));
            }
        }
        if edit.is_empty() {
            return Ok(());
        }
        self.edits.entry(item_id).or_default().merge(edit);
        Ok(())
    }

    pub fn get(&self, item_id: &CountItemId) -> Option<&PendingEdit> {
        self.edits.get(item_id)
    }

    /// Drop the buffered edit of one item (after it was saved explicitly).
    pub fn discard(&mut self, item_id: &CountItemId) -> Option<PendingEdit> {
        self.edits.remove(item_id)
    }

    /// Drop the edits `consumed` carried, keeping any item edited again
    /// since `consumed` was taken. Returns how many edits remain.
    pub fn forget_consumed(&mut self, consumed: &PendingEdits) -> usize {
        for (item_id, edit) in consumed.iter() {
            if self.edits.get(item_id) == Some(edit) {
                self.edits.remove(item_id);
            }
        }
        self.edits.len()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CountItemId, &PendingEdit)> {
        self.edits.iter()
    }

    pub fn to_item_edits(&self) -> Vec<ItemEdit> {
        self.edits
            .iter()
            .map(|(item_id, edit)| ItemEdit {
                item_id: *item_id,
                physical_stock: edit.physical_stock,
                notes: edit.notes.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn later_edit_wins_per_field() {
        let item = CountItemId::new();
        let mut buffer = PendingEdits::new();
        buffer
            .stage(
                item,
                PendingEdit {
                    physical_stock: Some(97),
                    notes: Some("shelf B".into()),
                },
            )
            .unwrap();
        buffer
            .stage(
                item,
                PendingEdit {
                    physical_stock: Some(95),
                    notes: None,
                },
            )
            .unwrap();

        let edit = buffer.get(&item).unwrap();
        assert_eq!(edit.physical_stock, Some(95));
        assert_eq!(edit.notes.as_deref(), Some("shelf B"));
    }

    #[test]
    fn forgetting_consumed_edits_keeps_newer_ones() {
        let counted = CountItemId::new();
        let retyped = CountItemId::new();
        let edit = |v: i64| PendingEdit {
            physical_stock: Some(v),
            notes: None,
        };

        let mut buffer = PendingEdits::new();
        buffer.stage(counted, edit(10)).unwrap();
        buffer.stage(retyped, edit(4)).unwrap();
        let consumed = buffer.clone();

        buffer.stage(retyped, edit(3)).unwrap();
        assert_eq!(buffer.forget_consumed(&consumed), 1);
        assert!(buffer.get(&counted).is_none());
        assert_eq!(buffer.get(&retyped).unwrap().physical_stock, Some(3));
    }

    #[test]
    fn negative_physical_stock_is_rejected() {
        let mut buffer = PendingEdits::new();
        let err = buffer
            .stage(
                CountItemId::new(),
                PendingEdit {
                    physical_stock: Some(-1),
                    notes: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn empty_edit_is_ignored() {
        let mut buffer = PendingEdits::new();
        buffer
            .stage(CountItemId::new(), PendingEdit::default())
            .unwrap();
        assert!(buffer.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever the edit history, the buffer holds the last
        /// physical value staged for each item.
        #[test]
        fn last_write_wins(edits in prop::collection::vec((0usize..3, 0i64..1_000), 1..50)) {
            let items = [CountItemId::new(), CountItemId::new(), CountItemId::new()];
            let mut buffer = PendingEdits::new();
            let mut expected: BTreeMap<CountItemId, i64> = BTreeMap::new();

            for (idx, value) in &edits {
                buffer
                    .stage(items[*idx], PendingEdit { physical_stock: Some(*value), notes: None })
                    .unwrap();
                expected.insert(items[*idx], *value);
            }

            prop_assert_eq!(buffer.len(), expected.len());
            for (item, value) in expected {
                prop_assert_eq!(buffer.get(&item).and_then(|e| e.physical_stock), Some(value));
            }
        }
    }
}
