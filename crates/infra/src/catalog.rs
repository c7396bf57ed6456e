//! Read-only part catalogue lookup.

use std::collections::BTreeMap;
use std::sync::RwLock;

use stockledger_core::PartNumber;
use stockledger_inventory::{Part, PartStatus};

use crate::workflows::WorkflowError;

pub trait PartCatalog: Send + Sync {
    fn lookup(&self, part_number: &PartNumber) -> Option<Part>;

    fn parts(&self) -> Vec<Part>;
}

/// Catalogue held in memory, seeded from configuration.
#[derive(Debug, Default)]
pub struct InMemoryPartCatalog {
    parts: RwLock<BTreeMap<PartNumber, Part>>,
}

impl InMemoryPartCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parts(parts: impl IntoIterator<Item = Part>) -> Self {
        let catalog = Self::new();
        for part in parts {
            catalog.upsert(part);
        }
        catalog
    }

    pub fn upsert(&self, part: Part) {
        if let Ok(mut parts) = self.parts.write() {
            parts.insert(part.part_number.clone(), part);
        }
    }
}

impl PartCatalog for InMemoryPartCatalog {
    fn lookup(&self, part_number: &PartNumber) -> Option<Part> {
        self.parts.read().ok()?.get(part_number).cloned()
    }

    fn parts(&self) -> Vec<Part> {
        self.parts
            .read()
            .map(|parts| parts.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// A part new lines may reference: known and not discontinued.
pub fn require_part(catalog: &dyn PartCatalog, part_number: &PartNumber) -> Result<Part, WorkflowError> {
    let part = catalog
        .lookup(part_number)
        .ok_or_else(|| WorkflowError::Validation(format!("unknown part {part_number}")))?;
    if part.status == PartStatus::Discontinued {
        return Err(WorkflowError::Validation(format!(
            "part {part_number} is discontinued"
        )));
    }
    Ok(part)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(s: &str) -> PartNumber {
        PartNumber::parse(s).unwrap()
    }

    #[test]
    fn lookup_and_require() {
        let catalog = InMemoryPartCatalog::with_parts([
            Part::new(part("A1"), "bolts"),
            Part::new(part("Z9"), "legacy").with_status(PartStatus::Discontinued),
        ]);

        assert_eq!(catalog.lookup(&part("A1")).unwrap().category, "bolts");
        assert!(require_part(&catalog, &part("A1")).is_ok());
        assert!(matches!(
            require_part(&catalog, &part("Q7")),
            Err(WorkflowError::Validation(_))
        ));
        assert!(matches!(
            require_part(&catalog, &part("Z9")),
            Err(WorkflowError::Validation(_))
        ));
        assert_eq!(catalog.parts().len(), 2);
    }
}
