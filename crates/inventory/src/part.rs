use serde::{Deserialize, Serialize};

use stockledger_core::PartNumber;

/// Catalogue lifecycle status of a part.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartStatus {
    #[default]
    Active,
    Inactive,
    Discontinued,
}

/// Catalogue entry. Parts are never deleted once referenced by stock or
/// transactions; retiring one only changes its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub part_number: PartNumber,
    pub category: String,
    #[serde(default)]
    pub status: PartStatus,
}

impl Part {
    pub fn new(part_number: PartNumber, category: impl Into<String>) -> Self {
        Self {
            part_number,
            category: category.into(),
            status: PartStatus::Active,
        }
    }

    pub fn with_status(mut self, status: PartStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == PartStatus::Active
    }
}
