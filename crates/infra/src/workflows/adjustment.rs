//! Quick adjustment over the configured part list.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use stockledger_adjustment::{AdjustmentSheet, AdjustmentValue, PasteReport, adjustment_reference};
use stockledger_core::{BusinessDate, PartNumber};
use stockledger_inventory::{StockWarning, Transaction};

use crate::store::LedgerStore;

use super::error::WorkflowError;
use super::runner::WorkflowRunner;

/// One applied adjustment batch.
#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentOutcome {
    /// Shared by every transaction of the batch.
    pub reference: String,
    pub transactions: Vec<Transaction>,
    pub warnings: Vec<StockWarning>,
}

pub struct AdjustmentService<S> {
    runner: Arc<WorkflowRunner<S>>,
    parts: Vec<PartNumber>,
}

impl<S: LedgerStore> AdjustmentService<S> {
    pub fn new(runner: Arc<WorkflowRunner<S>>, parts: Vec<PartNumber>) -> Self {
        Self { runner, parts }
    }

    pub fn parts(&self) -> &[PartNumber] {
        &self.parts
    }

    /// Current stock for every curated part, in configured order.
    pub async fn sheet(&self) -> Result<AdjustmentSheet, WorkflowError> {
        let records = self.runner.stock_records(&self.parts).await?;
        Ok(AdjustmentSheet::new(
            &self.parts,
            &records,
            self.low_stock_threshold(),
        ))
    }

    /// Match pasted `part value` lines against the sheet. Nothing is written.
    pub async fn paste(&self, text: &str) -> Result<PasteReport, WorkflowError> {
        Ok(self.sheet().await?.paste(text))
    }

    /// Overwrite stock for the given parts, logging each signed difference.
    ///
    /// Values equal to current stock are skipped. The whole batch commits
    /// together or not at all.
    pub async fn apply(
        &self,
        values: &[AdjustmentValue],
        reason: Option<&str>,
        date: BusinessDate,
    ) -> Result<AdjustmentOutcome, WorkflowError> {
        let reference = adjustment_reference(Utc::now(), Uuid::now_v7().as_u128() as u32);
        let threshold = self.low_stock_threshold();

        let posted = self
            .runner
            .post(&self.parts, |records| {
                AdjustmentSheet::new(&self.parts, records, threshold).plan(values, reason, date, &reference)
            })
            .await?;

        info!(
            reference = %reference,
            adjusted = posted.transactions.len(),
            requested = values.len(),
            "quick adjustment applied"
        );
        Ok(AdjustmentOutcome {
            reference,
            transactions: posted.transactions,
            warnings: posted.warnings,
        })
    }

    fn low_stock_threshold(&self) -> i64 {
        self.runner.settings().posting.low_stock_threshold
    }
}
