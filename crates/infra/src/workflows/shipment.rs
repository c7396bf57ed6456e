//! Outbound shipment sequences.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use stockledger_core::{BusinessDate, PartNumber, SequenceId, ShipmentLineId};
use stockledger_shipping::{
    ConfirmSelection, ConfirmSequence, EditActual, NewShipmentLine, RecordScan, RegisterSequence,
    RemoveLine, SequenceLabel, ShipmentCommand, ShipmentSequence,
};

use crate::catalog::{PartCatalog, require_part};
use crate::store::{DocumentHead, LedgerStore};

use super::document::LedgerDocument;
use super::error::WorkflowError;
use super::runner::{WorkflowOutcome, WorkflowRunner};

pub struct ShipmentService<S> {
    runner: Arc<WorkflowRunner<S>>,
    catalog: Arc<dyn PartCatalog>,
}

impl<S: LedgerStore> ShipmentService<S> {
    pub fn new(runner: Arc<WorkflowRunner<S>>, catalog: Arc<dyn PartCatalog>) -> Self {
        Self { runner, catalog }
    }

    pub async fn register(
        &self,
        business_date: BusinessDate,
        label: SequenceLabel,
        lines: &[(PartNumber, i64)],
    ) -> Result<ShipmentSequence, WorkflowError> {
        for (part, _) in lines {
            require_part(self.catalog.as_ref(), part)?;
        }
        let sequence_id = SequenceId::new();
        let lines = lines
            .iter()
            .map(|(part, actual)| NewShipmentLine {
                line_id: ShipmentLineId::new(),
                part_number: part.clone(),
                actual_quantity: *actual,
            })
            .collect();

        let outcome = self
            .execute(
                sequence_id,
                ShipmentCommand::RegisterSequence(RegisterSequence {
                    sequence_id,
                    business_date,
                    label,
                    lines,
                    occurred_at: Utc::now(),
                }),
            )
            .await?;
        info!(sequence_id = %sequence_id, %business_date, "shipment sequence registered");
        Ok(outcome.document)
    }

    /// Add a scanned quantity; opens a line for parts not yet on the sequence.
    pub async fn record_scan(
        &self,
        sequence_id: SequenceId,
        part_number: PartNumber,
        quantity: i64,
    ) -> Result<ShipmentSequence, WorkflowError> {
        require_part(self.catalog.as_ref(), &part_number)?;
        let outcome = self
            .execute(
                sequence_id,
                ShipmentCommand::RecordScan(RecordScan {
                    sequence_id,
                    part_number,
                    quantity,
                    new_line_id: ShipmentLineId::new(),
                    occurred_at: Utc::now(),
                }),
            )
            .await?;
        Ok(outcome.document)
    }

    pub async fn edit_actual(
        &self,
        sequence_id: SequenceId,
        line_id: ShipmentLineId,
        actual_quantity: i64,
    ) -> Result<ShipmentSequence, WorkflowError> {
        let outcome = self
            .execute(
                sequence_id,
                ShipmentCommand::EditActual(EditActual {
                    sequence_id,
                    line_id,
                    actual_quantity,
                    occurred_at: Utc::now(),
                }),
            )
            .await?;
        Ok(outcome.document)
    }

    pub async fn remove_line(
        &self,
        sequence_id: SequenceId,
        line_id: ShipmentLineId,
    ) -> Result<ShipmentSequence, WorkflowError> {
        let outcome = self
            .execute(
                sequence_id,
                ShipmentCommand::RemoveLine(RemoveLine {
                    sequence_id,
                    line_id,
                    occurred_at: Utc::now(),
                }),
            )
            .await?;
        Ok(outcome.document)
    }

    /// Deduct the selected lines' actual quantities and close the sequence.
    ///
    /// Confirming an already-CONFIRMED sequence returns it unchanged.
    pub async fn confirm(
        &self,
        sequence_id: SequenceId,
        selection: ConfirmSelection,
    ) -> Result<WorkflowOutcome<ShipmentSequence>, WorkflowError> {
        let outcome = self
            .execute(
                sequence_id,
                ShipmentCommand::ConfirmSequence(ConfirmSequence {
                    sequence_id,
                    selection,
                    occurred_at: Utc::now(),
                }),
            )
            .await?;
        if outcome.changed() {
            info!(
                sequence_id = %sequence_id,
                shipped_lines = outcome.transactions.len(),
                warnings = outcome.warnings.len(),
                "shipment sequence confirmed"
            );
        }
        Ok(outcome)
    }

    pub async fn get(&self, sequence_id: SequenceId) -> Result<ShipmentSequence, WorkflowError> {
        let sequence: ShipmentSequence = self.runner.load(*sequence_id.as_uuid()).await?;
        if !sequence.is_live() {
            return Err(WorkflowError::NotFound(format!("sequence {sequence_id}")));
        }
        Ok(sequence)
    }

    pub async fn list(&self) -> Result<Vec<DocumentHead>, WorkflowError> {
        Ok(self
            .runner
            .call(
                self.runner
                    .store()
                    .document_heads(ShipmentSequence::STREAM_TYPE),
            )
            .await?)
    }

    async fn execute(
        &self,
        sequence_id: SequenceId,
        command: ShipmentCommand,
    ) -> Result<WorkflowOutcome<ShipmentSequence>, WorkflowError> {
        self.runner
            .execute::<ShipmentSequence>(*sequence_id.as_uuid(), command)
            .await
    }
}
