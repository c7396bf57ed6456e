//! Intake containers: register, edit while pending, confirm arrival.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use stockledger_core::{BusinessDate, ContainerId, PartNumber, ReceivingLineId};
use stockledger_receiving::{
    AddPart, ChangeQuantity, ConfirmArrival, DeleteContainer, NewReceivingLine, ReceivingCommand,
    ReceivingContainer, RegisterContainer, RemovePart,
};

use crate::catalog::{PartCatalog, require_part};
use crate::store::{DocumentHead, LedgerStore};

use super::document::LedgerDocument;
use super::error::WorkflowError;
use super::runner::{WorkflowOutcome, WorkflowRunner};

pub struct ReceivingService<S> {
    runner: Arc<WorkflowRunner<S>>,
    catalog: Arc<dyn PartCatalog>,
}

impl<S: LedgerStore> ReceivingService<S> {
    pub fn new(runner: Arc<WorkflowRunner<S>>, catalog: Arc<dyn PartCatalog>) -> Self {
        Self { runner, catalog }
    }

    /// Register a PENDING container. Stock is untouched until confirmation.
    pub async fn register(
        &self,
        container_no: &str,
        lines: &[(PartNumber, i64)],
    ) -> Result<ReceivingContainer, WorkflowError> {
        for (part, _) in lines {
            require_part(self.catalog.as_ref(), part)?;
        }
        let container_id = ContainerId::new();
        let lines = lines
            .iter()
            .map(|(part, quantity)| NewReceivingLine {
                line_id: ReceivingLineId::new(),
                part_number: part.clone(),
                quantity: *quantity,
            })
            .collect();

        let outcome = self
            .execute(
                container_id,
                ReceivingCommand::RegisterContainer(RegisterContainer {
                    container_id,
                    container_no: container_no.to_string(),
                    lines,
                    occurred_at: Utc::now(),
                }),
            )
            .await?;
        info!(container_id = %container_id, container_no, "container registered");
        Ok(outcome.document)
    }

    pub async fn add_part(
        &self,
        container_id: ContainerId,
        part_number: PartNumber,
        quantity: i64,
    ) -> Result<ReceivingContainer, WorkflowError> {
        require_part(self.catalog.as_ref(), &part_number)?;
        let outcome = self
            .execute(
                container_id,
                ReceivingCommand::AddPart(AddPart {
                    container_id,
                    line: NewReceivingLine {
                        line_id: ReceivingLineId::new(),
                        part_number,
                        quantity,
                    },
                    occurred_at: Utc::now(),
                }),
            )
            .await?;
        Ok(outcome.document)
    }

    pub async fn change_quantity(
        &self,
        container_id: ContainerId,
        line_id: ReceivingLineId,
        quantity: i64,
    ) -> Result<ReceivingContainer, WorkflowError> {
        let outcome = self
            .execute(
                container_id,
                ReceivingCommand::ChangeQuantity(ChangeQuantity {
                    container_id,
                    line_id,
                    quantity,
                    occurred_at: Utc::now(),
                }),
            )
            .await?;
        Ok(outcome.document)
    }

    pub async fn remove_part(
        &self,
        container_id: ContainerId,
        line_id: ReceivingLineId,
    ) -> Result<ReceivingContainer, WorkflowError> {
        let outcome = self
            .execute(
                container_id,
                ReceivingCommand::RemovePart(RemovePart {
                    container_id,
                    line_id,
                    occurred_at: Utc::now(),
                }),
            )
            .await?;
        Ok(outcome.document)
    }

    /// Receive every line on `arrival_date`. A second confirmation is a no-op.
    pub async fn confirm(
        &self,
        container_id: ContainerId,
        arrival_date: BusinessDate,
    ) -> Result<WorkflowOutcome<ReceivingContainer>, WorkflowError> {
        let outcome = self
            .execute(
                container_id,
                ReceivingCommand::ConfirmArrival(ConfirmArrival {
                    container_id,
                    arrival_date,
                    occurred_at: Utc::now(),
                }),
            )
            .await?;
        if outcome.changed() {
            info!(
                container_id = %container_id,
                %arrival_date,
                lines = outcome.transactions.len(),
                "container received"
            );
        }
        Ok(outcome)
    }

    /// Delete a PENDING container.
    pub async fn delete(&self, container_id: ContainerId) -> Result<(), WorkflowError> {
        self.execute(
            container_id,
            ReceivingCommand::DeleteContainer(DeleteContainer {
                container_id,
                occurred_at: Utc::now(),
            }),
        )
        .await?;
        info!(container_id = %container_id, "container deleted");
        Ok(())
    }

    pub async fn get(&self, container_id: ContainerId) -> Result<ReceivingContainer, WorkflowError> {
        let container: ReceivingContainer = self.runner.load(*container_id.as_uuid()).await?;
        if !container.is_live() {
            return Err(WorkflowError::NotFound(format!("container {container_id}")));
        }
        Ok(container)
    }

    /// Containers, most recently touched first. Deleted ones are left out.
    pub async fn list(&self) -> Result<Vec<DocumentHead>, WorkflowError> {
        let heads = self
            .runner
            .call(
                self.runner
                    .store()
                    .document_heads(ReceivingContainer::STREAM_TYPE),
            )
            .await?;
        Ok(heads.into_iter().filter(|h| h.status != "DELETED").collect())
    }

    async fn execute(
        &self,
        container_id: ContainerId,
        command: ReceivingCommand,
    ) -> Result<WorkflowOutcome<ReceivingContainer>, WorkflowError> {
        self.runner
            .execute::<ReceivingContainer>(*container_id.as_uuid(), command)
            .await
    }
}
