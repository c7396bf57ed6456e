use serde::{Deserialize, Serialize};

use stockledger_adjustment::AdjustmentValue;
use stockledger_core::{
    BusinessDate, ContainerId, PartNumber, SequenceId, SessionId, ShipmentLineId,
};
use stockledger_counting::{CountItemView, CountSession, PendingEdit, PendingEdits, SessionStatus};
use stockledger_infra::workflows::{SessionView, WorkflowOutcome};
use stockledger_inventory::{StockWarning, Transaction, TransactionQuery};
use stockledger_receiving::{ReceivingContainer, ReceivingLine, ReceivingStatus};
use stockledger_shipping::{
    ConfirmSelection, SequenceLabel, SequenceStatus, ShipmentLine, ShipmentSequence, ShipmentTotals,
};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LineRequest {
    pub part_number: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterContainerRequest {
    pub container_no: String,
    #[serde(default)]
    pub lines: Vec<LineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeQuantityRequest {
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmArrivalRequest {
    pub arrival_date: BusinessDate,
}

#[derive(Debug, Deserialize)]
pub struct RegisterShipmentRequest {
    pub business_date: BusinessDate,
    pub label: SequenceLabel,
    #[serde(default)]
    pub lines: Vec<LineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct EditActualRequest {
    pub actual_quantity: i64,
}

/// Omitting `line_ids` confirms every line.
#[derive(Debug, Default, Deserialize)]
pub struct ConfirmShipmentRequest {
    #[serde(default)]
    pub line_ids: Option<Vec<ShipmentLineId>>,
}

impl ConfirmShipmentRequest {
    pub fn selection(self) -> ConfirmSelection {
        match self.line_ids {
            Some(ids) => ConfirmSelection::Lines(ids),
            None => ConfirmSelection::All,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OpenCountRequest {
    pub count_date: BusinessDate,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Deserialize)]
pub struct AddCountItemRequest {
    pub part_number: String,
    pub physical_stock: i64,
    pub notes: Option<String>,
}

/// Body of both save and stage; absent fields are left alone.
#[derive(Debug, Default, Deserialize)]
pub struct CountItemEditRequest {
    pub physical_stock: Option<i64>,
    pub notes: Option<String>,
}

impl From<CountItemEditRequest> for PendingEdit {
    fn from(value: CountItemEditRequest) -> Self {
        PendingEdit {
            physical_stock: value.physical_stock,
            notes: value.notes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PasteRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ApplyAdjustmentRequest {
    pub values: Vec<AdjustmentValue>,
    pub reason: Option<String>,
    pub date: BusinessDate,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReconcileRequest {
    #[serde(default)]
    pub repair: bool,
    /// Business date for repair rows; today when absent.
    pub date: Option<BusinessDate>,
}

/// `GET /transactions` query string.
#[derive(Debug, Default, Deserialize)]
pub struct TransactionParams {
    pub part: Option<String>,
    pub from: Option<BusinessDate>,
    pub to: Option<BusinessDate>,
    pub reference: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl TransactionParams {
    pub fn into_query(self) -> Result<TransactionQuery, axum::response::Response> {
        Ok(TransactionQuery {
            part: self.part.as_deref().map(errors::parse::<PartNumber>).transpose()?,
            from: self.from,
            to: self.to,
            reference: self.reference,
            kind: self.kind.as_deref().map(errors::parse).transpose()?,
        })
    }
}

pub fn parse_lines(lines: &[LineRequest]) -> Result<Vec<(PartNumber, i64)>, axum::response::Response> {
    lines
        .iter()
        .map(|l| Ok((errors::parse::<PartNumber>(&l.part_number)?, l.quantity)))
        .collect()
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ContainerResponse {
    pub id: ContainerId,
    pub container_no: String,
    pub status: ReceivingStatus,
    pub arrival_date: Option<BusinessDate>,
    pub total_quantity: i64,
    pub lines: Vec<ReceivingLine>,
}

impl From<&ReceivingContainer> for ContainerResponse {
    fn from(c: &ReceivingContainer) -> Self {
        Self {
            id: c.id_typed(),
            container_no: c.container_no().to_string(),
            status: c.status(),
            arrival_date: c.arrival_date(),
            total_quantity: c.total_quantity(),
            lines: c.lines().to_vec(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ShipmentResponse {
    pub id: SequenceId,
    pub business_date: Option<BusinessDate>,
    pub label: Option<SequenceLabel>,
    pub status: SequenceStatus,
    pub totals: ShipmentTotals,
    pub lines: Vec<ShipmentLine>,
}

impl From<&ShipmentSequence> for ShipmentResponse {
    fn from(s: &ShipmentSequence) -> Self {
        Self {
            id: s.id_typed(),
            business_date: s.business_date(),
            label: s.label().cloned(),
            status: s.status(),
            totals: s.totals(),
            lines: s.lines().to_vec(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: SessionId,
    pub count_date: Option<BusinessDate>,
    pub label: String,
    pub status: SessionStatus,
    pub items: Vec<CountItemView>,
    pub pending_edits: usize,
}

impl From<SessionView> for SessionResponse {
    fn from(v: SessionView) -> Self {
        Self {
            id: v.session.id_typed(),
            count_date: v.session.count_date(),
            label: v.session.label().to_string(),
            status: v.session.status(),
            items: v.items,
            pending_edits: v.pending,
        }
    }
}

impl SessionResponse {
    /// A session with nothing staged, as after completion.
    pub fn from_session(session: &CountSession) -> Self {
        Self::from(SessionView {
            items: session.view(&PendingEdits::new()),
            pending: 0,
            session: session.clone(),
        })
    }
}

/// A document after a ledger-affecting command.
#[derive(Debug, Serialize)]
pub struct OutcomeResponse<T> {
    pub document: T,
    /// False when the command was a repeat and nothing was written.
    pub changed: bool,
    pub transactions: Vec<Transaction>,
    pub warnings: Vec<StockWarning>,
}

impl<T> OutcomeResponse<T> {
    pub fn from_outcome<D>(outcome: WorkflowOutcome<D>, map: impl FnOnce(&D) -> T) -> Self {
        Self {
            document: map(&outcome.document),
            changed: outcome.changed(),
            transactions: outcome.transactions,
            warnings: outcome.warnings,
        }
    }
}
