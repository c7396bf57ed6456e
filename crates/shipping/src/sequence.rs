use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    Aggregate, AggregateRoot, BusinessDate, DomainError, Entity, PartNumber, SequenceId,
    ShipmentLineId, find_entity,
};
use stockledger_events::Event;
use stockledger_inventory::{Movement, StockEffects};

/// Which outbound batch of the day a sequence belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SequenceLabel {
    /// Numbered run (1st, 2nd, ... pickup of the day).
    Run(u32),
    /// Ad-hoc shipment grouped by a free-form category.
    AdHoc(String),
}

impl core::fmt::Display for SequenceLabel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SequenceLabel::Run(n) => write!(f, "run {n}"),
            SequenceLabel::AdHoc(category) => f.write_str(category),
        }
    }
}

/// Sequence status lifecycle: PENDING → CONFIRMED (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SequenceStatus {
    Pending,
    Confirmed,
}

/// Line status. SKIPPED lines were left out of a subset confirmation and
/// never deducted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineStatus {
    Pending,
    Confirmed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentLine {
    pub line_id: ShipmentLineId,
    pub part_number: PartNumber,
    /// What the scanner saw; informational only.
    pub scanned_quantity: i64,
    /// What will be deducted at confirmation.
    pub actual_quantity: i64,
    /// Set once the actual quantity was edited by hand; scans no longer move it.
    pub actual_overridden: bool,
    pub status: LineStatus,
}

impl Entity for ShipmentLine {
    type Id = ShipmentLineId;

    fn id(&self) -> &Self::Id {
        &self.line_id
    }
}

/// Line registered directly with a pre-filled actual quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShipmentLine {
    pub line_id: ShipmentLineId,
    pub part_number: PartNumber,
    pub actual_quantity: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShipmentTotals {
    pub line_count: usize,
    pub scanned_total: i64,
    pub actual_total: i64,
}

/// Which lines a confirmation deducts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "line_ids", rename_all = "snake_case")]
pub enum ConfirmSelection {
    All,
    Lines(Vec<ShipmentLineId>),
}

/// Aggregate root: ShipmentSequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentSequence {
    id: SequenceId,
    business_date: Option<BusinessDate>,
    label: Option<SequenceLabel>,
    status: SequenceStatus,
    lines: Vec<ShipmentLine>,
    version: u64,
    created: bool,
}

impl ShipmentSequence {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SequenceId) -> Self {
        Self {
            id,
            business_date: None,
            label: None,
            status: SequenceStatus::Pending,
            lines: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SequenceId {
        self.id
    }

    pub fn business_date(&self) -> Option<BusinessDate> {
        self.business_date
    }

    pub fn label(&self) -> Option<&SequenceLabel> {
        self.label.as_ref()
    }

    pub fn status(&self) -> SequenceStatus {
        self.status
    }

    pub fn lines(&self) -> &[ShipmentLine] {
        &self.lines
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn line_for_part(&self, part_number: &PartNumber) -> Option<&ShipmentLine> {
        self.lines.iter().find(|l| &l.part_number == part_number)
    }

    pub fn totals(&self) -> ShipmentTotals {
        ShipmentTotals {
            line_count: self.lines.len(),
            scanned_total: saturating_sum(self.lines.iter().map(|l| l.scanned_quantity)),
            actual_total: saturating_sum(self.lines.iter().map(|l| l.actual_quantity)),
        }
    }

    /// Stock movement reference: the sequence id.
    pub fn reference(&self) -> String {
        self.id.to_string()
    }
}

impl AggregateRoot for ShipmentSequence {
    type Id = SequenceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterSequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSequence {
    pub sequence_id: SequenceId,
    pub business_date: BusinessDate,
    pub label: SequenceLabel,
    pub lines: Vec<NewShipmentLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordScan.
///
/// `new_line_id` is used only when the part has no line yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordScan {
    pub sequence_id: SequenceId,
    pub part_number: PartNumber,
    pub quantity: i64,
    pub new_line_id: ShipmentLineId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EditActual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditActual {
    pub sequence_id: SequenceId,
    pub line_id: ShipmentLineId,
    pub actual_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLine {
    pub sequence_id: SequenceId,
    pub line_id: ShipmentLineId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmSequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmSequence {
    pub sequence_id: SequenceId,
    pub selection: ConfirmSelection,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShipmentCommand {
    RegisterSequence(RegisterSequence),
    RecordScan(RecordScan),
    EditActual(EditActual),
    RemoveLine(RemoveLine),
    ConfirmSequence(ConfirmSequence),
}

/// Event: SequenceRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRegistered {
    pub sequence_id: SequenceId,
    pub business_date: BusinessDate,
    pub label: SequenceLabel,
    pub lines: Vec<NewShipmentLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ScanRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecorded {
    pub sequence_id: SequenceId,
    pub line_id: ShipmentLineId,
    pub part_number: PartNumber,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ActualEdited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualEdited {
    pub sequence_id: SequenceId,
    pub line_id: ShipmentLineId,
    pub actual_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRemoved {
    pub sequence_id: SequenceId,
    pub line_id: ShipmentLineId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SequenceConfirmed.
///
/// `confirmed` snapshots the deducted lines; `skipped` lists the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceConfirmed {
    pub sequence_id: SequenceId,
    pub business_date: BusinessDate,
    pub confirmed: Vec<ShipmentLine>,
    pub skipped: Vec<ShipmentLineId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShipmentEvent {
    SequenceRegistered(SequenceRegistered),
    ScanRecorded(ScanRecorded),
    ActualEdited(ActualEdited),
    LineRemoved(LineRemoved),
    SequenceConfirmed(SequenceConfirmed),
}

impl Event for ShipmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ShipmentEvent::SequenceRegistered(_) => "shipping.sequence.registered",
            ShipmentEvent::ScanRecorded(_) => "shipping.sequence.scan_recorded",
            ShipmentEvent::ActualEdited(_) => "shipping.sequence.actual_edited",
            ShipmentEvent::LineRemoved(_) => "shipping.sequence.line_removed",
            ShipmentEvent::SequenceConfirmed(_) => "shipping.sequence.confirmed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ShipmentEvent::SequenceRegistered(e) => e.occurred_at,
            ShipmentEvent::ScanRecorded(e) => e.occurred_at,
            ShipmentEvent::ActualEdited(e) => e.occurred_at,
            ShipmentEvent::LineRemoved(e) => e.occurred_at,
            ShipmentEvent::SequenceConfirmed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ShipmentSequence {
    type Command = ShipmentCommand;
    type Event = ShipmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ShipmentEvent::SequenceRegistered(e) => {
                self.id = e.sequence_id;
                self.business_date = Some(e.business_date);
                self.label = Some(e.label.clone());
                self.status = SequenceStatus::Pending;
                self.lines = e
                    .lines
                    .iter()
                    .map(|l| ShipmentLine {
                        line_id: l.line_id,
                        part_number: l.part_number.clone(),
                        scanned_quantity: 0,
                        actual_quantity: l.actual_quantity,
                        actual_overridden: true,
                        status: LineStatus::Pending,
                    })
                    .collect();
                self.created = true;
            }
            ShipmentEvent::ScanRecorded(e) => {
                match self.lines.iter_mut().find(|l| l.line_id == e.line_id) {
                    Some(line) => {
                        line.scanned_quantity = line.scanned_quantity.saturating_add(e.quantity);
                        if !line.actual_overridden {
                            line.actual_quantity = line.scanned_quantity;
                        }
                    }
                    None => self.lines.push(ShipmentLine {
                        line_id: e.line_id,
                        part_number: e.part_number.clone(),
                        scanned_quantity: e.quantity,
                        actual_quantity: e.quantity,
                        actual_overridden: false,
                        status: LineStatus::Pending,
                    }),
                }
            }
            ShipmentEvent::ActualEdited(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_id == e.line_id) {
                    line.actual_quantity = e.actual_quantity;
                    line.actual_overridden = true;
                }
            }
            ShipmentEvent::LineRemoved(e) => {
                self.lines.retain(|l| l.line_id != e.line_id);
            }
            ShipmentEvent::SequenceConfirmed(e) => {
                self.status = SequenceStatus::Confirmed;
                for line in &mut self.lines {
                    line.status = if e.skipped.contains(&line.line_id) {
                        LineStatus::Skipped
                    } else {
                        LineStatus::Confirmed
                    };
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ShipmentCommand::RegisterSequence(cmd) => self.handle_register(cmd),
            ShipmentCommand::RecordScan(cmd) => self.handle_scan(cmd),
            ShipmentCommand::EditActual(cmd) => self.handle_edit_actual(cmd),
            ShipmentCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            ShipmentCommand::ConfirmSequence(cmd) => self.handle_confirm(cmd),
        }
    }
}

impl StockEffects for ShipmentSequence {
    fn stock_effects(&self, event: &Self::Event) -> Vec<Movement> {
        match event {
            ShipmentEvent::SequenceConfirmed(e) => e
                .confirmed
                .iter()
                .map(|line| {
                    Movement::outbound(
                        format!("shipment:{}:{}", self.id, line.line_id),
                        line.part_number.clone(),
                        line.actual_quantity,
                        e.business_date,
                        self.reference(),
                    )
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl ShipmentSequence {
    fn ensure_sequence_id(&self, sequence_id: SequenceId) -> Result<(), DomainError> {
        if self.id != sequence_id {
            return Err(DomainError::invariant("sequence_id mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self, sequence_id: SequenceId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("sequence {sequence_id}")));
        }
        self.ensure_sequence_id(sequence_id)
    }

    fn ensure_pending(&self) -> Result<(), DomainError> {
        if self.status != SequenceStatus::Pending {
            return Err(DomainError::invariant(
                "cannot modify a sequence once it is confirmed",
            ));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterSequence) -> Result<Vec<ShipmentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sequence already exists"));
        }
        match &cmd.label {
            SequenceLabel::Run(0) => {
                return Err(DomainError::validation("run numbers start at 1"));
            }
            SequenceLabel::AdHoc(category) if category.trim().is_empty() => {
                return Err(DomainError::validation("ad-hoc category cannot be empty"));
            }
            _ => {}
        }

        let mut seen: Vec<&PartNumber> = Vec::with_capacity(cmd.lines.len());
        for line in &cmd.lines {
            if line.actual_quantity < 0 {
                return Err(DomainError::validation("actual quantity cannot be negative"));
            }
            if seen.contains(&&line.part_number) {
                return Err(DomainError::validation(format!(
                    "part {} is listed twice",
                    line.part_number
                )));
            }
            seen.push(&line.part_number);
        }

        Ok(vec![ShipmentEvent::SequenceRegistered(SequenceRegistered {
            sequence_id: cmd.sequence_id,
            business_date: cmd.business_date,
            label: cmd.label.clone(),
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_scan(&self, cmd: &RecordScan) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_exists(cmd.sequence_id)?;
        self.ensure_pending()?;
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("scanned quantity must be positive"));
        }

        let existing = self.line_for_part(&cmd.part_number);
        if let Some(line) = existing {
            if line.scanned_quantity.checked_add(cmd.quantity).is_none() {
                return Err(DomainError::validation(format!(
                    "scanned quantity for {} is out of range",
                    cmd.part_number
                )));
            }
        }
        let line_id = existing.map(|l| l.line_id).unwrap_or(cmd.new_line_id);

        Ok(vec![ShipmentEvent::ScanRecorded(ScanRecorded {
            sequence_id: cmd.sequence_id,
            line_id,
            part_number: cmd.part_number.clone(),
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_edit_actual(&self, cmd: &EditActual) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_exists(cmd.sequence_id)?;
        self.ensure_pending()?;
        if cmd.actual_quantity < 0 {
            return Err(DomainError::validation("actual quantity cannot be negative"));
        }
        let line = find_entity(&self.lines, &cmd.line_id, "shipment line")?;
        if line.actual_quantity == cmd.actual_quantity && line.actual_overridden {
            return Ok(Vec::new());
        }

        Ok(vec![ShipmentEvent::ActualEdited(ActualEdited {
            sequence_id: cmd.sequence_id,
            line_id: cmd.line_id,
            actual_quantity: cmd.actual_quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(&self, cmd: &RemoveLine) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_exists(cmd.sequence_id)?;
        self.ensure_pending()?;
        find_entity(&self.lines, &cmd.line_id, "shipment line")?;

        Ok(vec![ShipmentEvent::LineRemoved(LineRemoved {
            sequence_id: cmd.sequence_id,
            line_id: cmd.line_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmSequence) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_exists(cmd.sequence_id)?;

        // Terminal: a second confirmation must not deduct again.
        if self.status == SequenceStatus::Confirmed {
            return Ok(Vec::new());
        }

        let business_date = self
            .business_date
            .ok_or_else(|| DomainError::invariant("sequence has no business date"))?;

        let (confirmed, skipped): (Vec<ShipmentLine>, Vec<ShipmentLineId>) = match &cmd.selection
        {
            ConfirmSelection::All => {
                if self.lines.is_empty() {
                    return Err(DomainError::validation("sequence has no lines to confirm"));
                }
                (self.lines.clone(), Vec::new())
            }
            ConfirmSelection::Lines(ids) => {
                if ids.is_empty() {
                    return Err(DomainError::validation("select at least one line to confirm"));
                }
                for id in ids {
                    find_entity(&self.lines, id, "shipment line")?;
                }
                let (selected, rest): (Vec<&ShipmentLine>, Vec<&ShipmentLine>) =
                    self.lines.iter().partition(|l| ids.contains(&l.line_id));
                (
                    selected.into_iter().cloned().collect(),
                    rest.into_iter().map(|l| l.line_id).collect(),
                )
            }
        };

        Ok(vec![ShipmentEvent::SequenceConfirmed(SequenceConfirmed {
            sequence_id: cmd.sequence_id,
            business_date,
            confirmed,
            skipped,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn saturating_sum(values: impl Iterator<Item = i64>) -> i64 {
    values.fold(0, i64::saturating_add)
}
