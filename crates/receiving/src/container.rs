use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    Aggregate, AggregateRoot, BusinessDate, ContainerId, DomainError, Entity, PartNumber,
    ReceivingLineId, find_entity,
};
use stockledger_events::Event;
use stockledger_inventory::{Movement, StockEffects};

/// Container (and line) status lifecycle: PENDING → COMPLETED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceivingStatus {
    Pending,
    Completed,
}

/// One planned intake line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingLine {
    pub line_id: ReceivingLineId,
    pub part_number: PartNumber,
    pub quantity: i64,
    pub status: ReceivingStatus,
}

impl Entity for ReceivingLine {
    type Id = ReceivingLineId;

    fn id(&self) -> &Self::Id {
        &self.line_id
    }
}

/// Line as supplied at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReceivingLine {
    pub line_id: ReceivingLineId,
    pub part_number: PartNumber,
    pub quantity: i64,
}

/// Aggregate root: ReceivingContainer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivingContainer {
    id: ContainerId,
    container_no: String,
    status: ReceivingStatus,
    lines: Vec<ReceivingLine>,
    arrival_date: Option<BusinessDate>,
    registered_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl ReceivingContainer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ContainerId) -> Self {
        Self {
            id,
            container_no: String::new(),
            status: ReceivingStatus::Pending,
            lines: Vec::new(),
            arrival_date: None,
            registered_at: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> ContainerId {
        self.id
    }

    pub fn container_no(&self) -> &str {
        &self.container_no
    }

    pub fn status(&self) -> ReceivingStatus {
        self.status
    }

    pub fn lines(&self) -> &[ReceivingLine] {
        &self.lines
    }

    pub fn arrival_date(&self) -> Option<BusinessDate> {
        self.arrival_date
    }

    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).fold(0, i64::saturating_add)
    }

    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Stock movement reference: the container id.
    pub fn reference(&self) -> String {
        self.id.to_string()
    }

    fn movement_key(&self, line: &ReceivingLine) -> String {
        format!("receiving:{}:{}", self.id, line.line_id)
    }
}

impl AggregateRoot for ReceivingContainer {
    type Id = ContainerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterContainer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterContainer {
    pub container_id: ContainerId,
    pub container_no: String,
    pub lines: Vec<NewReceivingLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddPart (PENDING only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddPart {
    pub container_id: ContainerId,
    pub line: NewReceivingLine,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeQuantity (PENDING only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeQuantity {
    pub container_id: ContainerId,
    pub line_id: ReceivingLineId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemovePart (PENDING only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovePart {
    pub container_id: ContainerId,
    pub line_id: ReceivingLineId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmArrival.
///
/// `arrival_date` is the user-entered business date stamped on every INBOUND
/// transaction; it is independent of `occurred_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmArrival {
    pub container_id: ContainerId,
    pub arrival_date: BusinessDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteContainer (PENDING only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteContainer {
    pub container_id: ContainerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceivingCommand {
    RegisterContainer(RegisterContainer),
    AddPart(AddPart),
    ChangeQuantity(ChangeQuantity),
    RemovePart(RemovePart),
    ConfirmArrival(ConfirmArrival),
    DeleteContainer(DeleteContainer),
}

/// Event: ContainerRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRegistered {
    pub container_id: ContainerId,
    pub container_no: String,
    pub lines: Vec<NewReceivingLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartAdded {
    pub container_id: ContainerId,
    pub line: NewReceivingLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuantityChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityChanged {
    pub container_id: ContainerId,
    pub line_id: ReceivingLineId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PartRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRemoved {
    pub container_id: ContainerId,
    pub line_id: ReceivingLineId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ContainerConfirmed.
///
/// Carries every line so the stock effect can be rebuilt from the event alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfirmed {
    pub container_id: ContainerId,
    pub arrival_date: BusinessDate,
    pub lines: Vec<ReceivingLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ContainerDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDeleted {
    pub container_id: ContainerId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceivingEvent {
    ContainerRegistered(ContainerRegistered),
    PartAdded(PartAdded),
    QuantityChanged(QuantityChanged),
    PartRemoved(PartRemoved),
    ContainerConfirmed(ContainerConfirmed),
    ContainerDeleted(ContainerDeleted),
}

impl Event for ReceivingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReceivingEvent::ContainerRegistered(_) => "receiving.container.registered",
            ReceivingEvent::PartAdded(_) => "receiving.container.part_added",
            ReceivingEvent::QuantityChanged(_) => "receiving.container.quantity_changed",
            ReceivingEvent::PartRemoved(_) => "receiving.container.part_removed",
            ReceivingEvent::ContainerConfirmed(_) => "receiving.container.confirmed",
            ReceivingEvent::ContainerDeleted(_) => "receiving.container.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReceivingEvent::ContainerRegistered(e) => e.occurred_at,
            ReceivingEvent::PartAdded(e) => e.occurred_at,
            ReceivingEvent::QuantityChanged(e) => e.occurred_at,
            ReceivingEvent::PartRemoved(e) => e.occurred_at,
            ReceivingEvent::ContainerConfirmed(e) => e.occurred_at,
            ReceivingEvent::ContainerDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ReceivingContainer {
    type Command = ReceivingCommand;
    type Event = ReceivingEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReceivingEvent::ContainerRegistered(e) => {
                self.id = e.container_id;
                self.container_no = e.container_no.clone();
                self.status = ReceivingStatus::Pending;
                self.lines = e.lines.iter().map(pending_line).collect();
                self.registered_at = Some(e.occurred_at);
                self.created = true;
            }
            ReceivingEvent::PartAdded(e) => {
                self.lines.push(pending_line(&e.line));
            }
            ReceivingEvent::QuantityChanged(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_id == e.line_id) {
                    line.quantity = e.quantity;
                }
            }
            ReceivingEvent::PartRemoved(e) => {
                self.lines.retain(|l| l.line_id != e.line_id);
            }
            ReceivingEvent::ContainerConfirmed(e) => {
                self.status = ReceivingStatus::Completed;
                self.arrival_date = Some(e.arrival_date);
                for line in &mut self.lines {
                    line.status = ReceivingStatus::Completed;
                }
            }
            ReceivingEvent::ContainerDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReceivingCommand::RegisterContainer(cmd) => self.handle_register(cmd),
            ReceivingCommand::AddPart(cmd) => self.handle_add_part(cmd),
            ReceivingCommand::ChangeQuantity(cmd) => self.handle_change_quantity(cmd),
            ReceivingCommand::RemovePart(cmd) => self.handle_remove_part(cmd),
            ReceivingCommand::ConfirmArrival(cmd) => self.handle_confirm(cmd),
            ReceivingCommand::DeleteContainer(cmd) => self.handle_delete(cmd),
        }
    }
}

impl StockEffects for ReceivingContainer {
    fn stock_effects(&self, event: &Self::Event) -> Vec<Movement> {
        match event {
            ReceivingEvent::ContainerConfirmed(e) => e
                .lines
                .iter()
                .map(|line| {
                    Movement::inbound(
                        self.movement_key(line),
                        line.part_number.clone(),
                        line.quantity,
                        e.arrival_date,
                        self.reference(),
                    )
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn pending_line(line: &NewReceivingLine) -> ReceivingLine {
    ReceivingLine {
        line_id: line.line_id,
        part_number: line.part_number.clone(),
        quantity: line.quantity,
        status: ReceivingStatus::Pending,
    }
}

fn ensure_positive(quantity: i64) -> Result<(), DomainError> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(())
}

impl ReceivingContainer {
    fn ensure_container_id(&self, container_id: ContainerId) -> Result<(), DomainError> {
        if self.id != container_id {
            return Err(DomainError::invariant("container_id mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self, container_id: ContainerId) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found(format!("container {container_id}")));
        }
        self.ensure_container_id(container_id)
    }

    fn ensure_pending(&self) -> Result<(), DomainError> {
        if self.status != ReceivingStatus::Pending {
            return Err(DomainError::invariant(
                "cannot modify a container once it is completed",
            ));
        }
        Ok(())
    }

    fn ensure_part_not_listed(&self, part_number: &PartNumber) -> Result<(), DomainError> {
        if self.lines.iter().any(|l| &l.part_number == part_number) {
            return Err(DomainError::validation(format!(
                "part {part_number} is already in this container"
            )));
        }
        Ok(())
    }

    fn handle_register(
        &self,
        cmd: &RegisterContainer,
    ) -> Result<Vec<ReceivingEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("container already exists"));
        }
        if cmd.container_no.trim().is_empty() {
            return Err(DomainError::validation("container number cannot be empty"));
        }

        let mut seen: Vec<&PartNumber> = Vec::with_capacity(cmd.lines.len());
        for line in &cmd.lines {
            ensure_positive(line.quantity)?;
            if seen.contains(&&line.part_number) {
                return Err(DomainError::validation(format!(
                    "part {} is listed twice",
                    line.part_number
                )));
            }
            seen.push(&line.part_number);
        }

        Ok(vec![ReceivingEvent::ContainerRegistered(
            ContainerRegistered {
                container_id: cmd.container_id,
                container_no: cmd.container_no.trim().to_string(),
                lines: cmd.lines.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_add_part(&self, cmd: &AddPart) -> Result<Vec<ReceivingEvent>, DomainError> {
        self.ensure_exists(cmd.container_id)?;
        self.ensure_pending()?;
        ensure_positive(cmd.line.quantity)?;
        self.ensure_part_not_listed(&cmd.line.part_number)?;

        Ok(vec![ReceivingEvent::PartAdded(PartAdded {
            container_id: cmd.container_id,
            line: cmd.line.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_quantity(
        &self,
        cmd: &ChangeQuantity,
    ) -> Result<Vec<ReceivingEvent>, DomainError> {
        self.ensure_exists(cmd.container_id)?;
        self.ensure_pending()?;
        ensure_positive(cmd.quantity)?;
        let line = find_entity(&self.lines, &cmd.line_id, "receiving line")?;
        if line.quantity == cmd.quantity {
            return Ok(Vec::new());
        }

        Ok(vec![ReceivingEvent::QuantityChanged(QuantityChanged {
            container_id: cmd.container_id,
            line_id: cmd.line_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_part(&self, cmd: &RemovePart) -> Result<Vec<ReceivingEvent>, DomainError> {
        self.ensure_exists(cmd.container_id)?;
        self.ensure_pending()?;
        find_entity(&self.lines, &cmd.line_id, "receiving line")?;

        Ok(vec![ReceivingEvent::PartRemoved(PartRemoved {
            container_id: cmd.container_id,
            line_id: cmd.line_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmArrival) -> Result<Vec<ReceivingEvent>, DomainError> {
        self.ensure_exists(cmd.container_id)?;

        // Already received: stock was incremented by the first confirmation.
        if self.status == ReceivingStatus::Completed {
            return Ok(Vec::new());
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot confirm an empty container"));
        }

        Ok(vec![ReceivingEvent::ContainerConfirmed(
            ContainerConfirmed {
                container_id: cmd.container_id,
                arrival_date: cmd.arrival_date,
                lines: self.lines.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_delete(&self, cmd: &DeleteContainer) -> Result<Vec<ReceivingEvent>, DomainError> {
        self.ensure_exists(cmd.container_id)?;
        if self.status == ReceivingStatus::Completed {
            return Err(DomainError::invariant(
                "completed containers cannot be deleted",
            ));
        }

        Ok(vec![ReceivingEvent::ContainerDeleted(ContainerDeleted {
            container_id: cmd.container_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use stockledger_inventory::{StockChange, TransactionType, apply_with_effects};

    fn part(s: &str) -> PartNumber {
        PartNumber::parse(s).unwrap()
    }

    fn line(p: &str, quantity: i64) -> NewReceivingLine {
        NewReceivingLine {
            line_id: ReceivingLineId::new(),
            part_number: part(p),
            quantity,
        }
    }

    fn registered(lines: Vec<NewReceivingLine>) -> ReceivingContainer {
        let id = ContainerId::new();
        let mut container = ReceivingContainer::empty(id);
        let events = container
            .handle(&ReceivingCommand::RegisterContainer(RegisterContainer {
                container_id: id,
                container_no: "CNT-001".into(),
                lines,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        container.apply(&events[0]);
        container
    }

    fn confirm_cmd(container: &ReceivingContainer, d: u32) -> ReceivingCommand {
        ReceivingCommand::ConfirmArrival(ConfirmArrival {
            container_id: container.id_typed(),
            arrival_date: NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn register_creates_pending_lines() {
        let container = registered(vec![line("A1", 20), line("B2", 5)]);
        assert_eq!(container.status(), ReceivingStatus::Pending);
        assert_eq!(container.lines().len(), 2);
        assert_eq!(container.total_quantity(), 25);
        assert!(
            container
                .lines()
                .iter()
                .all(|l| l.status == ReceivingStatus::Pending)
        );
    }

    #[test]
    fn duplicate_part_is_rejected() {
        let id = ContainerId::new();
        let err = ReceivingContainer::empty(id)
            .handle(&ReceivingCommand::RegisterContainer(RegisterContainer {
                container_id: id,
                container_no: "CNT-002".into(),
                lines: vec![line("A1", 1), line("A1", 2)],
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let container = registered(vec![line("A1", 1)]);
        let err = container
            .handle(&ReceivingCommand::AddPart(AddPart {
                container_id: container.id_typed(),
                line: line("B2", 0),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn confirm_completes_lines_and_yields_inbound_movements() {
        let mut container = registered(vec![line("A1", 20)]);
        let events = container.handle(&confirm_cmd(&container, 10)).unwrap();
        let movements = apply_with_effects(&mut container, &events);

        assert_eq!(container.status(), ReceivingStatus::Completed);
        assert!(
            container
                .lines()
                .iter()
                .all(|l| l.status == ReceivingStatus::Completed)
        );
        assert_eq!(movements.len(), 1);
        let m = &movements[0];
        assert_eq!(m.kind, TransactionType::Inbound);
        assert_eq!(m.change, StockChange::Increment(20));
        assert_eq!(m.date, NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
        assert_eq!(m.reference, container.id_typed().to_string());
    }

    #[test]
    fn confirming_twice_is_a_no_op() {
        let mut container = registered(vec![line("A1", 20)]);
        let events = container.handle(&confirm_cmd(&container, 10)).unwrap();
        apply_with_effects(&mut container, &events);

        let again = container.handle(&confirm_cmd(&container, 11)).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn completed_container_cannot_be_deleted_or_edited() {
        let mut container = registered(vec![line("A1", 20)]);
        let events = container.handle(&confirm_cmd(&container, 10)).unwrap();
        apply_with_effects(&mut container, &events);

        let err = container
            .handle(&ReceivingCommand::DeleteContainer(DeleteContainer {
                container_id: container.id_typed(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let line_id = container.lines()[0].line_id;
        let err = container
            .handle(&ReceivingCommand::ChangeQuantity(ChangeQuantity {
                container_id: container.id_typed(),
                line_id,
                quantity: 3,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn deleting_pending_container_has_no_stock_effect() {
        let mut container = registered(vec![line("A1", 20)]);
        let events = container
            .handle(&ReceivingCommand::DeleteContainer(DeleteContainer {
                container_id: container.id_typed(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        let movements = apply_with_effects(&mut container, &events);

        assert!(movements.is_empty());
        assert!(container.is_deleted());
        let err = container.handle(&confirm_cmd(&container, 10)).unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn edits_while_pending_change_lines() {
        let mut container = registered(vec![line("A1", 20)]);
        let line_id = container.lines()[0].line_id;

        let events = container
            .handle(&ReceivingCommand::ChangeQuantity(ChangeQuantity {
                container_id: container.id_typed(),
                line_id,
                quantity: 12,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        container.apply(&events[0]);
        assert_eq!(container.lines()[0].quantity, 12);

        let events = container
            .handle(&ReceivingCommand::RemovePart(RemovePart {
                container_id: container.id_typed(),
                line_id,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        container.apply(&events[0]);
        assert!(container.lines().is_empty());

        let err = container.handle(&confirm_cmd(&container, 10)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn unknown_container_is_not_found() {
        let id = ContainerId::new();
        let err = ReceivingContainer::empty(id)
            .handle(&ReceivingCommand::ConfirmArrival(ConfirmArrival {
                container_id: id,
                arrival_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }
}
