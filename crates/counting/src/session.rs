use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    Aggregate, AggregateRoot, BusinessDate, CountItemId, DomainError, Entity, PartNumber,
    SessionId, find_entity,
};
use stockledger_events::Event;
use stockledger_inventory::{Movement, StockEffects};

use crate::pending::{ItemEdit, PendingEdits};

/// Session status lifecycle: ACTIVE → COMPLETED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Completed,
}

/// Stored item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Pending,
    Completed,
}

/// Status shown for an item. MATCHED and DIFFERENCE classify a still-pending
/// item by its current difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplayStatus {
    Matched,
    Difference,
    Completed,
}

impl DisplayStatus {
    pub fn classify(status: ItemStatus, difference: i64) -> Self {
        match status {
            ItemStatus::Completed => DisplayStatus::Completed,
            ItemStatus::Pending if difference == 0 => DisplayStatus::Matched,
            ItemStatus::Pending => DisplayStatus::Difference,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountItem {
    pub item_id: CountItemId,
    pub part_number: PartNumber,
    /// Stock on record when the item was added to the session.
    pub system_stock: i64,
    pub physical_stock: i64,
    pub notes: Option<String>,
    pub status: ItemStatus,
}

impl CountItem {
    pub fn difference(&self) -> i64 {
        self.physical_stock - self.system_stock
    }

    pub fn display_status(&self) -> DisplayStatus {
        DisplayStatus::classify(self.status, self.difference())
    }

    fn with_edit(&self, edit: &ItemEdit) -> CountItem {
        let mut item = self.clone();
        if let Some(value) = edit.physical_stock {
            item.physical_stock = value;
        }
        if let Some(notes) = &edit.notes {
            item.notes = normalize_notes(notes);
        }
        item
    }
}

impl Entity for CountItem {
    type Id = CountItemId;

    fn id(&self) -> &Self::Id {
        &self.item_id
    }
}

/// An item as shown to the counter: stored values reconciled with any
/// buffered edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountItemView {
    pub item_id: CountItemId,
    pub part_number: PartNumber,
    pub system_stock: i64,
    pub physical_stock: i64,
    pub difference: i64,
    pub notes: Option<String>,
    pub status: DisplayStatus,
    pub has_pending_edit: bool,
}

/// Aggregate root: CountSession.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountSession {
    id: SessionId,
    count_date: Option<BusinessDate>,
    label: String,
    status: SessionStatus,
    items: Vec<CountItem>,
    version: u64,
    created: bool,
}

impl CountSession {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SessionId) -> Self {
        Self {
            id,
            count_date: None,
            label: String::new(),
            status: SessionStatus::Active,
            items: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SessionId {
        self.id
    }

    pub fn count_date(&self) -> Option<BusinessDate> {
        self.count_date
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn items(&self) -> &[CountItem] {
        &self.items
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn item_for_part(&self, part_number: &PartNumber) -> Option<&CountItem> {
        self.items.iter().find(|i| &i.part_number == part_number)
    }

    /// Stock movement reference: the session id.
    pub fn reference(&self) -> String {
        self.id.to_string()
    }

    /// Items as they should be displayed right now.
    pub fn view(&self, pending: &PendingEdits) -> Vec<CountItemView> {
        self.items
            .iter()
            .map(|stored| {
                let edit = pending.get(&stored.item_id).filter(|_| {
                    self.status == SessionStatus::Active && stored.status == ItemStatus::Pending
                });
                let item = match edit {
                    Some(edit) => stored.with_edit(&ItemEdit {
                        item_id: stored.item_id,
                        physical_stock: edit.physical_stock,
                        notes: edit.notes.clone(),
                    }),
                    None => stored.clone(),
                };
                CountItemView {
                    item_id: item.item_id,
                    part_number: item.part_number.clone(),
                    system_stock: item.system_stock,
                    physical_stock: item.physical_stock,
                    difference: item.difference(),
                    notes: item.notes.clone(),
                    status: item.display_status(),
                    has_pending_edit: edit.is_some(),
                }
            })
            .collect()
    }
}

impl AggregateRoot for CountSession {
    type Id = SessionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenSession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSession {
    pub session_id: SessionId,
    pub count_date: BusinessDate,
    pub label: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddItem.
///
/// `system_stock` is the stock table value read when the item is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItem {
    pub session_id: SessionId,
    pub item_id: CountItemId,
    pub part_number: PartNumber,
    pub system_stock: i64,
    pub physical_stock: i64,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SaveItem (persist a stored value while ACTIVE).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveItem {
    pub session_id: SessionId,
    pub edit: ItemEdit,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteSession.
///
/// `edits` are the buffered edits still outstanding; they take precedence over
/// stored values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteSession {
    pub session_id: SessionId,
    pub edits: Vec<ItemEdit>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountCommand {
    OpenSession(OpenSession),
    AddItem(AddItem),
    SaveItem(SaveItem),
    CompleteSession(CompleteSession),
}

/// Event: SessionOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOpened {
    pub session_id: SessionId,
    pub count_date: BusinessDate,
    pub label: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAdded {
    pub session_id: SessionId,
    pub item: CountItem,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemSaved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSaved {
    pub session_id: SessionId,
    pub item_id: CountItemId,
    pub physical_stock: i64,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SessionCompleted.
///
/// `items` hold the final values that were applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCompleted {
    pub session_id: SessionId,
    pub count_date: BusinessDate,
    pub items: Vec<CountItem>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountEvent {
    SessionOpened(SessionOpened),
    ItemAdded(ItemAdded),
    ItemSaved(ItemSaved),
    SessionCompleted(SessionCompleted),
}

impl Event for CountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CountEvent::SessionOpened(_) => "counting.session.opened",
            CountEvent::ItemAdded(_) => "counting.session.item_added",
            CountEvent::ItemSaved(_) => "counting.session.item_saved",
            CountEvent::SessionCompleted(_) => "counting.session.completed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CountEvent::SessionOpened(e) => e.occurred_at,
            CountEvent::ItemAdded(e) => e.occurred_at,
            CountEvent::ItemSaved(e) => e.occurred_at,
            CountEvent::SessionCompleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CountSession {
    type Command = CountCommand;
    type Event = CountEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CountEvent::SessionOpened(e) => {
                self.id = e.session_id;
                self.count_date = Some(e.count_date);
                self.label = e.label.clone();
                self.status = SessionStatus::Active;
                self.items.clear();
                self.created = true;
            }
            CountEvent::ItemAdded(e) => {
                self.items.push(e.item.clone());
            }
            CountEvent::ItemSaved(e) => {
                if let Some(item) = self.items.iter_mut().find(|i| i.item_id == e.item_id) {
                    item.physical_stock = e.physical_stock;
                    item.notes = e.notes.clone();
                }
            }
            CountEvent::SessionCompleted(e) => {
                self.items = e.items.clone();
                self.status = SessionStatus::Completed;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CountCommand::OpenSession(cmd) => self.handle_open(cmd),
            CountCommand::AddItem(cmd) => self.handle_add_item(cmd),
            CountCommand::SaveItem(cmd) => self.handle_save_item(cmd),
            CountCommand::CompleteSession(cmd) => self.handle_complete(cmd),
        }
    }
}

impl StockEffects for CountSession {
    /// Items whose count differs from the snapshot overwrite stock; the
    /// logged quantity is settled against live stock when posted.
    fn stock_effects(&self, event: &Self::Event) -> Vec<Movement> {
        match event {
            CountEvent::SessionCompleted(e) => e
                .items
                .iter()
                .filter(|item| item.difference() != 0)
                .map(|item| {
                    Movement::physical_count(
                        format!("count:{}:{}", self.id, item.item_id),
                        item.part_number.clone(),
                        item.physical_stock,
                        e.count_date,
                        self.reference(),
                        item.notes.clone(),
                    )
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn normalize_notes(notes: &str) -> Option<String> {
    let trimmed = notes.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn ensure_non_negative(value: i64) -> Result<(), DomainError> {
    if value < 0 {
        return Err(DomainError::validation("physical stock cannot be negative"));
    }
    Ok(())
}

impl CountSession {
    fn ensure_session_id(&self, session_id: SessionId) -> Result<(), DomainError> {
        if self.id != session_id {
            return Err(DomainError::invariant("session_id mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self, session_id: SessionId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("session {session_id}")));
        }
        self.ensure_session_id(session_id)
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if self.status != SessionStatus::Active {
            return Err(DomainError::invariant(
                "items of a completed session are immutable",
            ));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenSession) -> Result<Vec<CountEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("session already exists"));
        }

        Ok(vec![CountEvent::SessionOpened(SessionOpened {
            session_id: cmd.session_id,
            count_date: cmd.count_date,
            label: cmd.label.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_item(&self, cmd: &AddItem) -> Result<Vec<CountEvent>, DomainError> {
        self.ensure_exists(cmd.session_id)?;
        self.ensure_active()?;
        ensure_non_negative(cmd.physical_stock)?;
        if self.item_for_part(&cmd.part_number).is_some() {
            return Err(DomainError::validation(format!(
                "part {} is already counted in this session",
                cmd.part_number
            )));
        }

        Ok(vec![CountEvent::ItemAdded(ItemAdded {
            session_id: cmd.session_id,
            item: CountItem {
                item_id: cmd.item_id,
                part_number: cmd.part_number.clone(),
                system_stock: cmd.system_stock,
                physical_stock: cmd.physical_stock,
                notes: cmd.notes.as_deref().and_then(normalize_notes),
                status: ItemStatus::Pending,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_save_item(&self, cmd: &SaveItem) -> Result<Vec<CountEvent>, DomainError> {
        self.ensure_exists(cmd.session_id)?;
        self.ensure_active()?;
        if let Some(value) = cmd.edit.physical_stock {
            ensure_non_negative(value)?;
        }
        let stored = find_entity(&self.items, &cmd.edit.item_id, "count item")?;
        let updated = stored.with_edit(&cmd.edit);
        if updated == *stored {
            return Ok(Vec::new());
        }

        Ok(vec![CountEvent::ItemSaved(ItemSaved {
            session_id: cmd.session_id,
            item_id: updated.item_id,
            physical_stock: updated.physical_stock,
            notes: updated.notes,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteSession) -> Result<Vec<CountEvent>, DomainError> {
        self.ensure_exists(cmd.session_id)?;

        // Already applied; the caller just discards its buffer.
        if self.status == SessionStatus::Completed {
            return Ok(Vec::new());
        }

        let count_date = self
            .count_date
            .ok_or_else(|| DomainError::invariant("session has no count date"))?;

        for edit in &cmd.edits {
            find_entity(&self.items, &edit.item_id, "count item")?;
            if let Some(value) = edit.physical_stock {
                ensure_non_negative(value)?;
            }
        }

        let items = self
            .items
            .iter()
            .map(|stored| {
                let mut item = cmd
                    .edits
                    .iter()
                    .filter(|e| e.item_id == stored.item_id)
                    .fold(stored.clone(), |item, edit| item.with_edit(edit));
                item.status = ItemStatus::Completed;
                item
            })
            .collect();

        Ok(vec![CountEvent::SessionCompleted(SessionCompleted {
            session_id: cmd.session_id,
            count_date,
            items,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pending::PendingEdit;
    use chrono::NaiveDate;
    use stockledger_inventory::{StockChange, TransactionType, apply_with_effects};

    fn part(s: &str) -> PartNumber {
        PartNumber::parse(s).unwrap()
    }

    fn opened() -> CountSession {
        let id = SessionId::new();
        let mut session = CountSession::empty(id);
        let events = session
            .handle(&CountCommand::OpenSession(OpenSession {
                session_id: id,
                count_date: NaiveDate::from_ymd_opt(2024, 1, 12).unwrap(),
                label: "January count".into(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        session.apply(&events[0]);
        session
    }

    fn add(session: &mut CountSession, p: &str, system: i64, physical: i64) -> CountItemId {
        let item_id = CountItemId::new();
        let events = session
            .handle(&CountCommand::AddItem(AddItem {
                session_id: session.id_typed(),
                item_id,
                part_number: part(p),
                system_stock: system,
                physical_stock: physical,
                notes: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        session.apply(&events[0]);
        item_id
    }

    fn complete(session: &mut CountSession, edits: Vec<ItemEdit>) -> Vec<Movement> {
        let events = session
            .handle(&CountCommand::CompleteSession(CompleteSession {
                session_id: session.id_typed(),
                edits,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        apply_with_effects(session, &events)
    }

    #[test]
    fn display_status_follows_difference() {
        let mut session = opened();
        add(&mut session, "A1", 12, 12);
        add(&mut session, "B2", 5, 3);

        let view = session.view(&PendingEdits::new());
        assert_eq!(view[0].status, DisplayStatus::Matched);
        assert_eq!(view[1].status, DisplayStatus::Difference);
        assert_eq!(view[1].difference, -2);
    }

    #[test]
    fn part_cannot_be_added_twice() {
        let mut session = opened();
        add(&mut session, "A1", 12, 12);
        let err = session
            .handle(&CountCommand::AddItem(AddItem {
                session_id: session.id_typed(),
                item_id: CountItemId::new(),
                part_number: part("A1"),
                system_stock: 12,
                physical_stock: 11,
                notes: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn pending_edits_show_in_view() {
        let mut session = opened();
        let item = add(&mut session, "A1", 100, 100);

        let mut pending = PendingEdits::new();
        pending
            .stage(
                item,
                PendingEdit {
                    physical_stock: Some(97),
                    notes: None,
                },
            )
            .unwrap();

        let view = session.view(&pending);
        assert_eq!(view[0].physical_stock, 97);
        assert!(view[0].has_pending_edit);
        assert_eq!(session.items()[0].physical_stock, 100);
    }

    #[test]
    fn completion_uses_latest_edit() {
        let mut session = opened();
        let item = add(&mut session, "A1", 100, 100);

        let mut pending = PendingEdits::new();
        for value in [97, 95] {
            pending
                .stage(
                    item,
                    PendingEdit {
                        physical_stock: Some(value),
                        notes: None,
                    },
                )
                .unwrap();
        }

        let movements = complete(&mut session, pending.to_item_edits());
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.items()[0].physical_stock, 95);
        assert_eq!(session.items()[0].status, ItemStatus::Completed);
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].kind, TransactionType::PhysicalInventory);
        assert_eq!(movements[0].change, StockChange::Overwrite(95));
    }

    #[test]
    fn matched_items_do_not_move_stock() {
        let mut session = opened();
        add(&mut session, "A1", 12, 12);
        add(&mut session, "B2", 5, 3);

        let movements = complete(&mut session, Vec::new());
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].part_number, part("B2"));
        assert!(
            session
                .view(&PendingEdits::new())
                .iter()
                .all(|v| v.status == DisplayStatus::Completed)
        );
    }

    #[test]
    fn edit_for_unknown_item_fails_closed() {
        let mut session = opened();
        add(&mut session, "A1", 12, 10);
        let err = session
            .handle(&CountCommand::CompleteSession(CompleteSession {
                session_id: session.id_typed(),
                edits: vec![ItemEdit {
                    item_id: CountItemId::new(),
                    physical_stock: Some(1),
                    notes: None,
                }],
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
        assert_eq!(session.status(), SessionStatus::Active);
    }

    #[test]
    fn completed_session_is_immutable() {
        let mut session = opened();
        let item = add(&mut session, "A1", 12, 10);
        complete(&mut session, Vec::new());

        assert!(complete(&mut session, Vec::new()).is_empty());
        let err = session
            .handle(&CountCommand::SaveItem(SaveItem {
                session_id: session.id_typed(),
                edit: ItemEdit {
                    item_id: item,
                    physical_stock: Some(1),
                    notes: None,
                },
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn save_item_updates_stored_values() {
        let mut session = opened();
        let item = add(&mut session, "A1", 12, 10);
        let events = session
            .handle(&CountCommand::SaveItem(SaveItem {
                session_id: session.id_typed(),
                edit: ItemEdit {
                    item_id: item,
                    physical_stock: Some(11),
                    notes: Some(" damaged box ".into()),
                },
                occurred_at: Utc::now(),
            }))
            .unwrap();
        session.apply(&events[0]);

        assert_eq!(session.items()[0].physical_stock, 11);
        assert_eq!(session.items()[0].notes.as_deref(), Some("damaged box"));
    }
}
