//! Physical count sessions.
//!
//! Edits typed into the count sheet are staged in a per-session buffer held
//! by the service and only reach the ledger on explicit save or on
//! completion. The buffer is process-local; losing it loses unsaved typing,
//! never ledger data.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info, warn};

use stockledger_core::{BusinessDate, CountItemId, PartNumber, SessionId};
use stockledger_counting::{
    AddItem, CompleteSession, CountCommand, CountItemView, CountSession, ItemEdit, ItemStatus,
    OpenSession, PendingEdit, PendingEdits, SaveItem, SessionStatus,
};

use crate::catalog::{PartCatalog, require_part};
use crate::store::{DocumentHead, LedgerStore};

use super::document::LedgerDocument;
use super::error::WorkflowError;
use super::runner::{WorkflowOutcome, WorkflowRunner};

/// A session together with what its sheet should show.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub session: CountSession,
    pub items: Vec<CountItemView>,
    pub pending: usize,
}

pub struct CountService<S> {
    runner: Arc<WorkflowRunner<S>>,
    catalog: Arc<dyn PartCatalog>,
    pending: Mutex<HashMap<SessionId, PendingEdits>>,
}

impl<S: LedgerStore> CountService<S> {
    pub fn new(runner: Arc<WorkflowRunner<S>>, catalog: Arc<dyn PartCatalog>) -> Self {
        Self {
            runner,
            catalog,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub async fn open(&self, count_date: BusinessDate, label: &str) -> Result<CountSession, WorkflowError> {
        let session_id = SessionId::new();
        let outcome = self
            .execute(
                session_id,
                CountCommand::OpenSession(OpenSession {
                    session_id,
                    count_date,
                    label: label.to_string(),
                    occurred_at: Utc::now(),
                }),
            )
            .await?;
        info!(session_id = %session_id, %count_date, "count session opened");
        Ok(outcome.document)
    }

    /// Add a part, snapshotting its current stock as the system figure.
    pub async fn add_item(
        &self,
        session_id: SessionId,
        part_number: PartNumber,
        physical_stock: i64,
        notes: Option<String>,
    ) -> Result<CountSession, WorkflowError> {
        require_part(self.catalog.as_ref(), &part_number)?;
        let system_stock = self
            .runner
            .stock_records(std::slice::from_ref(&part_number))
            .await?
            .first()
            .map(|r| r.current_stock)
            .unwrap_or(0);

        let outcome = self
            .execute(
                session_id,
                CountCommand::AddItem(AddItem {
                    session_id,
                    item_id: CountItemId::new(),
                    part_number,
                    system_stock,
                    physical_stock,
                    notes,
                    occurred_at: Utc::now(),
                }),
            )
            .await?;
        Ok(outcome.document)
    }

    /// Persist one item's edit and drop whatever was staged for it.
    pub async fn save_item(&self, session_id: SessionId, edit: ItemEdit) -> Result<CountSession, WorkflowError> {
        let item_id = edit.item_id;
        let outcome = self
            .execute(
                session_id,
                CountCommand::SaveItem(SaveItem {
                    session_id,
                    edit,
                    occurred_at: Utc::now(),
                }),
            )
            .await?;

        let mut buffers = self.buffers()?;
        if let Some(edits) = buffers.get_mut(&session_id) {
            edits.discard(&item_id);
            if edits.is_empty() {
                buffers.remove(&session_id);
            }
        }
        Ok(outcome.document)
    }

    /// Buffer an edit without touching the ledger. Later edits to the same
    /// field replace earlier ones.
    pub async fn stage_edit(
        &self,
        session_id: SessionId,
        item_id: CountItemId,
        edit: PendingEdit,
    ) -> Result<PendingEdits, WorkflowError> {
        let session = self.get(session_id).await?;
        if session.status() != SessionStatus::Active {
            return Err(WorkflowError::Invariant(
                "cannot edit a completed session".to_string(),
            ));
        }
        let item = session
            .items()
            .iter()
            .find(|i| i.item_id == item_id)
            .ok_or_else(|| WorkflowError::NotFound(format!("count item {item_id}")))?;
        if item.status != ItemStatus::Pending {
            return Err(WorkflowError::Invariant(format!(
                "count item {item_id} is already completed"
            )));
        }

        let mut buffers = self.buffers()?;
        let edits = buffers.entry(session_id).or_default();
        edits.stage(item_id, edit)?;
        debug!(session_id = %session_id, item_id = %item_id, staged = edits.len(), "count edit staged");
        Ok(edits.clone())
    }

    pub fn pending_edits(&self, session_id: SessionId) -> Result<PendingEdits, WorkflowError> {
        Ok(self.buffers()?.get(&session_id).cloned().unwrap_or_default())
    }

    pub async fn view(&self, session_id: SessionId) -> Result<SessionView, WorkflowError> {
        let session = self.get(session_id).await?;
        let pending = self.pending_edits(session_id)?;
        Ok(SessionView {
            items: session.view(&pending),
            pending: pending.len(),
            session,
        })
    }

    /// Apply staged edits and overwrite stock for every differing item.
    ///
    /// Only the edits that went into the commit are cleared, and only once it
    /// has landed.
    pub async fn complete(&self, session_id: SessionId) -> Result<WorkflowOutcome<CountSession>, WorkflowError> {
        let consumed = self.pending_edits(session_id)?;
        let outcome = self
            .execute(
                session_id,
                CountCommand::CompleteSession(CompleteSession {
                    session_id,
                    edits: consumed.to_item_edits(),
                    occurred_at: Utc::now(),
                }),
            )
            .await?;
        self.release_consumed(session_id, &consumed, outcome.changed())?;

        if outcome.changed() {
            info!(
                session_id = %session_id,
                corrections = outcome.transactions.len(),
                "count session completed"
            );
        }
        Ok(outcome)
    }

    pub async fn get(&self, session_id: SessionId) -> Result<CountSession, WorkflowError> {
        let session: CountSession = self.runner.load(*session_id.as_uuid()).await?;
        if !session.is_live() {
            return Err(WorkflowError::NotFound(format!("session {session_id}")));
        }
        Ok(session)
    }

    pub async fn list(&self) -> Result<Vec<DocumentHead>, WorkflowError> {
        Ok(self
            .runner
            .call(self.runner.store().document_heads(CountSession::STREAM_TYPE))
            .await?)
    }

    /// Edits staged while the completion was in flight were never applied;
    /// they stay visible until the session is completed again.
    fn release_consumed(
        &self,
        session_id: SessionId,
        consumed: &PendingEdits,
        completed_now: bool,
    ) -> Result<(), WorkflowError> {
        let mut buffers = self.buffers()?;
        let Some(edits) = buffers.get_mut(&session_id) else {
            return Ok(());
        };
        let left = if completed_now {
            edits.forget_consumed(consumed)
        } else {
            0
        };
        if left == 0 {
            buffers.remove(&session_id);
        } else {
            warn!(session_id = %session_id, unapplied = left, "count edits staged during completion were not applied");
        }
        Ok(())
    }

    fn buffers(&self) -> Result<MutexGuard<'_, HashMap<SessionId, PendingEdits>>, WorkflowError> {
        self.pending
            .lock()
            .map_err(|_| WorkflowError::Store("pending edit buffer poisoned".to_string()))
    }

    async fn execute(
        &self,
        session_id: SessionId,
        command: CountCommand,
    ) -> Result<WorkflowOutcome<CountSession>, WorkflowError> {
        self.runner
            .execute::<CountSession>(*session_id.as_uuid(), command)
            .await
    }
}
