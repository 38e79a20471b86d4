//! # Editor
//!
//! The one object a host UI talks to. It owns the coordinator, the history
//! and the open text-edit sessions, and turns each user intent into at most
//! one recorded [`Action`].
//!
//! Actions are recorded only after the store confirms the write, so history
//! never holds a forward effect that did not persist. Undo and redo are
//! single-flight: a second call while one is running returns
//! [`HistoryOutcome::Busy`] and does nothing.

use crate::actions::{Action, Position};
use crate::config::EditorConfig;
use crate::coordinator::{Applied, Coordinator};
use crate::drag::DropIntent;
use crate::errors::{EditorError, EditorResult};
use crate::hooks::{EditorHooks, NoopHooks, Notification};
use crate::persistence::PersistenceAdapter;
use crate::text_edit::TextEditSessions;
use crate::undo_stack::History;
use manuscript_tree::{Fields, MutationError, NodeId, NodeKind, Snapshot, StructureOp};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What an undo or redo call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOutcome {
    /// An action was reverted or re-applied; carries its description.
    Applied(String),
    /// Nothing to undo or redo.
    Empty,
    /// Another undo/redo is still in flight; this call was dropped.
    Busy,
}

pub struct Editor {
    coordinator: Coordinator,
    history: Mutex<History>,
    text_edits: Mutex<TextEditSessions>,
    busy: AtomicBool,
    hooks: Arc<dyn EditorHooks>,
    config: EditorConfig,
}

impl Editor {
    pub fn new(store: Arc<dyn PersistenceAdapter>, snapshot: Snapshot) -> Self {
        Self::with_config(store, snapshot, EditorConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn PersistenceAdapter>,
        snapshot: Snapshot,
        config: EditorConfig,
    ) -> Self {
        let coordinator = Coordinator::new(store, snapshot)
            .with_id_seed(config.temp_id_seed.clone())
            .with_write_timeout(config.write_timeout());

        Self {
            coordinator,
            history: Mutex::new(History::with_max_levels(config.history_limit)),
            text_edits: Mutex::new(TextEditSessions::new()),
            busy: AtomicBool::new(false),
            hooks: Arc::new(NoopHooks),
            config,
        }
    }

    pub fn with_hooks(self, hooks: Arc<dyn EditorHooks>) -> Self {
        Self { hooks, ..self }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn snapshot(&self) -> Snapshot {
        self.coordinator.snapshot()
    }

    // ---- recordable edits -------------------------------------------------

    /// Create a node; returns its durable id.
    pub async fn insert(
        &self,
        parent_id: Option<NodeId>,
        kind: NodeKind,
        fields: Fields,
        at_index: Option<usize>,
    ) -> EditorResult<NodeId> {
        let op = StructureOp::Insert {
            parent_id,
            kind,
            fields,
            at_index,
        };
        let applied = self.run(op).await?;
        let id = applied.inserted.ok_or_else(|| {
            EditorError::from(MutationError::integrity("insert created no node"))
        })?;

        if let Some(subtree) = self.coordinator.with_snapshot(|s| s.subtree(&id)) {
            self.record(Action::insert(subtree));
        }
        Ok(id)
    }

    /// Delete a node and everything below it.
    pub async fn delete(&self, node_id: &NodeId) -> EditorResult<()> {
        let subtree = self.coordinator.with_snapshot(|s| s.subtree(node_id));
        self.run(StructureOp::Remove {
            node_id: node_id.clone(),
        })
        .await?;

        if let Some(subtree) = subtree {
            self.record(Action::delete(subtree));
        }
        Ok(())
    }

    /// Set one content field, recording the change. Unchanged values write nothing.
    pub async fn update_field(&self, node_id: &NodeId, field: &str, value: Value) -> EditorResult<()> {
        let (kind, old_value) = self.field_value(node_id, field)?;
        if old_value == value {
            return Ok(());
        }

        self.run(StructureOp::SetField {
            node_id: node_id.clone(),
            field: field.to_string(),
            value: value.clone(),
        })
        .await?;

        self.record(Action::field_update(
            kind,
            node_id.clone(),
            field,
            old_value,
            value,
        ));
        Ok(())
    }

    pub async fn reorder(
        &self,
        parent_id: Option<NodeId>,
        ordered_child_ids: Vec<NodeId>,
    ) -> EditorResult<()> {
        let before = self.coordinator.with_snapshot(|s| s.child_ids(parent_id.as_ref()));
        if before == ordered_child_ids {
            return Ok(());
        }

        self.run(StructureOp::Reorder {
            parent_id: parent_id.clone(),
            ordered_child_ids: ordered_child_ids.clone(),
        })
        .await?;

        self.record(Action::reorder(parent_id, before, ordered_child_ids));
        Ok(())
    }

    /// Move a node under `new_parent_id`; `None` appends it at the end.
    pub async fn move_node(
        &self,
        node_id: &NodeId,
        new_parent_id: &NodeId,
        at_index: Option<usize>,
    ) -> EditorResult<()> {
        let from = self.coordinator.with_snapshot(|s| {
            let node = s.get(node_id)?;
            let position = Position {
                parent_id: node.parent_id.clone()?,
                index: s.index_of(node_id)?,
            };
            Some((node.kind, position))
        });

        self.run(StructureOp::Move {
            node_id: node_id.clone(),
            new_parent_id: new_parent_id.clone(),
            at_index,
        })
        .await?;

        let to = self.coordinator.with_snapshot(|s| s.index_of(node_id));
        if let (Some((kind, from)), Some(index)) = (from, to) {
            let to = Position {
                parent_id: new_parent_id.clone(),
                index,
            };
            if from != to {
                self.record(Action::move_node(kind, node_id.clone(), from, to));
            }
        }
        Ok(())
    }

    /// Carry out a finished drag. `None` (an invalid drop) issues nothing and
    /// returns false.
    pub async fn apply_drop(&self, intent: Option<DropIntent>) -> EditorResult<bool> {
        match intent {
            None => Ok(false),
            Some(DropIntent::Reorder {
                parent_id,
                ordered_child_ids,
            }) => {
                self.reorder(parent_id, ordered_child_ids).await?;
                Ok(true)
            }
            Some(DropIntent::Move {
                node_id,
                new_parent_id,
                at_index,
            }) => {
                self.move_node(&node_id, &new_parent_id, at_index).await?;
                Ok(true)
            }
        }
    }

    // ---- text editing -----------------------------------------------------

    /// Open a text-edit session with the field's current value as baseline.
    /// Returns false when one was already open.
    pub fn begin_text_edit(&self, node_id: &NodeId, field: &str) -> EditorResult<bool> {
        let (_, baseline) = self.field_value(node_id, field)?;
        Ok(self.text_edits().start(node_id, field, baseline))
    }

    /// Persist an intermediate value without recording it.
    pub async fn type_text(&self, node_id: &NodeId, field: &str, value: Value) -> EditorResult<()> {
        let (_, current) = self.field_value(node_id, field)?;
        if current == value {
            return Ok(());
        }
        self.run(StructureOp::SetField {
            node_id: node_id.clone(),
            field: field.to_string(),
            value,
        })
        .await
        .map(|_| ())
    }

    /// Close the session, persisting `final_value` first. Returns true when a
    /// field update was recorded.
    pub async fn end_text_edit(
        &self,
        node_id: &NodeId,
        field: &str,
        final_value: Value,
    ) -> EditorResult<bool> {
        let (kind, current) = match self.field_value(node_id, field) {
            Ok(found) => found,
            Err(err) => {
                self.text_edits().discard(node_id, field);
                return Err(err);
            }
        };
        let action = self
            .text_edits()
            .end(node_id, field, final_value.clone(), kind);

        if current != final_value {
            self.run(StructureOp::SetField {
                node_id: node_id.clone(),
                field: field.to_string(),
                value: final_value,
            })
            .await?;
        }

        match action {
            Some(action) => {
                self.record(action);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn is_text_edit_open(&self, node_id: &NodeId, field: &str) -> bool {
        self.text_edits().is_open(node_id, field)
    }

    // ---- history ----------------------------------------------------------

    pub async fn undo(&self) -> EditorResult<HistoryOutcome> {
        let Some(_flight) = BusyGuard::acquire(&self.busy) else {
            tracing::debug!("undo dropped, history busy");
            return Ok(HistoryOutcome::Busy);
        };
        let next = self.history().peek_undo().cloned();
        let Some(action) = next else {
            return Ok(HistoryOutcome::Empty);
        };

        let inverse = self.coordinator.with_snapshot(|s| action.inverse_against(s));
        match self.coordinator.apply(inverse.operation()).await {
            Ok(applied) => {
                self.history().complete_undo(&action, inverse);
                self.follow_remaps(&applied);
                tracing::info!(action = %action.description, "undo applied");
                self.succeed(format!("Undo: {}", action.description));
                Ok(HistoryOutcome::Applied(action.description))
            }
            Err(err) => {
                self.notify(Notification::error(format!("Undo failed: {err}")));
                Err(err)
            }
        }
    }

    pub async fn redo(&self) -> EditorResult<HistoryOutcome> {
        let Some(_flight) = BusyGuard::acquire(&self.busy) else {
            tracing::debug!("redo dropped, history busy");
            return Ok(HistoryOutcome::Busy);
        };
        let next = self.history().peek_redo().cloned();
        let Some(action) = next else {
            return Ok(HistoryOutcome::Empty);
        };

        let forward = self.coordinator.with_snapshot(|s| action.inverse_against(s));
        match self.coordinator.apply(forward.operation()).await {
            Ok(applied) => {
                self.history().complete_redo(&action, forward);
                self.follow_remaps(&applied);
                tracing::info!(action = %action.description, "redo applied");
                self.succeed(format!("Redo: {}", action.description));
                Ok(HistoryOutcome::Applied(action.description))
            }
            Err(err) => {
                self.notify(Notification::error(format!("Redo failed: {err}")));
                Err(err)
            }
        }
    }

    /// Empty both stacks and drop open text-edit sessions.
    pub fn clear_history(&self) {
        self.history().clear();
        self.text_edits().discard_all();
    }

    /// Switch documents. History never carries over.
    pub fn load_document(&self, snapshot: Snapshot) {
        self.coordinator.replace(snapshot);
        self.clear_history();
        tracing::debug!("document loaded, history cleared");
    }

    pub fn can_undo(&self) -> bool {
        self.history().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history().can_redo()
    }

    pub fn undo_levels(&self) -> usize {
        self.history().undo_levels()
    }

    pub fn redo_levels(&self) -> usize {
        self.history().redo_levels()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.history().undo_description().map(str::to_string)
    }

    pub fn redo_description(&self) -> Option<String> {
        self.history().redo_description().map(str::to_string)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    // ---- internals --------------------------------------------------------

    /// Apply through the coordinator, keeping ids in history current and
    /// reporting failures.
    async fn run(&self, op: StructureOp) -> EditorResult<Applied> {
        match self.coordinator.apply(op).await {
            Ok(applied) => {
                self.follow_remaps(&applied);
                Ok(applied)
            }
            Err(err) => {
                self.notify(Notification::error(err.to_string()));
                Err(err)
            }
        }
    }

    fn record(&self, action: Action) {
        tracing::debug!(action = %action.description, "recorded");
        self.history().record(action);
    }

    fn follow_remaps(&self, applied: &Applied) {
        if applied.remapped.is_empty() {
            return;
        }
        let mut history = self.history();
        let mut text_edits = self.text_edits();
        for (temporary, durable) in &applied.remapped {
            history.remap_id(temporary, durable);
            text_edits.remap_id(temporary, durable);
        }
    }

    fn field_value(&self, node_id: &NodeId, field: &str) -> EditorResult<(NodeKind, Value)> {
        let found = self
            .coordinator
            .with_snapshot(|s| s.get(node_id).map(|n| (n.kind, n.field(field))));
        found.ok_or_else(|| {
            let err = EditorError::from(MutationError::NodeNotFound(node_id.clone()));
            self.notify(Notification::error(err.to_string()));
            err
        })
    }

    fn succeed(&self, message: String) {
        self.notify(Notification::success(message));
        self.hooks.on_refresh();
    }

    fn notify(&self, notification: Notification) {
        self.hooks.on_notification(&notification);
    }

    fn history(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn text_edits(&self) -> MutexGuard<'_, TextEditSessions> {
        self.text_edits.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds the single-flight flag for the duration of one undo/redo.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
