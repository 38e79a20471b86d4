//! # Optimistic Mutation Coordinator
//!
//! Applies structure ops locally before the store confirms them.
//!
//! 1. Save the current snapshot
//! 2. Compute and install the new snapshot (validation errors stop here with
//!    nothing touched)
//! 3. Diff old against new and write the rows: deletes and updates together,
//!    then inserts parents-first
//! 4. Any failed write rolls the op back in full, locally and in the store;
//!    success swaps temporary ids for the store's durable ones
//!
//! Locks are never held across an `.await`, so further ops may start while
//! writes are outstanding. A rollback takes back only the rows its own op
//! changed, so edits installed by other ops in the meantime survive it. If
//! those edits touched the same sibling list and the result would break the
//! tree invariant, the op's saved snapshot is restored wholesale instead.
//!
//! Writes the store already accepted when a later one fails are compensated:
//! inserted rows are deleted, deleted subtrees re-inserted under their ids and
//! updated columns sent back with their saved values.

use crate::errors::EditorResult;
use crate::persistence::{insert_fields, PersistResult, PersistenceAdapter, PersistenceError};
use futures::future::join_all;
use manuscript_tree::{Fields, IdGenerator, Node, NodeId, RowChange, Snapshot, StructureOp};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Outcome of a confirmed op.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// Durable id of the node an insert created
    pub inserted: Option<NodeId>,
    /// Number of row writes issued
    pub writes: usize,
    /// Temporary ids the store replaced, as (temporary, durable)
    pub remapped: Vec<(NodeId, NodeId)>,
}

pub struct Coordinator {
    snapshot: RwLock<Snapshot>,
    ids: Mutex<IdGenerator>,
    store: Arc<dyn PersistenceAdapter>,
    write_timeout: Option<Duration>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn PersistenceAdapter>, snapshot: Snapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
            ids: Mutex::new(IdGenerator::default()),
            store,
            write_timeout: None,
        }
    }

    pub fn with_id_seed(self, seed: impl Into<String>) -> Self {
        Self {
            ids: Mutex::new(IdGenerator::new(seed)),
            ..self
        }
    }

    pub fn with_write_timeout(self, write_timeout: Option<Duration>) -> Self {
        Self {
            write_timeout,
            ..self
        }
    }

    /// Copy of the current local snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.read().clone()
    }

    /// Run `f` against the current snapshot without cloning it.
    pub fn with_snapshot<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        f(&self.read())
    }

    /// Swap in another document wholesale.
    pub fn replace(&self, snapshot: Snapshot) {
        *self.write() = snapshot;
    }

    pub fn store(&self) -> &Arc<dyn PersistenceAdapter> {
        &self.store
    }

    #[tracing::instrument(skip(self, op), fields(op = op.name()))]
    pub async fn apply(&self, op: StructureOp) -> EditorResult<Applied> {
        let (saved, next, inserted) = {
            let mut current = self.write();
            let mutated = op.apply(&current, &mut self.id_generator())?;
            let saved = std::mem::replace(&mut *current, mutated.snapshot.clone());
            (saved, mutated.snapshot, mutated.inserted)
        };

        let changes = saved.diff(&next);
        tracing::debug!(writes = changes.len(), "installed snapshot, issuing writes");

        let remapped = match self.persist(&changes).await {
            Ok(remapped) => remapped,
            Err(failed) => {
                tracing::warn!(
                    error = %failed.error,
                    landed = failed.landed.len(),
                    inserted = failed.inserted.len(),
                    "write failed, rolling back"
                );
                self.roll_back(&saved, &changes);
                self.compensate(&saved, &changes, &failed).await;
                return Err(failed.error.into());
            }
        };

        if !remapped.is_empty() {
            let mut current = self.write();
            for (temporary, durable) in &remapped {
                current.rename(temporary, durable);
            }
        }

        let inserted = inserted.map(|id| {
            remapped
                .iter()
                .find(|(temporary, _)| *temporary == id)
                .map_or(id, |(_, durable)| durable.clone())
        });

        Ok(Applied {
            inserted,
            writes: changes.len(),
            remapped,
        })
    }

    async fn persist(&self, changes: &[RowChange]) -> Result<Vec<(NodeId, NodeId)>, Failed> {
        let mut immediate = Vec::new();
        let mut batch = Vec::new();
        let mut inserts = Vec::new();
        for (index, change) in changes.iter().enumerate() {
            match change {
                RowChange::Insert { node } => inserts.push(node),
                RowChange::Delete { id, .. } => {
                    batch.push(index);
                    immediate.push(self.bounded(self.store.delete_row(change.table(), id)))
                }
                RowChange::Update { id, fields, .. } => {
                    batch.push(index);
                    immediate.push(self.bounded(self.store.update_row(change.table(), id, fields)))
                }
            }
        }

        tracing::debug!(
            batch = immediate.len(),
            inserts = inserts.len(),
            "awaiting delete/update batch"
        );
        let mut landed = Vec::new();
        let mut error = None;
        for (index, result) in batch.into_iter().zip(join_all(immediate).await) {
            match result {
                Ok(()) => landed.push(index),
                Err(err) => {
                    error.get_or_insert(err);
                }
            }
        }
        if let Some(error) = error {
            return Err(Failed {
                error,
                landed,
                inserted: Vec::new(),
            });
        }

        let mut durable: HashMap<NodeId, NodeId> = HashMap::new();
        let mut inserted = Vec::new();
        let mut remapped = Vec::new();
        for node in inserts {
            let mut fields = insert_fields(node);
            if let Some(parent) = node.parent_id.as_ref().and_then(|p| durable.get(p)) {
                fields.insert("parent_id".to_string(), Value::String(parent.to_string()));
            }

            let table = node.kind.table();
            let id = match self.bounded(self.store.insert_row(table, &fields)).await {
                Ok(id) => id,
                Err(error) => {
                    return Err(Failed {
                        error,
                        landed,
                        inserted,
                    })
                }
            };
            inserted.push((table, id.clone()));
            if id != node.id {
                durable.insert(node.id.clone(), id.clone());
                remapped.push((node.id.clone(), id));
            }
        }

        Ok(remapped)
    }

    /// Take back a failed op's changes in the local snapshot.
    fn roll_back(&self, saved: &Snapshot, changes: &[RowChange]) {
        let mut current = self.write();
        *current = match current.revert(saved, changes) {
            Ok(reverted) => reverted,
            Err(err) => {
                tracing::warn!(error = %err, "rollback conflicts with later edits, restoring saved snapshot");
                saved.clone()
            }
        };
    }

    /// Undo the writes of a failed op that the store did accept.
    async fn compensate(&self, saved: &Snapshot, changes: &[RowChange], failed: &Failed) {
        // Children were inserted after their parents; delete them first.
        for (table, id) in failed.inserted.iter().rev() {
            self.compensation(self.store.delete_row(table, id), id).await;
        }

        for change in failed.landed.iter().filter_map(|i| changes.get(*i)) {
            match change {
                RowChange::Delete { id, .. } => {
                    let Some(subtree) = saved.subtree(id) else {
                        continue;
                    };
                    for node in subtree.nodes() {
                        let fields = insert_fields(node);
                        let write = self.store.insert_row(node.kind.table(), &fields);
                        self.compensation(write, &node.id).await;
                    }
                }
                RowChange::Update { id, fields, .. } => {
                    let Some(old) = saved.get(id) else {
                        continue;
                    };
                    let columns = saved_columns(old, fields);
                    let write = self.store.update_row(change.table(), id, &columns);
                    self.compensation(write, id).await;
                }
                RowChange::Insert { .. } => {}
            }
        }
    }

    async fn compensation<T>(&self, write: impl Future<Output = PersistResult<T>>, id: &NodeId) {
        if let Err(err) = self.bounded(write).await {
            tracing::warn!(error = %err, id = %id, "compensating write failed, store left diverged");
        }
    }

    async fn bounded<T>(&self, write: impl Future<Output = PersistResult<T>>) -> PersistResult<T> {
        match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .unwrap_or_else(|_| Err(PersistenceError::Timeout(limit.as_millis() as u64))),
            None => write.await,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.snapshot.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn id_generator(&self) -> MutexGuard<'_, IdGenerator> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// How far a failed op got before the store refused a write.
struct Failed {
    error: PersistenceError,
    /// Indices of the deletes and updates the store accepted
    landed: Vec<usize>,
    /// Rows inserted before the failure, as (table, durable id)
    inserted: Vec<(&'static str, NodeId)>,
}

/// The `saved` values of the columns an update overwrote.
fn saved_columns(old: &Node, written: &Fields) -> Fields {
    written
        .keys()
        .map(|name| {
            let value = match name.as_str() {
                "parent_id" => old
                    .parent_id
                    .as_ref()
                    .map_or(Value::Null, |id| Value::String(id.to_string())),
                "order" => Value::from(old.order),
                _ => old.field(name),
            };
            (name.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EditorError;
    use crate::memory::MemoryStore;
    use manuscript_tree::{Fields, MutationError, Node, NodeKind};
    use serde_json::json;

    fn doc() -> Snapshot {
        Snapshot::from_nodes(vec![
            Node::new("c1", NodeKind::Container, None, 1),
            Node::new("s1", NodeKind::Section, Some("c1".into()), 1),
        ])
        .unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, Coordinator) {
        let snapshot = doc();
        let store = Arc::new(MemoryStore::seeded(&snapshot));
        let coordinator = Coordinator::new(store.clone(), snapshot);
        (store, coordinator)
    }

    #[tokio::test]
    async fn test_insert_swaps_in_durable_id() {
        let (store, coordinator) = setup();
        let applied = coordinator
            .apply(StructureOp::Insert {
                parent_id: Some("s1".into()),
                kind: NodeKind::Unit,
                fields: Fields::new(),
                at_index: None,
            })
            .await
            .unwrap();

        let durable = applied.inserted.clone().unwrap();
        assert_eq!(durable.as_str(), "row-1");
        assert_eq!(
            applied.remapped,
            vec![(NodeId::from("tmp-local-1"), durable.clone())]
        );
        assert!(coordinator.snapshot().contains(&durable));
        assert_eq!(store.to_snapshot().unwrap(), coordinator.snapshot());
    }

    #[tokio::test]
    async fn test_validation_error_touches_nothing() {
        let (store, coordinator) = setup();
        let before = coordinator.snapshot();

        let err = coordinator
            .apply(StructureOp::Remove {
                node_id: "ghost".into(),
            })
            .await
            .unwrap_err();

        assert_eq!(err, EditorError::Mutation(MutationError::NodeNotFound("ghost".into())));
        assert_eq!(coordinator.snapshot(), before);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_restores_snapshot() {
        let (store, coordinator) = setup();
        let before = coordinator.snapshot();
        store.fail_all_writes(true);

        let result = coordinator
            .apply(StructureOp::SetField {
                node_id: "s1".into(),
                field: "title".into(),
                value: json!("Part One"),
            })
            .await;

        assert!(matches!(result, Err(EditorError::Persistence(_))));
        assert_eq!(coordinator.snapshot(), before);
    }

    #[tokio::test]
    async fn test_write_timeout_rolls_back() {
        let (store, coordinator) = setup();
        let coordinator = coordinator.with_write_timeout(Some(Duration::from_millis(10)));
        store.set_latency(Some(Duration::from_millis(500)));
        let before = coordinator.snapshot();

        let err = coordinator
            .apply(StructureOp::SetField {
                node_id: "s1".into(),
                field: "title".into(),
                value: json!("Slow"),
            })
            .await
            .unwrap_err();

        assert_eq!(err, EditorError::Persistence(PersistenceError::Timeout(10)));
        assert_eq!(coordinator.snapshot(), before);
    }

    #[tokio::test]
    async fn test_snapshot_installed_before_write_confirms() {
        let (store, coordinator) = setup();
        store.hold_writes();

        let apply = coordinator.apply(StructureOp::SetField {
            node_id: "s1".into(),
            field: "title".into(),
            value: json!("Fast"),
        });
        let observe = async {
            while store.pending_writes() == 0 {
                tokio::task::yield_now().await;
            }
            let title = coordinator.with_snapshot(|s| s.get(&"s1".into()).map(|n| n.field("title")));
            store.resume_writes();
            title
        };

        let (applied, title) = tokio::join!(apply, observe);
        assert!(applied.is_ok());
        assert_eq!(title, Some(json!("Fast")));
    }
}
