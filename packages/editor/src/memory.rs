//! # In-Memory Store
//!
//! Reference [`PersistenceAdapter`] that keeps one JSON table per node kind.
//! Used by the CLI and the test-suite; it can fail chosen writes, add latency
//! and hold writes in flight so optimistic behaviour can be observed.

use crate::persistence::{insert_fields, PersistResult, PersistenceAdapter, PersistenceError};
use async_trait::async_trait;
use manuscript_tree::{Fields, MutationResult, Node, NodeId, NodeKind, Snapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    Insert,
    Update,
    Delete,
}

/// One attempted write, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRecord {
    pub kind: WriteKind,
    pub table: String,
    pub id: Option<NodeId>,
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    tables: BTreeMap<String, BTreeMap<NodeId, Fields>>,
    log: Vec<WriteRecord>,
    next_row: u64,
    attempts: u64,
    fail_at: BTreeSet<u64>,
    fail_all: bool,
    latency: Option<Duration>,
}

pub struct MemoryStore {
    state: Mutex<StoreState>,
    hold: watch::Sender<bool>,
    waiting: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (hold, _) = watch::channel(false);
        Self {
            state: Mutex::new(StoreState::default()),
            hold,
            waiting: AtomicUsize::new(0),
        }
    }

    /// Store pre-populated with every node of `snapshot`.
    pub fn seeded(snapshot: &Snapshot) -> Self {
        let store = Self::new();
        store.seed(snapshot);
        store
    }

    pub fn seed(&self, snapshot: &Snapshot) {
        let mut state = self.lock();
        for node in snapshot.nodes() {
            let mut fields = insert_fields(node);
            fields.remove("id");
            state
                .tables
                .entry(node.kind.table().to_string())
                .or_default()
                .insert(node.id.clone(), fields);
        }
    }

    /// Fail the `n`-th write from now (1-based).
    pub fn fail_write(&self, n: u64) {
        let mut state = self.lock();
        let at = state.attempts + n;
        state.fail_at.insert(at);
    }

    pub fn fail_all_writes(&self, fail: bool) {
        self.lock().fail_all = fail;
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Park every write until [`MemoryStore::resume_writes`] is called.
    pub fn hold_writes(&self) {
        self.hold.send_replace(true);
    }

    pub fn resume_writes(&self) {
        self.hold.send_replace(false);
    }

    /// Writes currently parked by [`MemoryStore::hold_writes`].
    pub fn pending_writes(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().log.clone()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    pub fn row(&self, table: &str, id: &NodeId) -> Option<Fields> {
        self.lock().tables.get(table)?.get(id).cloned()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, BTreeMap::len)
    }

    /// Rebuild a snapshot from the stored rows.
    pub fn to_snapshot(&self) -> MutationResult<Snapshot> {
        let state = self.lock();
        let mut nodes = Vec::new();
        for kind in NodeKind::ALL {
            let Some(rows) = state.tables.get(kind.table()) else {
                continue;
            };
            for (id, row) in rows {
                let mut fields = row.clone();
                let parent_id = match fields.remove("parent_id") {
                    Some(Value::String(parent)) => Some(NodeId::from(parent)),
                    _ => None,
                };
                let order = fields
                    .remove("order")
                    .and_then(|v| v.as_u64())
                    .unwrap_or_default() as u32;
                let mut node = Node::new(id.clone(), kind, parent_id, order);
                node.fields = fields;
                nodes.push(node);
            }
        }
        drop(state);
        Snapshot::from_nodes(nodes)
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number the write, wait out latency and holds, then decide its fate.
    async fn admit(&self) -> PersistResult<()> {
        let (attempt, fail, latency) = {
            let mut state = self.lock();
            state.attempts += 1;
            let attempt = state.attempts;
            let fail = state.fail_all || state.fail_at.remove(&attempt);
            (attempt, fail, state.latency)
        };

        if *self.hold.borrow() {
            let mut rx = self.hold.subscribe();
            self.waiting.fetch_add(1, Ordering::SeqCst);
            let _ = rx.wait_for(|held| !*held).await;
            self.waiting.fetch_sub(1, Ordering::SeqCst);
        }
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if fail {
            return Err(PersistenceError::Unavailable(format!(
                "write #{attempt} failed"
            )));
        }
        Ok(())
    }

    fn record(&self, kind: WriteKind, table: &str, id: Option<NodeId>, succeeded: bool) {
        self.lock().log.push(WriteRecord {
            kind,
            table: table.to_string(),
            id,
            succeeded,
        });
    }
}

fn row_exists(state: &StoreState, id: &NodeId) -> bool {
    state.tables.values().any(|rows| rows.contains_key(id))
}

fn requested_id(fields: &Fields) -> Option<NodeId> {
    fields.get("id").and_then(Value::as_str).map(NodeId::from)
}

#[async_trait]
impl PersistenceAdapter for MemoryStore {
    async fn insert_row(&self, table: &str, fields: &Fields) -> PersistResult<NodeId> {
        if let Err(err) = self.admit().await {
            self.record(WriteKind::Insert, table, requested_id(fields), false);
            return Err(err);
        }

        let result = {
            let mut state = self.lock();
            let mut row = fields.clone();
            row.remove("id");

            let parent = row.get("parent_id").and_then(Value::as_str).map(NodeId::from);
            match (requested_id(fields), parent) {
                (Some(id), _) if row_exists(&state, &id) => Err(PersistenceError::rejected(
                    table,
                    format!("duplicate id {id}"),
                )),
                (_, Some(parent)) if !row_exists(&state, &parent) => Err(
                    PersistenceError::rejected(table, format!("unknown parent {parent}")),
                ),
                (requested, _) => {
                    let id = requested.unwrap_or_else(|| {
                        state.next_row += 1;
                        NodeId::new(format!("row-{}", state.next_row))
                    });
                    state
                        .tables
                        .entry(table.to_string())
                        .or_default()
                        .insert(id.clone(), row);
                    Ok(id)
                }
            }
        };

        let id = result.as_ref().ok().cloned().or_else(|| requested_id(fields));
        self.record(WriteKind::Insert, table, id, result.is_ok());
        result
    }

    async fn update_row(&self, table: &str, id: &NodeId, fields: &Fields) -> PersistResult<()> {
        if let Err(err) = self.admit().await {
            self.record(WriteKind::Update, table, Some(id.clone()), false);
            return Err(err);
        }

        let result = {
            let mut state = self.lock();
            match state.tables.get_mut(table).and_then(|rows| rows.get_mut(id)) {
                Some(row) => {
                    for (name, value) in fields {
                        if value.is_null() && name != "parent_id" {
                            row.remove(name);
                        } else {
                            row.insert(name.clone(), value.clone());
                        }
                    }
                    Ok(())
                }
                None => Err(PersistenceError::NotFound {
                    table: table.to_string(),
                    id: id.clone(),
                }),
            }
        };

        self.record(WriteKind::Update, table, Some(id.clone()), result.is_ok());
        result
    }

    async fn delete_row(&self, table: &str, id: &NodeId) -> PersistResult<()> {
        if let Err(err) = self.admit().await {
            self.record(WriteKind::Delete, table, Some(id.clone()), false);
            return Err(err);
        }

        let result = {
            let mut state = self.lock();
            let removed = state
                .tables
                .get_mut(table)
                .and_then(|rows| rows.remove(id))
                .is_some();
            if removed {
                cascade(&mut state, id);
                Ok(())
            } else {
                Err(PersistenceError::NotFound {
                    table: table.to_string(),
                    id: id.clone(),
                })
            }
        };

        self.record(WriteKind::Delete, table, Some(id.clone()), result.is_ok());
        result
    }
}

/// Remove every row that descends from `root`.
fn cascade(state: &mut StoreState, root: &NodeId) {
    let mut doomed = vec![root.clone()];
    while let Some(parent) = doomed.pop() {
        for rows in state.tables.values_mut() {
            let children: Vec<NodeId> = rows
                .iter()
                .filter(|(_, row)| row.get("parent_id").and_then(Value::as_str) == Some(parent.as_str()))
                .map(|(id, _)| id.clone())
                .collect();
            for child in children {
                rows.remove(&child);
                doomed.push(child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Snapshot {
        Snapshot::from_nodes(vec![
            Node::new("c1", NodeKind::Container, None, 1),
            Node::new("s1", NodeKind::Section, Some("c1".into()), 1),
            Node::new("u1", NodeKind::Unit, Some("s1".into()), 1).with_field("title", "One"),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_seed_roundtrips_snapshot() {
        let snapshot = doc();
        let store = MemoryStore::seeded(&snapshot);
        assert_eq!(store.to_snapshot().unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_insert_assigns_sequential_ids() {
        let store = MemoryStore::seeded(&doc());
        let mut fields = Fields::new();
        fields.insert("parent_id".into(), json!("s1"));
        fields.insert("order".into(), json!(2));

        let first = store.insert_row("units", &fields).await.unwrap();
        fields.insert("order".into(), json!(3));
        let second = store.insert_row("units", &fields).await.unwrap();

        assert_eq!(first.as_str(), "row-1");
        assert_eq!(second.as_str(), "row-2");
        assert_eq!(store.row_count("units"), 3);
    }

    #[tokio::test]
    async fn test_insert_honours_requested_id_and_rejects_duplicates() {
        let store = MemoryStore::seeded(&doc());
        let mut fields = Fields::new();
        fields.insert("id".into(), json!("u1"));
        fields.insert("parent_id".into(), json!("s1"));

        let err = store.insert_row("units", &fields).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Rejected { .. }));

        fields.insert("id".into(), json!("n42"));
        let id = store.insert_row("units", &fields).await.unwrap();
        assert_eq!(id.as_str(), "n42");
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let store = MemoryStore::seeded(&doc());
        store.delete_row("sections", &"s1".into()).await.unwrap();

        assert_eq!(store.row_count("sections"), 0);
        assert_eq!(store.row_count("units"), 0);
        assert_eq!(store.row_count("containers"), 1);
    }

    #[tokio::test]
    async fn test_fail_write_is_relative_and_logged() {
        let store = MemoryStore::seeded(&doc());
        store.fail_write(2);
        let mut fields = Fields::new();
        fields.insert("title".into(), json!("Two"));

        assert!(store.update_row("units", &"u1".into(), &fields).await.is_ok());
        assert!(store.update_row("units", &"u1".into(), &fields).await.is_err());
        assert!(store.update_row("units", &"u1".into(), &fields).await.is_ok());

        let outcomes: Vec<bool> = store.writes().iter().map(|w| w.succeeded).collect();
        assert_eq!(outcomes, vec![true, false, true]);
    }

    #[tokio::test]
    async fn test_held_writes_wait_for_resume() {
        let store = MemoryStore::seeded(&doc());
        store.hold_writes();
        let mut fields = Fields::new();
        fields.insert("title".into(), json!("Held"));

        let id: NodeId = "u1".into();
        let write = store.update_row("units", &id, &fields);
        let release = async {
            while store.pending_writes() == 0 {
                tokio::task::yield_now().await;
            }
            assert_eq!(
                store.row("units", &"u1".into()).unwrap().get("title"),
                Some(&json!("One"))
            );
            store.resume_writes();
        };
        let (result, _) = tokio::join!(write, release);

        assert!(result.is_ok());
        assert_eq!(
            store.row("units", &"u1".into()).unwrap().get("title"),
            Some(&json!("Held"))
        );
    }
}
