//! # Tree Snapshot
//!
//! The editor's full in-memory copy of the node graph, keyed by id.
//!
//! ## Invariant
//!
//! - every non-root node's parent resolves inside the same snapshot and has
//!   the kind its child kind expects
//! - only containers sit at the document root
//! - the `order` values of any parent's children are exactly `{1..n}`
//!
//! Snapshots are plain values: cloning one is how the coordinator keeps a
//! rollback point, and two snapshots compare equal iff they hold the same
//! nodes.

use crate::error::{MutationError, MutationResult};
use crate::node::{Fields, Node, NodeId, NodeKind, Subtree};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    nodes: BTreeMap<NodeId, Node>,
}

/// One row-level write needed to carry a snapshot change to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum RowChange {
    Insert { node: Node },
    Update { kind: NodeKind, id: NodeId, fields: Fields },
    Delete { kind: NodeKind, id: NodeId },
}

impl RowChange {
    pub fn table(&self) -> &'static str {
        match self {
            RowChange::Insert { node } => node.kind.table(),
            RowChange::Update { kind, .. } | RowChange::Delete { kind, .. } => kind.table(),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        match self {
            RowChange::Insert { node } => &node.id,
            RowChange::Update { id, .. } | RowChange::Delete { id, .. } => id,
        }
    }
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from loose nodes, rejecting anything that breaks the invariant.
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> MutationResult<Self> {
        let mut snapshot = Self::new();
        for node in nodes {
            if snapshot.nodes.contains_key(&node.id) {
                return Err(MutationError::DuplicateId(node.id));
            }
            snapshot.nodes.insert(node.id.clone(), node);
        }
        snapshot.check_integrity()?;
        Ok(snapshot)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes.into_values().collect()
    }

    /// Children of `parent_id` (`None` = document root) sorted by `order`.
    pub fn children(&self, parent_id: Option<&NodeId>) -> Vec<&Node> {
        let mut children: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| n.parent_id.as_ref() == parent_id)
            .collect();
        children.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        children
    }

    pub fn child_ids(&self, parent_id: Option<&NodeId>) -> Vec<NodeId> {
        self.children(parent_id)
            .into_iter()
            .map(|n| n.id.clone())
            .collect()
    }

    /// 0-based position of a node among its siblings.
    pub fn index_of(&self, id: &NodeId) -> Option<usize> {
        let node = self.nodes.get(id)?;
        self.children(node.parent_id.as_ref())
            .iter()
            .position(|n| &n.id == id)
    }

    /// Ids of every descendant of `id`, breadth first, siblings in order.
    pub fn descendant_ids(&self, id: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([id.clone()]);
        while let Some(current) = queue.pop_front() {
            for child in self.children(Some(&current)) {
                out.push(child.id.clone());
                queue.push_back(child.id.clone());
            }
        }
        out
    }

    /// Deep copy of a node and everything below it.
    pub fn subtree(&self, id: &NodeId) -> Option<Subtree> {
        let root = self.nodes.get(id)?.clone();
        let descendants = self
            .descendant_ids(id)
            .iter()
            .filter_map(|d| self.nodes.get(d).cloned())
            .collect();
        Some(Subtree { root, descendants })
    }

    pub fn check_integrity(&self) -> MutationResult<()> {
        let mut siblings: BTreeMap<Option<&NodeId>, Vec<u32>> = BTreeMap::new();

        for node in self.nodes.values() {
            match (node.kind.parent_kind(), node.parent_id.as_ref()) {
                (None, None) => {}
                (None, Some(parent_id)) => {
                    return Err(MutationError::integrity(format!(
                        "{} {} must sit at the document root, found under {}",
                        node.kind, node.id, parent_id
                    )));
                }
                (Some(_), None) => {
                    return Err(MutationError::integrity(format!(
                        "{} {} has no parent",
                        node.kind, node.id
                    )));
                }
                (Some(expected), Some(parent_id)) => {
                    let parent = self.nodes.get(parent_id).ok_or_else(|| {
                        MutationError::integrity(format!(
                            "{} {} points at missing parent {}",
                            node.kind, node.id, parent_id
                        ))
                    })?;
                    if parent.kind != expected {
                        return Err(MutationError::integrity(format!(
                            "{} {} sits under {} {}",
                            node.kind, node.id, parent.kind, parent.id
                        )));
                    }
                }
            }
            siblings
                .entry(node.parent_id.as_ref())
                .or_default()
                .push(node.order);
        }

        for (parent_id, mut orders) in siblings {
            orders.sort_unstable();
            let contiguous = orders
                .iter()
                .enumerate()
                .all(|(i, order)| *order as usize == i + 1);
            if !contiguous {
                return Err(MutationError::integrity(format!(
                    "children of {} have orders {:?}",
                    parent_id.map_or("the document root", |id| id.as_str()),
                    orders
                )));
            }
        }

        Ok(())
    }

    /// Row writes that turn `self` into `next`.
    ///
    /// Deletes come first and name only the roots of removed subtrees, since
    /// the store cascades. Inserts follow parents-first, then column updates.
    pub fn diff(&self, next: &Snapshot) -> Vec<RowChange> {
        let mut deletes = Vec::new();
        let mut inserts = Vec::new();
        let mut updates = Vec::new();

        for (id, old) in &self.nodes {
            if next.nodes.contains_key(id) {
                continue;
            }
            let parent_survives = old
                .parent_id
                .as_ref()
                .map_or(true, |parent_id| next.nodes.contains_key(parent_id));
            if parent_survives {
                deletes.push(old);
            }
        }

        for (id, new) in &next.nodes {
            match self.nodes.get(id) {
                None => inserts.push(new),
                Some(old) => {
                    let fields = changed_columns(old, new);
                    if !fields.is_empty() {
                        updates.push((new, fields));
                    }
                }
            }
        }

        deletes.sort_by_key(|n| (n.kind.depth(), n.id.clone()));
        inserts.sort_by_key(|n| (n.kind.depth(), n.parent_id.clone(), n.order));
        updates.sort_by_key(|(n, _)| (n.kind.depth(), n.parent_id.clone(), n.order));

        deletes
            .into_iter()
            .map(|n| RowChange::Delete {
                kind: n.kind,
                id: n.id.clone(),
            })
            .chain(inserts.into_iter().map(|n| RowChange::Insert { node: n.clone() }))
            .chain(updates.into_iter().map(|(n, fields)| RowChange::Update {
                kind: n.kind,
                id: n.id.clone(),
                fields,
            }))
            .collect()
    }

    /// Take back `changes` (as produced by `saved.diff(..)`) on top of `self`.
    ///
    /// Rows the changes touched get their `saved` values again; every other
    /// node keeps its current state. Fails when the result breaks the tree
    /// invariant, e.g. after a conflicting structural edit to the same parent.
    pub fn revert(&self, saved: &Snapshot, changes: &[RowChange]) -> MutationResult<Snapshot> {
        let mut next = self.clone();
        for change in changes {
            match change {
                RowChange::Insert { node } => {
                    next.take_subtree(&node.id);
                }
                RowChange::Delete { id, .. } => {
                    if let Some(subtree) = saved.subtree(id) {
                        for node in subtree.nodes() {
                            next.put(node.clone());
                        }
                    }
                }
                RowChange::Update { id, fields, .. } => {
                    let (Some(old), Some(node)) = (saved.get(id), next.nodes.get_mut(id)) else {
                        continue;
                    };
                    for name in fields.keys() {
                        match name.as_str() {
                            "parent_id" => node.parent_id = old.parent_id.clone(),
                            "order" => node.order = old.order,
                            _ => match old.fields.get(name) {
                                Some(value) => {
                                    node.fields.insert(name.clone(), value.clone());
                                }
                                None => {
                                    node.fields.remove(name);
                                }
                            },
                        }
                    }
                }
            }
        }
        next.check_integrity()?;
        Ok(next)
    }

    /// Replace an id everywhere it appears. Returns false when `from` is unknown.
    pub fn rename(&mut self, from: &NodeId, to: &NodeId) -> bool {
        let Some(mut node) = self.nodes.remove(from) else {
            return false;
        };
        node.id = to.clone();
        self.nodes.insert(to.clone(), node);

        for node in self.nodes.values_mut() {
            if node.parent_id.as_ref() == Some(from) {
                node.parent_id = Some(to.clone());
            }
        }
        true
    }

    pub(crate) fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub(crate) fn put(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Remove a node and its whole subtree, returning the removed root.
    pub(crate) fn take_subtree(&mut self, id: &NodeId) -> Option<Node> {
        for descendant in self.descendant_ids(id) {
            self.nodes.remove(&descendant);
        }
        self.nodes.remove(id)
    }

    /// Assign `order = position + 1` following `ordered`.
    pub(crate) fn assign_orders(&mut self, ordered: &[NodeId]) {
        for (position, id) in ordered.iter().enumerate() {
            if let Some(node) = self.nodes.get_mut(id) {
                node.order = position as u32 + 1;
            }
        }
    }

    /// Close any gaps left among the children of `parent_id`.
    pub(crate) fn compact(&mut self, parent_id: Option<&NodeId>) {
        let ordered = self.child_ids(parent_id);
        self.assign_orders(&ordered);
    }
}

fn changed_columns(old: &Node, new: &Node) -> Fields {
    let mut fields = Fields::new();

    if old.parent_id != new.parent_id {
        let parent = new
            .parent_id
            .as_ref()
            .map_or(Value::Null, |id| Value::String(id.to_string()));
        fields.insert("parent_id".to_string(), parent);
    }
    if old.order != new.order {
        fields.insert("order".to_string(), Value::from(new.order));
    }

    let names: BTreeSet<&String> = old.fields.keys().chain(new.fields.keys()).collect();
    for name in names {
        let before = old.fields.get(name.as_str());
        let after = new.fields.get(name.as_str());
        if before != after {
            fields.insert(name.clone(), after.cloned().unwrap_or(Value::Null));
        }
    }

    fields
}
