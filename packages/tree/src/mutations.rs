//! # Structure Mutations
//!
//! Pure operations that turn one [`Snapshot`] into the next.
//!
//! ## Semantics
//!
//! ### Insert
//! - New node gets a temporary id from the [`IdGenerator`]
//! - `at_index` is clamped to the child count; `None` appends
//!
//! ### Remove
//! - Removes the node and all descendants
//! - Remaining siblings are renumbered
//!
//! ### Reorder
//! - The id list must be exactly the current child set, otherwise the caller
//!   worked against an outdated tree and the op is rejected
//!
//! ### Move
//! - Remove-then-insert that keeps the node's id and its whole subtree
//! - Containers never move
//!
//! ### Restore
//! - Re-inserts a removed subtree under its original ids
//!
//! Every op validates first; the input snapshot is never modified.

use crate::error::{MutationError, MutationResult};
use crate::id_generator::IdGenerator;
use crate::node::{Fields, Node, NodeId, NodeKind, Subtree, RESERVED_FIELDS};
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// One structural operation on the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StructureOp {
    /// Create a node under `parent_id` (`None` = document root)
    Insert {
        #[serde(default)]
        parent_id: Option<NodeId>,
        kind: NodeKind,
        #[serde(default)]
        fields: Fields,
        #[serde(default)]
        at_index: Option<usize>,
    },

    /// Put back a previously removed subtree, original ids included
    Restore { subtree: Subtree },

    /// Delete a node and everything under it
    Remove { node_id: NodeId },

    /// Rewrite the sibling order of one parent
    Reorder {
        #[serde(default)]
        parent_id: Option<NodeId>,
        ordered_child_ids: Vec<NodeId>,
    },

    /// Relocate a node (and its subtree) to a new parent
    Move {
        node_id: NodeId,
        new_parent_id: NodeId,
        #[serde(default)]
        at_index: Option<usize>,
    },

    /// Replace one content field; `null` removes it
    SetField {
        node_id: NodeId,
        field: String,
        value: Value,
    },
}

/// Result of applying a [`StructureOp`].
#[derive(Debug, Clone, PartialEq)]
pub struct Mutated {
    pub snapshot: Snapshot,
    /// Temporary id minted by an insert.
    pub inserted: Option<NodeId>,
}

impl StructureOp {
    pub fn name(&self) -> &'static str {
        match self {
            StructureOp::Insert { .. } => "insert",
            StructureOp::Restore { .. } => "restore",
            StructureOp::Remove { .. } => "remove",
            StructureOp::Reorder { .. } => "reorder",
            StructureOp::Move { .. } => "move",
            StructureOp::SetField { .. } => "set_field",
        }
    }

    /// Check the op against `snapshot` without computing anything.
    pub fn validate(&self, snapshot: &Snapshot) -> MutationResult<()> {
        match self {
            StructureOp::Insert {
                parent_id,
                kind,
                fields,
                ..
            } => {
                check_placement(snapshot, *kind, parent_id.as_ref())?;
                if let Some(name) = fields.keys().find(|k| is_reserved(k)) {
                    return Err(MutationError::ReservedField(name.clone()));
                }
                Ok(())
            }

            StructureOp::Restore { subtree } => {
                check_placement(snapshot, subtree.kind(), subtree.parent_id())?;
                let mut seen = HashSet::new();
                for node in subtree.nodes() {
                    if snapshot.contains(&node.id) || !seen.insert(&node.id) {
                        return Err(MutationError::DuplicateId(node.id.clone()));
                    }
                }
                let kinds: HashMap<&NodeId, NodeKind> =
                    subtree.nodes().map(|n| (&n.id, n.kind)).collect();
                for node in &subtree.descendants {
                    let Some(parent_kind) = node.parent_id.as_ref().and_then(|p| kinds.get(p))
                    else {
                        return Err(MutationError::integrity(format!(
                            "{} {} is detached from the restored subtree",
                            node.kind, node.id
                        )));
                    };
                    if node.kind.parent_kind() != Some(*parent_kind) {
                        return Err(MutationError::invalid_parent(node.kind, Some(*parent_kind)));
                    }
                }
                Ok(())
            }

            StructureOp::Remove { node_id } => {
                lookup(snapshot, node_id)?;
                Ok(())
            }

            StructureOp::Reorder {
                parent_id,
                ordered_child_ids,
            } => {
                if let Some(parent_id) = parent_id {
                    if !snapshot.contains(parent_id) {
                        return Err(MutationError::ParentNotFound(parent_id.clone()));
                    }
                }
                let current = snapshot.child_ids(parent_id.as_ref());
                let current_set: HashSet<&NodeId> = current.iter().collect();
                let requested_set: HashSet<&NodeId> = ordered_child_ids.iter().collect();
                let exact = ordered_child_ids.len() == current.len()
                    && requested_set.len() == ordered_child_ids.len()
                    && requested_set == current_set;
                if !exact {
                    return Err(MutationError::StaleChildren {
                        parent_id: parent_id.clone(),
                        expected: current.len(),
                        found: ordered_child_ids.len(),
                    });
                }
                Ok(())
            }

            StructureOp::Move {
                node_id,
                new_parent_id,
                ..
            } => {
                let node = lookup(snapshot, node_id)?;
                check_placement(snapshot, node.kind, Some(new_parent_id))
            }

            StructureOp::SetField {
                node_id, field, ..
            } => {
                lookup(snapshot, node_id)?;
                if is_reserved(field) {
                    return Err(MutationError::ReservedField(field.clone()));
                }
                Ok(())
            }
        }
    }

    /// Validate, then compute the snapshot that results from this op.
    pub fn apply(&self, snapshot: &Snapshot, ids: &mut IdGenerator) -> MutationResult<Mutated> {
        self.validate(snapshot)?;

        let mut next = snapshot.clone();
        let mut inserted = None;

        match self {
            StructureOp::Insert {
                parent_id,
                kind,
                fields,
                at_index,
            } => {
                let id = ids.new_id();
                let mut siblings = next.child_ids(parent_id.as_ref());
                let index = at_index.unwrap_or(siblings.len()).min(siblings.len());
                siblings.insert(index, id.clone());

                let mut node = Node::new(id.clone(), *kind, parent_id.clone(), 0);
                node.fields = fields.clone();
                next.put(node);
                next.assign_orders(&siblings);
                inserted = Some(id);
            }

            StructureOp::Restore { subtree } => {
                let mut siblings = next.child_ids(subtree.parent_id());
                let wanted = (subtree.root.order as usize).saturating_sub(1);
                let index = wanted.min(siblings.len());
                siblings.insert(index, subtree.node_id().clone());

                for node in subtree.nodes() {
                    next.put(node.clone());
                }
                next.assign_orders(&siblings);
                // Descendant orders come from the subtree as given.
                next.check_integrity()?;
            }

            StructureOp::Remove { node_id } => {
                if let Some(removed) = next.take_subtree(node_id) {
                    next.compact(removed.parent_id.as_ref());
                }
            }

            StructureOp::Reorder {
                ordered_child_ids, ..
            } => {
                next.assign_orders(ordered_child_ids);
            }

            StructureOp::Move {
                node_id,
                new_parent_id,
                at_index,
            } => {
                let old_parent = lookup(snapshot, node_id)?.parent_id.clone();
                let mut old_siblings = next.child_ids(old_parent.as_ref());
                old_siblings.retain(|id| id != node_id);

                let same_parent = old_parent.as_ref() == Some(new_parent_id);
                let mut new_siblings = if same_parent {
                    old_siblings.clone()
                } else {
                    next.child_ids(Some(new_parent_id))
                };
                let index = at_index
                    .unwrap_or(new_siblings.len())
                    .min(new_siblings.len());
                new_siblings.insert(index, node_id.clone());

                if let Some(node) = next.get_mut(node_id) {
                    node.parent_id = Some(new_parent_id.clone());
                }
                if !same_parent {
                    next.assign_orders(&old_siblings);
                }
                next.assign_orders(&new_siblings);
            }

            StructureOp::SetField {
                node_id,
                field,
                value,
            } => {
                if let Some(node) = next.get_mut(node_id) {
                    if value.is_null() {
                        node.fields.remove(field);
                    } else {
                        node.fields.insert(field.clone(), value.clone());
                    }
                }
            }
        }

        Ok(Mutated {
            snapshot: next,
            inserted,
        })
    }
}

fn lookup<'a>(snapshot: &'a Snapshot, id: &NodeId) -> MutationResult<&'a Node> {
    snapshot
        .get(id)
        .ok_or_else(|| MutationError::NodeNotFound(id.clone()))
}

fn is_reserved(field: &str) -> bool {
    RESERVED_FIELDS.contains(&field)
}

/// A node of `kind` may only hang off a node of its parent kind.
fn check_placement(
    snapshot: &Snapshot,
    kind: NodeKind,
    parent_id: Option<&NodeId>,
) -> MutationResult<()> {
    match parent_id {
        None if kind.parent_kind().is_none() => Ok(()),
        None => Err(MutationError::invalid_parent(kind, None)),
        Some(parent_id) => {
            let parent = snapshot
                .get(parent_id)
                .ok_or_else(|| MutationError::ParentNotFound(parent_id.clone()))?;
            if kind.parent_kind() == Some(parent.kind) {
                Ok(())
            } else {
                Err(MutationError::invalid_parent(kind, Some(parent.kind)))
            }
        }
    }
}

pub fn insert(
    snapshot: &Snapshot,
    ids: &mut IdGenerator,
    parent_id: Option<NodeId>,
    kind: NodeKind,
    fields: Fields,
    at_index: Option<usize>,
) -> MutationResult<Mutated> {
    StructureOp::Insert {
        parent_id,
        kind,
        fields,
        at_index,
    }
    .apply(snapshot, ids)
}

pub fn remove(snapshot: &Snapshot, node_id: &NodeId) -> MutationResult<Snapshot> {
    StructureOp::Remove {
        node_id: node_id.clone(),
    }
    .apply(snapshot, &mut IdGenerator::default())
    .map(|m| m.snapshot)
}

pub fn reorder(
    snapshot: &Snapshot,
    parent_id: Option<&NodeId>,
    ordered_child_ids: &[NodeId],
) -> MutationResult<Snapshot> {
    StructureOp::Reorder {
        parent_id: parent_id.cloned(),
        ordered_child_ids: ordered_child_ids.to_vec(),
    }
    .apply(snapshot, &mut IdGenerator::default())
    .map(|m| m.snapshot)
}

pub fn move_node(
    snapshot: &Snapshot,
    node_id: &NodeId,
    new_parent_id: &NodeId,
    at_index: Option<usize>,
) -> MutationResult<Snapshot> {
    StructureOp::Move {
        node_id: node_id.clone(),
        new_parent_id: new_parent_id.clone(),
        at_index,
    }
    .apply(snapshot, &mut IdGenerator::default())
    .map(|m| m.snapshot)
}

pub fn restore(snapshot: &Snapshot, subtree: &Subtree) -> MutationResult<Snapshot> {
    StructureOp::Restore {
        subtree: subtree.clone(),
    }
    .apply(snapshot, &mut IdGenerator::default())
    .map(|m| m.snapshot)
}

pub fn set_field(
    snapshot: &Snapshot,
    node_id: &NodeId,
    field: &str,
    value: Value,
) -> MutationResult<Snapshot> {
    StructureOp::SetField {
        node_id: node_id.clone(),
        field: field.to_string(),
        value,
    }
    .apply(snapshot, &mut IdGenerator::default())
    .map(|m| m.snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Snapshot {
        Snapshot::from_nodes(vec![
            Node::new("c1", NodeKind::Container, None, 1),
            Node::new("s1", NodeKind::Section, Some("c1".into()), 1),
            Node::new("u1", NodeKind::Unit, Some("s1".into()), 1),
            Node::new("u2", NodeKind::Unit, Some("s1".into()), 2),
            Node::new("u3", NodeKind::Unit, Some("s1".into()), 3),
        ])
        .unwrap()
    }

    fn ids(snapshot: &Snapshot, parent: &str) -> Vec<String> {
        snapshot
            .child_ids(Some(&parent.into()))
            .into_iter()
            .map(|id| id.to_string())
            .collect()
    }

    #[test]
    fn test_insert_clamps_index() {
        let mut gen = IdGenerator::new("t");
        let mutated = insert(
            &doc(),
            &mut gen,
            Some("s1".into()),
            NodeKind::Unit,
            Fields::new(),
            Some(99),
        )
        .unwrap();

        assert_eq!(mutated.inserted, Some("tmp-t-1".into()));
        assert_eq!(ids(&mutated.snapshot, "s1"), vec!["u1", "u2", "u3", "tmp-t-1"]);
        assert!(mutated.snapshot.check_integrity().is_ok());
    }

    #[test]
    fn test_insert_rejects_wrong_parent_kind() {
        let mut gen = IdGenerator::default();
        let err = insert(&doc(), &mut gen, Some("c1".into()), NodeKind::Unit, Fields::new(), None)
            .unwrap_err();
        assert_eq!(
            err,
            MutationError::invalid_parent(NodeKind::Unit, Some(NodeKind::Container))
        );
    }

    #[test]
    fn test_insert_rejects_reserved_fields() {
        let mut fields = Fields::new();
        fields.insert("order".into(), json!(4));
        let err = insert(&doc(), &mut IdGenerator::default(), Some("s1".into()), NodeKind::Unit, fields, None)
            .unwrap_err();
        assert_eq!(err, MutationError::ReservedField("order".into()));
    }

    #[test]
    fn test_remove_renumbers_siblings() {
        let next = remove(&doc(), &"u1".into()).unwrap();
        assert_eq!(ids(&next, "s1"), vec!["u2", "u3"]);
        assert_eq!(next.get(&"u2".into()).unwrap().order, 1);
        assert!(next.check_integrity().is_ok());
    }

    #[test]
    fn test_reorder_rejects_stale_sets() {
        let snapshot = doc();
        let missing = reorder(&snapshot, Some(&"s1".into()), &["u2".into(), "u1".into()]);
        assert!(missing.unwrap_err().is_stale());

        let duplicated = reorder(
            &snapshot,
            Some(&"s1".into()),
            &["u1".into(), "u1".into(), "u2".into()],
        );
        assert!(duplicated.unwrap_err().is_stale());
    }

    #[test]
    fn test_move_within_parent() {
        let next = move_node(&doc(), &"u1".into(), &"s1".into(), None).unwrap();
        assert_eq!(ids(&next, "s1"), vec!["u2", "u3", "u1"]);
        assert!(next.check_integrity().is_ok());
    }

    #[test]
    fn test_containers_never_move() {
        let snapshot = Snapshot::from_nodes(vec![
            Node::new("c1", NodeKind::Container, None, 1),
            Node::new("c2", NodeKind::Container, None, 2),
        ])
        .unwrap();
        let err = move_node(&snapshot, &"c1".into(), &"c2".into(), None).unwrap_err();
        assert_eq!(
            err,
            MutationError::invalid_parent(NodeKind::Container, Some(NodeKind::Container))
        );
    }

    #[test]
    fn test_set_field_null_removes() {
        let snapshot = set_field(&doc(), &"u1".into(), "title", json!("One")).unwrap();
        assert_eq!(snapshot.get(&"u1".into()).unwrap().field("title"), json!("One"));

        let cleared = set_field(&snapshot, &"u1".into(), "title", Value::Null).unwrap();
        assert!(cleared.get(&"u1".into()).unwrap().fields.is_empty());

        let err = set_field(&snapshot, &"u1".into(), "parent_id", json!("s2")).unwrap_err();
        assert_eq!(err, MutationError::ReservedField("parent_id".into()));
    }

    #[test]
    fn test_restore_rejects_present_ids() {
        let snapshot = doc();
        let subtree = snapshot.subtree(&"u2".into()).unwrap();
        assert_eq!(
            restore(&snapshot, &subtree).unwrap_err(),
            MutationError::DuplicateId("u2".into())
        );
    }

    #[test]
    fn test_restore_rejects_misplaced_descendants() {
        let snapshot = doc();
        let subtree = Subtree {
            root: Node::new("u9", NodeKind::Unit, Some("s1".into()), 1),
            descendants: vec![Node::new("l9", NodeKind::Leaf, Some("u9".into()), 1)],
        };

        assert_eq!(
            restore(&snapshot, &subtree).unwrap_err(),
            MutationError::invalid_parent(NodeKind::Leaf, Some(NodeKind::Unit))
        );
    }

    #[test]
    fn test_restore_rejects_broken_descendant_orders() {
        let snapshot = doc();
        let subtree = Subtree {
            root: Node::new("u9", NodeKind::Unit, Some("s1".into()), 1),
            descendants: vec![
                Node::new("p1", NodeKind::SubUnit, Some("u9".into()), 1),
                Node::new("p2", NodeKind::SubUnit, Some("u9".into()), 1),
            ],
        };

        let err = restore(&snapshot, &subtree).unwrap_err();
        assert!(matches!(err, MutationError::Integrity(_)), "{err:?}");
        assert_eq!(snapshot, doc());
    }

    #[test]
    fn test_op_serialization() {
        let op: StructureOp = serde_json::from_value(json!({
            "op": "move",
            "node_id": "u1",
            "new_parent_id": "s2"
        }))
        .unwrap();
        assert_eq!(
            op,
            StructureOp::Move {
                node_id: "u1".into(),
                new_parent_id: "s2".into(),
                at_index: None
            }
        );
        assert_eq!(op.name(), "move");
    }
}
