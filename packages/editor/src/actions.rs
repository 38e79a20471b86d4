//! # Actions
//!
//! Immutable records of one invertible edit. An [`Action`] knows the
//! [`StructureOp`] that performs it and how to build its inverse without
//! re-reading the store.
//!
//! | Kind          | Forward op          | Inverse                 |
//! |---------------|---------------------|-------------------------|
//! | `FieldUpdate` | `SetField(new)`     | `FieldUpdate` old/new swapped |
//! | `Insert`      | `Restore(subtree)`  | `Delete` of the same subtree  |
//! | `Delete`      | `Remove(id)`        | `Insert` reusing every id     |
//! | `Move`        | `Move(to)`          | `Move` from/to swapped        |
//! | `Reorder`     | `Reorder(after)`    | `Reorder` before/after swapped |

use chrono::{DateTime, Utc};
use manuscript_tree::{NodeId, NodeKind, Snapshot, StructureOp, Subtree};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a node sits: its parent and 0-based index among siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub parent_id: NodeId,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    FieldUpdate {
        entity: NodeKind,
        node_id: NodeId,
        field: String,
        old_value: Value,
        new_value: Value,
    },
    Insert {
        entity: NodeKind,
        subtree: Subtree,
    },
    Delete {
        entity: NodeKind,
        subtree: Subtree,
    },
    Move {
        entity: NodeKind,
        node_id: NodeId,
        from: Position,
        to: Position,
    },
    Reorder {
        parent_id: Option<NodeId>,
        before: Vec<NodeId>,
        after: Vec<NodeId>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

impl Action {
    pub fn new(kind: ActionKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            description: description.into(),
        }
    }

    pub fn field_update(
        entity: NodeKind,
        node_id: NodeId,
        field: impl Into<String>,
        old_value: Value,
        new_value: Value,
    ) -> Self {
        let field = field.into();
        let description = format!("Edit {entity} {field}");
        Self::new(
            ActionKind::FieldUpdate {
                entity,
                node_id,
                field,
                old_value,
                new_value,
            },
            description,
        )
    }

    pub fn insert(subtree: Subtree) -> Self {
        let entity = subtree.kind();
        Self::new(
            ActionKind::Insert { entity, subtree },
            format!("Add {entity}"),
        )
    }

    pub fn delete(subtree: Subtree) -> Self {
        let entity = subtree.kind();
        Self::new(
            ActionKind::Delete { entity, subtree },
            format!("Delete {entity}"),
        )
    }

    pub fn move_node(entity: NodeKind, node_id: NodeId, from: Position, to: Position) -> Self {
        Self::new(
            ActionKind::Move {
                entity,
                node_id,
                from,
                to,
            },
            format!("Move {entity}"),
        )
    }

    pub fn reorder(parent_id: Option<NodeId>, before: Vec<NodeId>, after: Vec<NodeId>) -> Self {
        Self::new(
            ActionKind::Reorder {
                parent_id,
                before,
                after,
            },
            "Reorder",
        )
    }

    /// The op that carries this action forward.
    pub fn operation(&self) -> StructureOp {
        match &self.kind {
            ActionKind::FieldUpdate {
                node_id,
                field,
                new_value,
                ..
            } => StructureOp::SetField {
                node_id: node_id.clone(),
                field: field.clone(),
                value: new_value.clone(),
            },
            ActionKind::Insert { subtree, .. } => StructureOp::Restore {
                subtree: subtree.clone(),
            },
            ActionKind::Delete { subtree, .. } => StructureOp::Remove {
                node_id: subtree.node_id().clone(),
            },
            ActionKind::Move { node_id, to, .. } => StructureOp::Move {
                node_id: node_id.clone(),
                new_parent_id: to.parent_id.clone(),
                at_index: Some(to.index),
            },
            ActionKind::Reorder {
                parent_id, after, ..
            } => StructureOp::Reorder {
                parent_id: parent_id.clone(),
                ordered_child_ids: after.clone(),
            },
        }
    }

    /// The action that undoes this one. Keeps the description so history
    /// reads the same in both directions.
    pub fn inverse(&self) -> Action {
        let kind = match &self.kind {
            ActionKind::FieldUpdate {
                entity,
                node_id,
                field,
                old_value,
                new_value,
            } => ActionKind::FieldUpdate {
                entity: *entity,
                node_id: node_id.clone(),
                field: field.clone(),
                old_value: new_value.clone(),
                new_value: old_value.clone(),
            },
            ActionKind::Insert { entity, subtree } => ActionKind::Delete {
                entity: *entity,
                subtree: subtree.clone(),
            },
            ActionKind::Delete { entity, subtree } => ActionKind::Insert {
                entity: *entity,
                subtree: subtree.clone(),
            },
            ActionKind::Move {
                entity,
                node_id,
                from,
                to,
            } => ActionKind::Move {
                entity: *entity,
                node_id: node_id.clone(),
                from: to.clone(),
                to: from.clone(),
            },
            ActionKind::Reorder {
                parent_id,
                before,
                after,
            } => ActionKind::Reorder {
                parent_id: parent_id.clone(),
                before: after.clone(),
                after: before.clone(),
            },
        };

        Action {
            kind,
            timestamp: Utc::now(),
            description: self.description.clone(),
        }
    }

    /// Like [`Action::inverse`], but an inverted insert captures the subtree
    /// as it stands in `snapshot`, so fields edited after the insert survive
    /// a later redo.
    pub fn inverse_against(&self, snapshot: &Snapshot) -> Action {
        let mut inverse = self.inverse();
        if let ActionKind::Delete { subtree, .. } = &mut inverse.kind {
            if let Some(current) = snapshot.subtree(subtree.node_id()) {
                *subtree = current;
            }
        }
        inverse
    }

    /// Main node this action is about, if any.
    pub fn node_id(&self) -> Option<&NodeId> {
        match &self.kind {
            ActionKind::FieldUpdate { node_id, .. } | ActionKind::Move { node_id, .. } => {
                Some(node_id)
            }
            ActionKind::Insert { subtree, .. } | ActionKind::Delete { subtree, .. } => {
                Some(subtree.node_id())
            }
            ActionKind::Reorder { parent_id, .. } => parent_id.as_ref(),
        }
    }

    /// Rewrite every reference to `from` as `to`.
    pub fn remap_id(&mut self, from: &NodeId, to: &NodeId) {
        let swap = |id: &mut NodeId| {
            if id == from {
                *id = to.clone();
            }
        };

        match &mut self.kind {
            ActionKind::FieldUpdate { node_id, .. } => swap(node_id),
            ActionKind::Insert { subtree, .. } | ActionKind::Delete { subtree, .. } => {
                subtree.rename(from, to)
            }
            ActionKind::Move {
                node_id, from: a, to: b, ..
            } => {
                swap(node_id);
                swap(&mut a.parent_id);
                swap(&mut b.parent_id);
            }
            ActionKind::Reorder {
                parent_id,
                before,
                after,
            } => {
                if let Some(parent_id) = parent_id {
                    swap(parent_id);
                }
                before.iter_mut().chain(after.iter_mut()).for_each(swap);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manuscript_tree::Node;
    use serde_json::json;

    #[test]
    fn test_field_update_inverse_swaps_values() {
        let action = Action::field_update(
            NodeKind::Leaf,
            "l1".into(),
            "body",
            json!("A"),
            json!("B"),
        );
        let inverse = action.inverse();

        assert_eq!(
            inverse.operation(),
            StructureOp::SetField {
                node_id: "l1".into(),
                field: "body".into(),
                value: json!("A"),
            }
        );
        assert_eq!(inverse.inverse().kind, action.kind);
        assert_eq!(inverse.description, "Edit leaf body");
    }

    #[test]
    fn test_delete_inverse_restores_subtree() {
        let subtree = Subtree::leaf(
            Node::new("n42", NodeKind::Container, None, 1).with_field("title", "Draft"),
        );
        let action = Action::delete(subtree.clone());

        assert_eq!(
            action.operation(),
            StructureOp::Remove {
                node_id: "n42".into()
            }
        );
        assert_eq!(action.inverse().operation(), StructureOp::Restore { subtree });
    }

    #[test]
    fn test_move_inverse_swaps_positions() {
        let from = Position {
            parent_id: "x".into(),
            index: 1,
        };
        let to = Position {
            parent_id: "y".into(),
            index: 0,
        };
        let action = Action::move_node(NodeKind::SubUnit, "p2".into(), from, to);

        assert_eq!(
            action.inverse().operation(),
            StructureOp::Move {
                node_id: "p2".into(),
                new_parent_id: "x".into(),
                at_index: Some(1),
            }
        );
    }

    #[test]
    fn test_remap_rewrites_every_reference() {
        let mut action = Action::reorder(
            Some("s1".into()),
            vec!["tmp-local-1".into(), "u2".into()],
            vec!["u2".into(), "tmp-local-1".into()],
        );
        action.remap_id(&"tmp-local-1".into(), &"row-7".into());

        match action.kind {
            ActionKind::Reorder { before, after, .. } => {
                assert_eq!(before[0].as_str(), "row-7");
                assert_eq!(after[1].as_str(), "row-7");
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_action_serialization_tags_kind() {
        let action = Action::field_update(NodeKind::Unit, "u1".into(), "title", json!(null), json!("x"));
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["kind"]["type"], json!("field_update"));
        assert_eq!(value["kind"]["entity"], json!("unit"));
    }
}
