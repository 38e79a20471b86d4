//! # Drag Interaction
//!
//! Turns a pointer or keyboard drag into at most one structural request.
//!
//! ```text
//! Idle ──start──▶ Dragging ──hover──▶ Hovering(valid | invalid)
//!  ▲                  │                      │
//!  └──── drop/cancel ─┴──────────────────────┘
//! ```
//!
//! Hover targets resolve as follows:
//! - a same-kind sibling under the same parent: reorder, the dragged node
//!   takes the target's position
//! - a node of the dragged kind's parent kind: move, appended at the end
//!   (a reorder to the end when it is the current parent)
//! - anything else: invalid, nothing highlighted, nothing pending
//!
//! The machine never writes anything; a drop only hands back a [`DropIntent`].

use manuscript_tree::{MutationError, MutationResult, NodeId, NodeKind, Snapshot, StructureOp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct DragSource {
    pub node_id: NodeId,
    pub kind: NodeKind,
    pub parent_id: Option<NodeId>,
}

/// The single request a completed drag produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum DropIntent {
    Reorder {
        parent_id: Option<NodeId>,
        ordered_child_ids: Vec<NodeId>,
    },
    Move {
        node_id: NodeId,
        new_parent_id: NodeId,
        at_index: Option<usize>,
    },
}

impl DropIntent {
    pub fn into_operation(self) -> StructureOp {
        match self {
            DropIntent::Reorder {
                parent_id,
                ordered_child_ids,
            } => StructureOp::Reorder {
                parent_id,
                ordered_child_ids,
            },
            DropIntent::Move {
                node_id,
                new_parent_id,
                at_index,
            } => StructureOp::Move {
                node_id,
                new_parent_id,
                at_index,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        source: DragSource,
    },
    Hovering {
        source: DragSource,
        target: NodeId,
        intent: Option<DropIntent>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Default)]
pub struct DragMachine {
    state: DragState,
}

impl DragMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        !matches!(self.state, DragState::Idle)
    }

    /// Pick up `node_id`. Starting again mid-drag replaces the old drag.
    pub fn start(&mut self, snapshot: &Snapshot, node_id: &NodeId) -> MutationResult<()> {
        let node = snapshot
            .get(node_id)
            .ok_or_else(|| MutationError::NodeNotFound(node_id.clone()))?;
        self.state = DragState::Dragging {
            source: DragSource {
                node_id: node.id.clone(),
                kind: node.kind,
                parent_id: node.parent_id.clone(),
            },
        };
        Ok(())
    }

    /// Move the pointer over `target`; `None` means it left every target.
    pub fn hover(&mut self, snapshot: &Snapshot, target: Option<&NodeId>) -> Option<&DropIntent> {
        let source = match &self.state {
            DragState::Idle => return None,
            DragState::Dragging { source } | DragState::Hovering { source, .. } => source.clone(),
        };

        self.state = match target {
            None => DragState::Dragging { source },
            Some(target) => {
                let intent = resolve(snapshot, &source, target);
                DragState::Hovering {
                    source,
                    target: target.clone(),
                    intent,
                }
            }
        };
        self.pending()
    }

    /// Keyboard drag: hover the previous or next same-kind sibling.
    pub fn step(&mut self, snapshot: &Snapshot, direction: Direction) -> Option<&DropIntent> {
        let (source, current) = match &self.state {
            DragState::Idle => return None,
            DragState::Dragging { source } => (source.clone(), None),
            DragState::Hovering { source, target, .. } => (source.clone(), Some(target.clone())),
        };

        let siblings = snapshot.child_ids(source.parent_id.as_ref());
        let anchor = current
            .filter(|t| siblings.contains(t))
            .unwrap_or_else(|| source.node_id.clone());
        let Some(mut index) = siblings.iter().position(|id| *id == anchor) else {
            return self.pending();
        };

        loop {
            index = match direction {
                Direction::Up if index > 0 => index - 1,
                Direction::Down if index + 1 < siblings.len() => index + 1,
                _ => return self.pending(),
            };
            if siblings[index] != source.node_id {
                break;
            }
        }

        let target = siblings[index].clone();
        self.hover(snapshot, Some(&target))
    }

    /// The target to highlight; only valid targets are highlighted.
    pub fn highlight(&self) -> Option<&NodeId> {
        match &self.state {
            DragState::Hovering {
                target,
                intent: Some(_),
                ..
            } => Some(target),
            _ => None,
        }
    }

    pub fn pending(&self) -> Option<&DropIntent> {
        match &self.state {
            DragState::Hovering { intent, .. } => intent.as_ref(),
            _ => None,
        }
    }

    /// Release. Always returns to `Idle`.
    pub fn drop(&mut self) -> Option<DropIntent> {
        match std::mem::take(&mut self.state) {
            DragState::Hovering { intent, .. } => intent,
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }
}

fn resolve(snapshot: &Snapshot, source: &DragSource, target_id: &NodeId) -> Option<DropIntent> {
    if *target_id == source.node_id {
        return None;
    }
    let target = snapshot.get(target_id)?;

    if target.kind == source.kind && target.parent_id == source.parent_id {
        let siblings = snapshot.child_ids(source.parent_id.as_ref());
        let index = siblings.iter().position(|id| id == target_id)?;
        let mut ordered: Vec<NodeId> = siblings
            .into_iter()
            .filter(|id| *id != source.node_id)
            .collect();
        ordered.insert(index.min(ordered.len()), source.node_id.clone());
        return Some(DropIntent::Reorder {
            parent_id: source.parent_id.clone(),
            ordered_child_ids: ordered,
        });
    }

    if source.kind.parent_kind() != Some(target.kind) {
        return None;
    }

    if source.parent_id.as_ref() == Some(target_id) {
        let siblings = snapshot.child_ids(Some(target_id));
        if siblings.last() == Some(&source.node_id) {
            return None;
        }
        let mut ordered: Vec<NodeId> = siblings
            .into_iter()
            .filter(|id| *id != source.node_id)
            .collect();
        ordered.push(source.node_id.clone());
        return Some(DropIntent::Reorder {
            parent_id: Some(target_id.clone()),
            ordered_child_ids: ordered,
        });
    }

    Some(DropIntent::Move {
        node_id: source.node_id.clone(),
        new_parent_id: target_id.clone(),
        at_index: None,
    })
}
