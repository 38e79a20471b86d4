//! Property tests for the sibling order invariant.
//!
//! Any sequence of insert/remove/reorder/move against a valid snapshot must
//! leave every parent's children numbered exactly `1..=n`, with no orphans.
//! Rejected operations must leave the snapshot untouched.

use manuscript_tree::{Fields, IdGenerator, NodeId, NodeKind, Snapshot, StructureOp};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Insert { kind: usize, parent: usize, index: usize },
    Remove { node: usize },
    Reorder { parent: usize, rotate: usize, reverse: bool },
    Move { node: usize, parent: usize, index: Option<usize> },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (0usize..5, any::<usize>(), 0usize..8)
            .prop_map(|(kind, parent, index)| Step::Insert { kind, parent, index }),
        1 => any::<usize>().prop_map(|node| Step::Remove { node }),
        2 => (any::<usize>(), any::<usize>(), any::<bool>())
            .prop_map(|(parent, rotate, reverse)| Step::Reorder { parent, rotate, reverse }),
        2 => (any::<usize>(), any::<usize>(), proptest::option::of(0usize..8))
            .prop_map(|(node, parent, index)| Step::Move { node, parent, index }),
    ]
}

fn pick(snapshot: &Snapshot, selector: usize) -> Option<NodeId> {
    let ids: Vec<NodeId> = snapshot.nodes().map(|n| n.id.clone()).collect();
    if ids.is_empty() {
        None
    } else {
        Some(ids[selector % ids.len()].clone())
    }
}

/// Prefer a structurally valid parent so most steps exercise the happy path.
fn pick_parent(snapshot: &Snapshot, kind: NodeKind, selector: usize) -> Option<NodeId> {
    let parent_kind = kind.parent_kind()?;
    let candidates: Vec<NodeId> = snapshot
        .nodes()
        .filter(|n| n.kind == parent_kind)
        .map(|n| n.id.clone())
        .collect();
    if candidates.is_empty() {
        pick(snapshot, selector)
    } else {
        Some(candidates[selector % candidates.len()].clone())
    }
}

fn to_op(snapshot: &Snapshot, step: &Step) -> Option<StructureOp> {
    match step {
        Step::Insert { kind, parent, index } => {
            let kind = NodeKind::ALL[*kind];
            Some(StructureOp::Insert {
                parent_id: pick_parent(snapshot, kind, *parent),
                kind,
                fields: Fields::new(),
                at_index: Some(*index),
            })
        }
        Step::Remove { node } => Some(StructureOp::Remove {
            node_id: pick(snapshot, *node)?,
        }),
        Step::Reorder { parent, rotate, reverse } => {
            let parent_id = if parent % 4 == 0 { None } else { pick(snapshot, *parent) };
            let mut ordered = snapshot.child_ids(parent_id.as_ref());
            if !ordered.is_empty() {
                let by = rotate % ordered.len();
                ordered.rotate_left(by);
            }
            if *reverse {
                ordered.reverse();
            }
            Some(StructureOp::Reorder {
                parent_id,
                ordered_child_ids: ordered,
            })
        }
        Step::Move { node, parent, index } => {
            let node_id = pick(snapshot, *node)?;
            let kind = snapshot.get(&node_id)?.kind;
            Some(StructureOp::Move {
                node_id,
                new_parent_id: pick_parent(snapshot, kind, *parent)?,
                at_index: *index,
            })
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn sibling_orders_stay_contiguous(steps in prop::collection::vec(step_strategy(), 1..40)) {
        let mut ids = IdGenerator::new("prop");
        let mut snapshot = Snapshot::new();

        for step in &steps {
            let Some(op) = to_op(&snapshot, step) else { continue };
            let before = snapshot.clone();
            match op.apply(&snapshot, &mut ids) {
                Ok(mutated) => {
                    prop_assert!(
                        mutated.snapshot.check_integrity().is_ok(),
                        "integrity broken by {:?}: {:?}",
                        op,
                        mutated.snapshot.check_integrity()
                    );
                    snapshot = mutated.snapshot;
                }
                Err(_) => prop_assert_eq!(&snapshot, &before),
            }
        }
    }

    #[test]
    fn remove_then_restore_is_identity(steps in prop::collection::vec(step_strategy(), 1..30), victim in any::<usize>()) {
        let mut ids = IdGenerator::new("prop");
        let mut snapshot = Snapshot::new();
        for step in &steps {
            if let Some(op) = to_op(&snapshot, step) {
                if let Ok(mutated) = op.apply(&snapshot, &mut ids) {
                    snapshot = mutated.snapshot;
                }
            }
        }

        let Some(node_id) = pick(&snapshot, victim) else { return Ok(()) };
        let subtree = snapshot.subtree(&node_id).unwrap();
        let removed = manuscript_tree::remove(&snapshot, &node_id).unwrap();
        let restored = manuscript_tree::restore(&removed, &subtree).unwrap();
        prop_assert_eq!(restored, snapshot);
    }
}
