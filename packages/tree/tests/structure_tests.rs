use manuscript_tree::*;
use pretty_assertions::assert_eq;
use serde_json::json;

/// X/S1 = [P1, P2], Y/S2 = [P3]
fn two_units() -> Snapshot {
    Snapshot::from_nodes(vec![
        Node::new("c1", NodeKind::Container, None, 1),
        Node::new("ch1", NodeKind::Section, Some("c1".into()), 1),
        Node::new("x", NodeKind::Unit, Some("ch1".into()), 1),
        Node::new("y", NodeKind::Unit, Some("ch1".into()), 2),
        Node::new("p1", NodeKind::SubUnit, Some("x".into()), 1).with_field("title", "P1"),
        Node::new("p2", NodeKind::SubUnit, Some("x".into()), 2).with_field("title", "P2"),
        Node::new("p3", NodeKind::SubUnit, Some("y".into()), 1).with_field("title", "P3"),
        Node::new("l1", NodeKind::Leaf, Some("p2".into()), 1).with_field("body", "hello"),
    ])
    .unwrap()
}

fn children(snapshot: &Snapshot, parent: &str) -> Vec<(String, u32)> {
    snapshot
        .children(Some(&parent.into()))
        .into_iter()
        .map(|n| (n.id.to_string(), n.order))
        .collect()
}

#[test]
fn test_cross_parent_move_keeps_identity_and_subtree() {
    let before = two_units();
    let after = move_node(&before, &"p2".into(), &"y".into(), Some(0)).unwrap();

    assert_eq!(children(&after, "x"), vec![("p1".to_string(), 1)]);
    assert_eq!(
        children(&after, "y"),
        vec![("p2".to_string(), 1), ("p3".to_string(), 2)]
    );

    let moved = after.get(&"p2".into()).unwrap();
    assert_eq!(moved.get_str("title"), Some("P2"));
    assert_eq!(after.get(&"l1".into()).unwrap().parent_id, Some("p2".into()));

    // Moving back to the recorded position is the exact inverse.
    let back = move_node(&after, &"p2".into(), &"x".into(), Some(1)).unwrap();
    assert_eq!(back, before);
}

#[test]
fn test_move_diff_touches_only_shifted_rows() {
    let before = two_units();
    let after = move_node(&before, &"p2".into(), &"y".into(), Some(0)).unwrap();

    let changes = before.diff(&after);
    let touched: Vec<&str> = changes.iter().map(|c| c.node_id().as_str()).collect();
    assert_eq!(touched, vec!["p2", "p3"]);
    assert!(changes.iter().all(|c| matches!(c, RowChange::Update { .. })));
}

#[test]
fn test_remove_cascades_and_restore_reuses_ids() {
    let before = two_units();
    let subtree = before.subtree(&"p2".into()).unwrap();
    assert_eq!(subtree.node_count(), 2);

    let removed = remove(&before, &"p2".into()).unwrap();
    assert!(!removed.contains(&"l1".into()));

    let changes = before.diff(&removed);
    assert_eq!(
        changes,
        vec![RowChange::Delete {
            kind: NodeKind::SubUnit,
            id: "p2".into()
        }]
    );

    let restored = restore(&removed, &subtree).unwrap();
    assert_eq!(restored, before);

    let inserts: Vec<String> = removed
        .diff(&restored)
        .into_iter()
        .filter_map(|c| match c {
            RowChange::Insert { node } => Some(node.id.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(inserts, vec!["p2", "l1"]);
}

#[test]
fn test_restore_clamps_recorded_order() {
    let before = two_units();
    let mut subtree = before.subtree(&"p3".into()).unwrap();
    let removed = remove(&before, &"p3".into()).unwrap();
    subtree.root.order = 9;

    let restored = restore(&removed, &subtree).unwrap();
    assert_eq!(children(&restored, "y"), vec![("p3".to_string(), 1)]);
}

#[test]
fn test_reorder_root_containers() {
    let mut ids = IdGenerator::new("doc");
    let start = Snapshot::from_nodes(vec![Node::new("c1", NodeKind::Container, None, 1)]).unwrap();
    let mutated = insert(&start, &mut ids, None, NodeKind::Container, Fields::new(), Some(0)).unwrap();
    let new_id = mutated.inserted.clone().unwrap();
    assert_eq!(mutated.snapshot.child_ids(None), vec![new_id.clone(), "c1".into()]);

    let reordered = reorder(&mutated.snapshot, None, &["c1".into(), new_id.clone()]).unwrap();
    assert_eq!(reordered.child_ids(None), vec!["c1".into(), new_id]);
}

#[test]
fn test_failed_ops_leave_input_untouched() {
    let before = two_units();
    let copy = before.clone();

    assert!(matches!(
        move_node(&before, &"p1".into(), &"ch1".into(), None),
        Err(MutationError::InvalidParent { .. })
    ));
    assert!(matches!(
        remove(&before, &"ghost".into()),
        Err(MutationError::NodeNotFound(_))
    ));
    assert!(matches!(
        set_field(&before, &"ghost".into(), "title", json!("x")),
        Err(MutationError::NodeNotFound(_))
    ));
    assert_eq!(before, copy);
}

#[test]
fn test_snapshot_json_roundtrip() {
    let snapshot = two_units();
    let json = serde_json::to_string(&snapshot).unwrap();
    let back: Snapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snapshot);
}
