//! Integration tests for tree structure and notifications.

use std::collections::HashSet;
use std::sync::Arc;

use amlm_model::{
    ModelError, NodeId, ThreadsafeTreeModel, TreeItem, TreeModel, TreeModelConfig, Variant,
    create_id, is_null,
};
use parking_lot::Mutex;

fn name(s: &str) -> Vec<Variant> {
    vec![Variant::from(s)]
}

fn names_model() -> TreeModel {
    TreeModel::new(TreeModelConfig::with_column_names(["Name"]))
}

/// Checks depth and attachment of every node reachable from the root.
fn assert_shape(model: &TreeModel) {
    let mut stack = vec![model.root()];
    let mut seen = HashSet::new();
    while let Some(id) = stack.pop() {
        let node = model.get_by_id(id).expect("reachable node resolves");
        assert!(node.is_attached());
        assert!(seen.insert(id), "{id} listed twice");
        match model.parent_of(id) {
            None => assert_eq!(node.depth(), 0),
            Some(parent) => {
                assert_eq!(node.depth(), model.depth(parent).unwrap() + 1);
                assert_eq!(model.children(parent).iter().filter(|&&c| c == id).count(), 1);
            }
        }
        stack.extend(node.children());
    }
    assert_eq!(seen.len(), model.storage().node_count());
}

#[test]
fn test_scenario_build_two_levels() {
    let mut model = names_model();
    let root = model.root();
    let a = model.append_child(root, name("a")).unwrap();
    let b = model.append_child(a, name("b")).unwrap();

    assert_eq!(model.row_count(root), 1);
    assert_eq!(model.row_count(a), 1);
    assert_eq!(model.depth(b), Some(2));
    assert_eq!(model.header_data(0), Variant::from("Name"));
    assert_shape(&model);
}

#[test]
fn test_scenario_root_cannot_be_reparented() {
    let mut model = names_model();
    let root = model.root();
    let a = model.append_child(root, name("a")).unwrap();
    model.append_child(a, name("b")).unwrap();
    let before = model.to_document();

    assert!(!model.change_parent(root, a));
    assert_eq!(model.row_count(root), 1);
    assert_eq!(model.row_count(a), 1);
    assert_eq!(model.to_document(), before);
}

#[test]
fn test_scenario_remove_three_node_subtree() {
    let mut model = names_model();
    let root = model.root();
    let keep = model.append_child(root, name("keep")).unwrap();
    let top = model.append_child(root, name("top")).unwrap();
    let c1 = model.append_child(top, name("c1")).unwrap();
    let c2 = model.append_child(top, name("c2")).unwrap();

    let rows_before = model.row_count(root);
    assert!(model.remove_child(root, top));

    for id in [top, c1, c2] {
        assert!(model.get_by_id(id).is_none());
    }
    assert_eq!(model.row_count(root), rows_before - 1);
    assert_eq!(model.row_of(keep), Some(0));
    assert_shape(&model);
}

#[test]
fn test_ids_unique_and_never_null() {
    let mut seen = HashSet::new();
    for _ in 0..10_000 {
        let id = create_id();
        assert!(!is_null(id));
        assert!(seen.insert(id));
    }
    assert!(is_null(NodeId::NULL));
}

#[test]
fn test_shape_survives_mixed_mutations() {
    let mut model = names_model();
    let root = model.root();
    let mut ids = vec![root];
    for i in 0..40 {
        let parent = ids[(i * 7) % ids.len()];
        ids.push(model.append_child(parent, name(&format!("n{i}"))).unwrap());
    }
    assert_shape(&model);

    // Reparent a few nodes, including attempts that would create cycles.
    for i in 1..20 {
        let node = ids[i];
        let target = ids[(i * 13) % ids.len()];
        let before = model.to_document();
        let is_cycle = model.storage().subtree_ids(node).contains(&target);
        let moved = model.change_parent(node, target);
        if is_cycle {
            assert!(!moved);
            assert_eq!(model.to_document(), before);
        }
        assert_shape(&model);
    }

    assert!(model.delete_subtree(ids[5]) || model.get_by_id(ids[5]).is_none());
    assert_shape(&model);
    assert!(model.check_consistency().is_ok());
}

#[test]
fn test_change_parent_refuses_descendant() {
    let mut model = names_model();
    let root = model.root();
    let a = model.append_child(root, name("a")).unwrap();
    let b = model.append_child(a, name("b")).unwrap();
    let c = model.append_child(b, name("c")).unwrap();
    let before = model.to_document();

    assert!(!model.change_parent(a, c));
    assert!(!model.change_parent(a, a));
    assert_eq!(model.to_document(), before);

    assert!(model.change_parent(c, root));
    assert_eq!(model.depth(c), Some(1));
    assert_eq!(model.row_of(c), Some(1));
}

#[test]
fn test_change_parent_notification_order() {
    let mut model = names_model();
    let root = model.root();
    let a = model.append_child(root, name("a")).unwrap();
    let b = model.append_child(root, name("b")).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    let signals = model.signals();
    let l = log.clone();
    signals
        .rows_about_to_be_removed
        .connect(move |(parent, first, _, ids)| {
            l.lock().push(format!("about-remove {parent} {first} {}", ids.len()))
        });
    let l = log.clone();
    signals
        .rows_removed
        .connect(move |(parent, first, _)| l.lock().push(format!("removed {parent} {first}")));
    let l = log.clone();
    signals
        .rows_about_to_be_inserted
        .connect(move |(parent, first, _)| l.lock().push(format!("about-insert {parent} {first}")));
    let l = log.clone();
    signals
        .rows_inserted
        .connect(move |(parent, first, _)| l.lock().push(format!("inserted {parent} {first}")));

    assert!(model.change_parent(b, a));
    assert_eq!(
        *log.lock(),
        vec![
            format!("about-remove {root} 1 1"),
            format!("removed {root} 1"),
            format!("about-insert {a} 0"),
            format!("inserted {a} 0"),
        ]
    );
}

#[test]
fn test_move_item_emits_move_signals() {
    let mut model = names_model();
    let root = model.root();
    let a = model.append_child(root, name("a")).unwrap();
    let b = model.append_child(root, name("b")).unwrap();
    let moves = Arc::new(Mutex::new(Vec::new()));
    let m = moves.clone();
    model.signals().rows_moved.connect(move |args| m.lock().push(*args));

    assert!(model.move_item(b, root, 0));
    assert_eq!(model.children(root), &[b, a]);
    assert_eq!(*moves.lock(), vec![(root, 1, 1, root, 0)]);
}

#[test]
fn test_insert_out_of_range_is_an_error() {
    let mut model = names_model();
    let root = model.root();
    let err = model.insert_item(root, 3, TreeItem::Generic(name("x"))).unwrap_err();
    assert_eq!(err, ModelError::row_out_of_range(root, 3, 0));

    let err = model.append_child(NodeId::NULL, name("x")).unwrap_err();
    assert_eq!(err, ModelError::InvalidParent(NodeId::NULL));
}

#[test]
fn test_removed_parent_rejects_children() {
    let model = ThreadsafeTreeModel::new(TreeModelConfig::with_column_names(["Name"]));
    let root = model.root();
    let a = model.append_child(root, name("a")).unwrap();
    assert!(model.delete_subtree(a));
    assert_eq!(model.append_child(a, name("b")), Err(ModelError::InvalidParent(a)));
    assert_eq!(model.row_count(a), 0);
    assert_eq!(model.column_count(a), 0);
}

#[test]
fn test_clear_resets_and_notifies() {
    let model = ThreadsafeTreeModel::new(TreeModelConfig::with_column_names(["Name"]));
    let root = model.root();
    let a = model.append_child(root, name("a")).unwrap();
    model.append_child(a, name("b")).unwrap();

    let resets = Arc::new(Mutex::new(0));
    let r = resets.clone();
    model.signals().model_reset.connect(move |_| *r.lock() += 1);

    model.clear();
    assert_eq!(*resets.lock(), 1);
    assert_eq!(model.node_count(), 1);
    assert_eq!(model.root(), root);
}
