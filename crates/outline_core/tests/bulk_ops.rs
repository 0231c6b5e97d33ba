mod common;

use common::{id, outline, render};
use outline_core::{Focus, MutationError, NodeId};

#[test]
fn bulk_indent_result_ignores_selection_order() {
    let lines = ["a", "b", "c", "d"];
    let mut forward = outline(&lines);
    let mut backward = outline(&lines);

    let (b, c) = (id(&forward, "b"), id(&forward, "c"));
    forward.indent_many(&[b, c]).unwrap();
    let (b, c) = (id(&backward, "b"), id(&backward, "c"));
    backward.indent_many(&[c, b]).unwrap();

    assert_eq!(render(&forward), vec!["a", "  b", "  c", "d"]);
    assert_eq!(render(&forward), render(&backward));
}

#[test]
fn bulk_commands_apply_the_single_op_to_each_id_top_down() {
    let mut engine = outline(&["a", "b", "c"]);
    let a = id(&engine, "a");
    let b = id(&engine, "b");

    let outcome = engine.indent_many(&[b, a]).unwrap();
    assert!(outcome.applied);
    assert_eq!(render(&engine), vec!["a", "  b", "c"]);

    let mut engine = outline(&["a", "b", "c"]);
    let a = id(&engine, "a");
    let b = id(&engine, "b");

    let outcome = engine.move_up_many(&[a, b]).unwrap();
    assert!(outcome.applied);
    assert_eq!(render(&engine), vec!["b", "a", "c"]);
}

#[test]
fn bulk_targets_nested_under_other_targets_are_applied_after_them() {
    let mut engine = outline(&["z", "a", "  a1"]);
    let a = id(&engine, "a");
    let a1 = id(&engine, "a1");

    engine.indent_many(&[a1, a]).unwrap();

    assert_eq!(render(&engine), vec!["z", "  a", "    a1"]);

    let mut engine = outline(&["z", "a", "  a0", "  a1"]);
    let a = id(&engine, "a");
    let a1 = id(&engine, "a1");

    engine.indent_many(&[a1, a]).unwrap();

    assert_eq!(render(&engine), vec!["z", "  a", "    a0", "      a1"]);
    engine.check_integrity().unwrap();
}

#[test]
fn bulk_outdent_keeps_selected_siblings_side_by_side() {
    let lines = ["p", "  x", "  y", "  z"];
    let mut forward = outline(&lines);
    let mut backward = outline(&lines);

    let (x, y) = (id(&forward, "x"), id(&forward, "y"));
    forward.outdent_many(&[x, y]).unwrap();
    let (x, y) = (id(&backward, "x"), id(&backward, "y"));
    backward.outdent_many(&[y, x]).unwrap();

    assert_eq!(render(&forward), vec!["p", "x", "y", "  z"]);
    assert_eq!(render(&forward), render(&backward));
}

#[test]
fn bulk_move_up_and_down_shift_the_block() {
    let mut engine = outline(&["a", "b", "c", "d"]);
    let b = id(&engine, "b");
    let c = id(&engine, "c");

    engine.move_up_many(&[c, b]).unwrap();
    assert_eq!(render(&engine), vec!["b", "c", "a", "d"]);

    engine.move_down_many(&[b, c]).unwrap();
    assert_eq!(render(&engine), vec!["a", "b", "c", "d"]);
    engine.move_down_many(&[b, c]).unwrap();
    assert_eq!(render(&engine), vec!["a", "d", "b", "c"]);

    // The bottom target stays put; the one above still moves down past it.
    assert!(engine.move_down_many(&[c, b]).unwrap().applied);
    assert_eq!(render(&engine), vec!["a", "d", "c", "b"]);
}

#[test]
fn bulk_move_is_one_undo_step() {
    let mut engine = outline(&["a", "b", "c"]);
    let b = id(&engine, "b");
    let c = id(&engine, "c");

    engine.move_up_many(&[b, c]).unwrap();
    engine.undo().unwrap();

    assert_eq!(render(&engine), vec!["a", "b", "c"]);
    assert!(!engine.can_undo());
}

#[test]
fn bulk_delete_clears_selection_and_keeps_one_node() {
    let mut engine = outline(&["a", "b", "c"]);
    let c = id(&engine, "c");
    engine.select_all();
    let selected: Vec<NodeId> = engine.selection().selected().iter().copied().collect();

    let outcome = engine.delete_many(&selected).unwrap();

    assert_eq!(render(&engine), vec!["c"]);
    assert!(outcome.selection.is_empty());
    assert_eq!(outcome.focus, Some(Focus::start(c)));
    assert_eq!(outcome.removed.len(), 2);
}

#[test]
fn bulk_toggle_completes_all_until_all_are_complete() {
    let mut engine = outline(&["X", "Y", "Z"]);
    let x = id(&engine, "X");
    let y = id(&engine, "Y");
    engine.click(x).unwrap();
    engine.toggle_click(x).unwrap();
    engine.toggle_click(y).unwrap();

    let outcome = engine.toggle_complete_many(&[y, x]).unwrap();
    assert!(engine.node(x).unwrap().completed);
    assert!(engine.node(y).unwrap().completed);
    assert_eq!(outcome.selection, vec![x, y]);

    engine.toggle_complete_many(&[x, y]).unwrap();
    assert!(!engine.node(x).unwrap().completed);
    assert!(!engine.node(y).unwrap().completed);
}

#[test]
fn bulk_toggle_with_mixed_state_completes_everything() {
    let mut engine = outline(&["X", "Y"]);
    let x = id(&engine, "X");
    let y = id(&engine, "Y");
    engine.toggle_complete(x).unwrap();

    engine.toggle_complete_many(&[x, y]).unwrap();

    assert!(engine.node(x).unwrap().completed);
    assert!(engine.node(y).unwrap().completed);
}

#[test]
fn delete_completed_items_removes_subtrees_but_never_everything() {
    let mut engine = outline(&["a", "  a1", "b", "c"]);
    for name in ["a", "c"] {
        let node = id(&engine, name);
        engine.toggle_complete(node).unwrap();
    }
    engine.delete_completed_items().unwrap();
    assert_eq!(render(&engine), vec!["b"]);

    let mut engine = outline(&["a", "b"]);
    let a = id(&engine, "a");
    let b = id(&engine, "b");
    engine.toggle_complete_many(&[a, b]).unwrap();
    engine.delete_completed_items().unwrap();
    assert_eq!(render(&engine), vec!["b"]);
}

#[test]
fn bulk_commands_reject_unknown_ids_before_writing() {
    let mut engine = outline(&["a", "b"]);
    let b = id(&engine, "b");
    let ghost = NodeId::new_v4();

    assert_eq!(
        engine.indent_many(&[b, ghost]).unwrap_err(),
        MutationError::NotFound(ghost)
    );
    assert_eq!(
        engine.toggle_complete_many(&[b, ghost]).unwrap_err(),
        MutationError::NotFound(ghost)
    );
    assert_eq!(render(&engine), vec!["a", "b"]);
    assert!(!engine.node(b).unwrap().completed);
}
