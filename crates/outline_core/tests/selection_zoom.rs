mod common;

use common::{id, outline, visible};
use outline_core::{Focus, SelectionState};
use std::collections::HashSet;

#[test]
fn arrow_navigation_follows_visible_rows_and_clamps() {
    let mut engine = outline(&["a", "  a1", "b"]);
    let a = id(&engine, "a");
    let b = id(&engine, "b");
    engine.set_collapsed(a, true).unwrap();

    assert!(engine.focus_next());
    assert_eq!(engine.focus(), Some(Focus::start(a)));
    assert!(engine.focus_next());
    assert_eq!(engine.focus(), Some(Focus::start(b)));
    assert!(!engine.focus_next());
    assert_eq!(engine.focus(), Some(Focus::start(b)));

    assert!(engine.focus_previous());
    assert_eq!(engine.focus(), Some(Focus::start(a)));
    assert!(!engine.focus_previous());
}

#[test]
fn navigation_keeps_the_caret_placement() {
    let mut engine = outline(&["a", "b"]);
    let a = id(&engine, "a");
    let b = id(&engine, "b");

    engine.click(a).unwrap();
    assert!(engine.focus_next());

    assert_eq!(engine.focus(), Some(Focus::end(b)));
}

#[test]
fn zoom_in_shows_children_and_down_lands_on_first_child() {
    let mut engine = outline(&["a", "  a1", "  a2", "b"]);
    let a = id(&engine, "a");
    let a1 = id(&engine, "a1");

    engine.click(a).unwrap();
    assert!(engine.zoom_in());

    assert_eq!(engine.zoom_root(), Some(a));
    assert_eq!(visible(&engine), vec!["a1", "a2"]);
    assert!(engine.focus_next());
    assert_eq!(engine.focus().map(|focus| focus.id), Some(a1));
    assert!(!engine.focus_previous());
}

#[test]
fn zoom_into_collapsed_node_still_shows_its_children() {
    let mut engine = outline(&["a", "  a1"]);
    let a = id(&engine, "a");
    engine.set_collapsed(a, true).unwrap();

    engine.zoom_to(Some(a)).unwrap();

    assert_eq!(visible(&engine), vec!["a1"]);
}

#[test]
fn zoom_out_pops_one_scope_and_focuses_the_old_root() {
    let mut engine = outline(&["a", "  a1", "    a11"]);
    let a = id(&engine, "a");
    let a1 = id(&engine, "a1");

    engine.click(a1).unwrap();
    assert!(engine.zoom_in());
    assert_eq!(visible(&engine), vec!["a11"]);

    assert!(engine.zoom_out());
    assert_eq!(engine.zoom_root(), Some(a));
    assert_eq!(engine.focus(), Some(Focus::end(a1)));
    assert_eq!(visible(&engine), vec!["a1", "  a11"]);

    assert!(engine.zoom_out());
    assert_eq!(engine.zoom_root(), None);
    assert!(!engine.zoom_out());
}

#[test]
fn zoom_in_without_focus_does_nothing() {
    let mut engine = outline(&["a", "  a1"]);

    assert!(!engine.zoom_in());
    assert_eq!(engine.zoom_root(), None);
}

#[test]
fn splitting_the_zoom_root_never_empties_the_view() {
    let mut engine = outline(&["top", "  Z text", "    c1", "    c2"]);
    let top = id(&engine, "top");
    let z = id(&engine, "Z text");
    engine.click(z).unwrap();
    engine.zoom_in();
    let before = engine.projection().len();
    assert_eq!(before, 2);

    let outcome = engine.split_at_cursor(z, 1).unwrap();

    assert!(!engine.projection().is_empty());
    assert_eq!(outcome.zoom_root, Some(top));
    assert_eq!(visible(&engine), vec!["Z", " text", "  c1", "  c2"]);
}

#[test]
fn splitting_a_top_level_zoom_root_relaxes_to_the_document() {
    let mut engine = outline(&["Z text", "  c1", "  c2"]);
    let z = id(&engine, "Z text");
    engine.click(z).unwrap();
    engine.zoom_in();

    engine.split_at_cursor(z, 1).unwrap();

    assert_eq!(engine.zoom_root(), None);
    assert_eq!(visible(&engine), vec!["Z", " text", "  c1", "  c2"]);
}

#[test]
fn deleting_the_last_visible_row_relaxes_zoom() {
    let mut engine = outline(&["z", "  only", "other"]);
    let z = id(&engine, "z");
    let only = id(&engine, "only");
    engine.click(z).unwrap();
    engine.zoom_in();

    engine.delete_node(only, true).unwrap();

    assert_eq!(engine.zoom_root(), None);
    assert_eq!(visible(&engine), vec!["z", "other"]);
}

#[test]
fn undo_restores_the_zoom_scope() {
    let mut engine = outline(&["Z text", "  c1"]);
    let z = id(&engine, "Z text");
    engine.click(z).unwrap();
    engine.zoom_in();
    engine.split_at_cursor(z, 1).unwrap();
    assert_eq!(engine.zoom_root(), None);

    engine.undo().unwrap();

    assert_eq!(engine.zoom_root(), Some(z));
    assert_eq!(visible(&engine), vec!["c1"]);
}

#[test]
fn range_click_selects_contiguous_visible_rows_both_ways() {
    let mut engine = outline(&["a", "  a1", "b", "c"]);
    let a = id(&engine, "a");
    let a1 = id(&engine, "a1");
    let b = id(&engine, "b");
    let c = id(&engine, "c");

    engine.click(a1).unwrap();
    engine.range_click(c).unwrap();
    assert_eq!(
        engine.selection_state(),
        SelectionState::FocusedWithSelection {
            focus: Focus::end(a1),
            selected: HashSet::from([a1, b, c]),
        }
    );

    engine.click(c).unwrap();
    engine.range_click(a).unwrap();
    assert_eq!(engine.selection().selected(), &HashSet::from([a, a1, b, c]));
}

#[test]
fn toggle_click_adds_and_removes_without_moving_focus() {
    let mut engine = outline(&["a", "b"]);
    let a = id(&engine, "a");
    let b = id(&engine, "b");

    engine.click(a).unwrap();
    engine.toggle_click(b).unwrap();
    assert!(engine.selection().is_selected(b));
    assert_eq!(engine.focus(), Some(Focus::end(a)));

    engine.toggle_click(b).unwrap();
    assert_eq!(engine.selection_state(), SelectionState::Focused(Focus::end(a)));

    engine.clear_focus();
    engine.toggle_click(b).unwrap();
    assert_eq!(engine.focus(), Some(Focus::end(b)));
}

#[test]
fn escape_clears_selection_and_keeps_focus() {
    let mut engine = outline(&["a", "  a1", "b"]);
    let a = id(&engine, "a");
    let b = id(&engine, "b");
    engine.set_collapsed(a, true).unwrap();

    engine.select_all();
    assert_eq!(engine.selection().selected(), &HashSet::from([a, b]));
    assert_eq!(engine.focus(), Some(Focus::start(a)));

    engine.escape();
    assert_eq!(engine.selection_state(), SelectionState::Focused(Focus::start(a)));
}

#[test]
fn plain_click_drops_the_selection() {
    let mut engine = outline(&["a", "b"]);
    let a = id(&engine, "a");
    let b = id(&engine, "b");
    engine.select_all();

    engine.click(b).unwrap();

    assert!(!engine.selection().is_selected(a));
    assert_eq!(engine.selection_state(), SelectionState::Focused(Focus::end(b)));
}

#[test]
fn collapsing_an_ancestor_pulls_focus_out_of_the_hidden_subtree() {
    let mut engine = outline(&["a", "  a1", "    a11"]);
    let a = id(&engine, "a");
    let a11 = id(&engine, "a11");
    engine.click(a11).unwrap();

    let outcome = engine.set_collapsed(a, true).unwrap();

    assert_eq!(outcome.focus, Some(Focus::end(a)));
    assert_eq!(visible(&engine), vec!["a"]);
}
