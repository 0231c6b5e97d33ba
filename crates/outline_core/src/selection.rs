//! Focus, multi-selection and zoom state machine.
//!
//! # Responsibility
//! - Track which node has keyboard focus and where its caret sits.
//! - Track the multi-selection set and the zoom scope.
//! - Move focus over a visible projection without knowing tree structure.
//!
//! # Invariants
//! - A non-empty selection always comes with a focus.
//! - Navigation clamps at projection edges instead of wrapping.

use crate::index::tree_index::Projection;
use crate::model::node::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Caret placement inside the focused node's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Caret {
    Start,
    End,
    /// Char offset into the content.
    At(usize),
}

/// Focused node plus caret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Focus {
    pub id: NodeId,
    pub caret: Caret,
}

impl Focus {
    pub fn start(id: NodeId) -> Self {
        Self {
            id,
            caret: Caret::Start,
        }
    }

    pub fn end(id: NodeId) -> Self {
        Self {
            id,
            caret: Caret::End,
        }
    }

    pub fn at(id: NodeId, offset: usize) -> Self {
        Self {
            id,
            caret: Caret::At(offset),
        }
    }
}

/// Coarse state reported to the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionState {
    Unfocused,
    Focused(Focus),
    FocusedWithSelection {
        focus: Focus,
        selected: HashSet<NodeId>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionController {
    focus: Option<Focus>,
    selected: HashSet<NodeId>,
    zoom_root: Option<NodeId>,
}

impl SelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SelectionState {
        match self.focus {
            None => SelectionState::Unfocused,
            Some(focus) if self.selected.is_empty() => SelectionState::Focused(focus),
            Some(focus) => SelectionState::FocusedWithSelection {
                focus,
                selected: self.selected.clone(),
            },
        }
    }

    pub fn focus(&self) -> Option<Focus> {
        self.focus
    }

    pub fn focused_id(&self) -> Option<NodeId> {
        self.focus.map(|focus| focus.id)
    }

    pub fn selected(&self) -> &HashSet<NodeId> {
        &self.selected
    }

    pub fn is_selected(&self, id: NodeId) -> bool {
        self.selected.contains(&id)
    }

    pub fn zoom_root(&self) -> Option<NodeId> {
        self.zoom_root
    }

    /// Sets focus directly; clearing focus also clears the selection.
    pub fn set_focus(&mut self, focus: Option<Focus>) {
        self.focus = focus;
        if focus.is_none() {
            self.selected.clear();
        }
    }

    pub fn set_zoom_root(&mut self, zoom_root: Option<NodeId>) {
        self.zoom_root = zoom_root;
    }

    /// Plain click: focus the target and drop any selection.
    pub fn click(&mut self, target: NodeId) {
        self.focus = Some(Focus::end(target));
        self.selected.clear();
    }

    /// Modifier click: toggle membership, focusing the target only when
    /// nothing is focused yet.
    pub fn toggle_click(&mut self, target: NodeId) {
        if !self.selected.remove(&target) {
            self.selected.insert(target);
        }
        if self.focus.is_none() {
            self.focus = Some(Focus::end(target));
        }
    }

    /// Range click: select the contiguous visible range between the focus
    /// and `target`, inclusive. Without a visible focus this is a click that
    /// also selects the target.
    pub fn range_click(&mut self, target: NodeId, projection: &Projection) {
        let anchor = self
            .focus
            .and_then(|focus| projection.position(focus.id));
        let (Some(anchor), Some(end)) = (anchor, projection.position(target)) else {
            self.click(target);
            self.selected.insert(target);
            return;
        };
        let (low, high) = if anchor <= end {
            (anchor, end)
        } else {
            (end, anchor)
        };
        self.selected = projection.rows()[low..=high]
            .iter()
            .map(|row| row.id)
            .collect();
    }

    /// Escape: clear selection, keep focus.
    pub fn escape(&mut self) {
        self.selected.clear();
    }

    pub fn select_all(&mut self, projection: &Projection) {
        self.selected = projection.rows().iter().map(|row| row.id).collect();
        if self.focus.is_none() {
            self.focus = projection.first().map(|row| Focus::start(row.id));
        }
    }

    /// Zooms into the focused node. Returns `false` when unfocused.
    pub fn zoom_in(&mut self) -> bool {
        let Some(focus) = self.focus else {
            return false;
        };
        self.zoom_root = Some(focus.id);
        self.selected.clear();
        true
    }

    /// Moves focus to the next visible row.
    pub fn move_down(&mut self, projection: &Projection) -> bool {
        let target = match self.focus {
            None => projection.first(),
            Some(focus) => match projection.position(focus.id) {
                Some(position) => projection.get(position + 1),
                // Off-screen focus, zoom root included, re-enters at the top.
                None => projection.first(),
            },
        };
        self.land_on(target.map(|row| row.id))
    }

    /// Moves focus to the previous visible row.
    pub fn move_up(&mut self, projection: &Projection) -> bool {
        let target = match self.focus {
            None => projection.last(),
            Some(focus) => match projection.position(focus.id) {
                Some(position) => position
                    .checked_sub(1)
                    .and_then(|position| projection.get(position)),
                None if Some(focus.id) == self.zoom_root => None,
                None => projection.last(),
            },
        };
        self.land_on(target.map(|row| row.id))
    }

    /// Drops focus and selected ids rejected by `exists`.
    pub fn retain(&mut self, exists: impl Fn(NodeId) -> bool) {
        self.selected.retain(|id| exists(*id));
        if self.focus.is_some_and(|focus| !exists(focus.id)) {
            self.focus = None;
            self.selected.clear();
        }
        if self.zoom_root.is_some_and(|root| !exists(root)) {
            self.zoom_root = None;
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    fn land_on(&mut self, target: Option<NodeId>) -> bool {
        let Some(id) = target else {
            return false;
        };
        let caret = self.focus.map_or(Caret::Start, |focus| focus.caret);
        self.focus = Some(Focus { id, caret });
        self.selected.clear();
        true
    }
}
