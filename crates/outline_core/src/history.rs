//! Linear undo/redo history of settled transactions.
//!
//! # Responsibility
//! - Hold one invertible diff per logical mutation.
//! - Coalesce rapid content edits on one node into a single undo unit.
//!
//! # Invariants
//! - Recording a new entry clears the redo stack.
//! - Structural entries are never merged with neighbours.
//! - Depth is capped; the oldest entry is dropped first.

use crate::model::node::{Node, NodeId};
use crate::selection::Focus;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

/// Logical operation that produced a history entry or change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    CreateSibling,
    Split,
    Merge,
    Delete,
    Indent,
    Outdent,
    MoveUp,
    MoveDown,
    Move,
    ToggleComplete,
    DeleteCompleted,
    EditContent,
    EditAttributes,
    Collapse,
    Import,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::CreateSibling => "create_sibling",
            Self::Split => "split",
            Self::Merge => "merge",
            Self::Delete => "delete",
            Self::Indent => "indent",
            Self::Outdent => "outdent",
            Self::MoveUp => "move_up",
            Self::MoveDown => "move_down",
            Self::Move => "move",
            Self::ToggleComplete => "toggle_complete",
            Self::DeleteCompleted => "delete_completed",
            Self::EditContent => "edit_content",
            Self::EditAttributes => "edit_attributes",
            Self::Collapse => "collapse",
            Self::Import => "import",
        }
    }

    /// Whether consecutive entries of this kind may merge.
    pub fn is_text_edit(self) -> bool {
        matches!(self, Self::EditContent)
    }
}

impl Display for ChangeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full before/after snapshot of one node. `None` means absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeChange {
    pub id: NodeId,
    pub before: Option<Node>,
    pub after: Option<Node>,
}

impl NodeChange {
    /// Same change played backwards.
    pub fn inverted(&self) -> Self {
        Self {
            id: self.id,
            before: self.after.clone(),
            after: self.before.clone(),
        }
    }
}

/// One undo unit.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub kind: ChangeKind,
    /// Changes in application order.
    pub changes: Vec<NodeChange>,
    pub focus_before: Option<Focus>,
    pub focus_after: Option<Focus>,
    pub zoom_before: Option<NodeId>,
    pub zoom_after: Option<NodeId>,
    pub recorded_at: Instant,
}

impl HistoryEntry {
    fn single_node(&self) -> Option<NodeId> {
        match self.changes.as_slice() {
            [change] => Some(change.id),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct HistoryManager {
    undo: VecDeque<HistoryEntry>,
    redo: Vec<HistoryEntry>,
    limit: usize,
    coalesce_window: Duration,
    sealed: bool,
}

impl HistoryManager {
    pub fn new(limit: usize, coalesce_window: Duration) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit: limit.max(1),
            coalesce_window,
            sealed: false,
        }
    }

    /// Pushes an entry, merging it into the previous text edit when both
    /// touch the same single node within the coalesce window.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.redo.clear();
        if !self.sealed && self.try_coalesce(&entry) {
            return;
        }
        self.sealed = false;
        self.undo.push_back(entry);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
    }

    /// Prevents the next text edit from merging into the current top entry.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn pop_undo(&mut self) -> Option<HistoryEntry> {
        self.sealed = true;
        self.undo.pop_back()
    }

    pub fn pop_redo(&mut self) -> Option<HistoryEntry> {
        self.sealed = true;
        self.redo.pop()
    }

    /// Stores an entry that was just undone.
    pub fn push_redo(&mut self, entry: HistoryEntry) {
        self.redo.push(entry);
    }

    /// Stores an entry that was just redone, keeping the redo stack intact.
    pub fn push_undo(&mut self, entry: HistoryEntry) {
        self.undo.push_back(entry);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.sealed = false;
    }

    fn try_coalesce(&mut self, entry: &HistoryEntry) -> bool {
        if !entry.kind.is_text_edit() {
            return false;
        }
        let window = self.coalesce_window;
        let Some(top) = self.undo.back_mut() else {
            return false;
        };
        if !top.kind.is_text_edit() || top.single_node().is_none() {
            return false;
        }
        if top.single_node() != entry.single_node() {
            return false;
        }
        if entry.recorded_at.saturating_duration_since(top.recorded_at) >= window {
            return false;
        }

        top.changes[0].after = entry.changes[0].after.clone();
        top.focus_after = entry.focus_after;
        top.zoom_after = entry.zoom_after;
        top.recorded_at = entry.recorded_at;
        true
    }
}
