//! Single-node structural commands.
//!
//! # Invariants
//! - Every command validates ids before its transaction begins.
//! - Edge cases with no sensible result (indent without a previous sibling,
//!   deleting the last node) are silent no-ops, not errors.

use super::error::{MutationError, MutationResult};
use super::txn::Transaction;
use super::{CommandOutcome, MutationEngine};
use crate::history::ChangeKind;
use crate::model::node::{Node, NodeId, ORDER_KEY_STEP};
use crate::selection::Focus;
use log::info;
use std::collections::{HashMap, HashSet};

impl MutationEngine {
    /// Creates an empty node right after `after_id` and focuses it.
    pub fn create_sibling(&mut self, after_id: NodeId) -> MutationResult<CommandOutcome> {
        let is_checkbox = self.store.get(after_id)?.is_checkbox;
        let (parent, slot) = self.locate(after_id)?;

        let mut txn = self.begin(ChangeKind::CreateSibling);
        let mut node = Node::new(parent, 0, "");
        node.is_checkbox = is_checkbox;
        let id = self.insert_at(&mut txn, node, slot + 1);
        self.selection.set_focus(Some(Focus::start(id)));
        self.selection.clear_selection();
        Ok(self.commit(txn))
    }

    /// Inserts a node under `parent`, right after `after` or first.
    ///
    /// # Errors
    /// - `NotFound` when `parent` or `after` is missing.
    /// - `InvalidOperation` when `after` is not a child of `parent`.
    pub fn insert_node(
        &mut self,
        parent: Option<NodeId>,
        after: Option<NodeId>,
        content: impl Into<String>,
    ) -> MutationResult<CommandOutcome> {
        if let Some(parent) = parent {
            self.store.get(parent)?;
        }
        let slot = match after {
            Some(anchor) => {
                let (anchor_parent, slot) = self.locate(anchor)?;
                if anchor_parent != parent {
                    return Err(MutationError::InvalidOperation(format!(
                        "{anchor} is not a child of the requested parent"
                    )));
                }
                slot + 1
            }
            None => 0,
        };

        let mut txn = self.begin(ChangeKind::Insert);
        self.insert_at(&mut txn, Node::new(parent, 0, content), slot);
        Ok(self.commit(txn))
    }

    /// Appends a node as the last child of `parent` and returns its id.
    pub fn append_node(
        &mut self,
        parent: Option<NodeId>,
        content: impl Into<String>,
    ) -> MutationResult<NodeId> {
        if let Some(parent) = parent {
            self.store.get(parent)?;
        }
        let slot = self.index.children(parent).len();

        let mut txn = self.begin(ChangeKind::Insert);
        let id = self.insert_at(&mut txn, Node::new(parent, 0, content), slot);
        self.commit(txn);
        Ok(id)
    }

    /// Splits content at a char offset.
    ///
    /// At offset 0 a blank node goes in front and focus stays on `id`.
    /// Otherwise `id` keeps the head and a new next sibling takes the tail
    /// together with all of `id`'s children.
    pub fn split_at_cursor(&mut self, id: NodeId, offset: usize) -> MutationResult<CommandOutcome> {
        let original = self.store.get(id)?.clone();
        let (parent, slot) = self.locate(id)?;

        let mut txn = self.begin(ChangeKind::Split);
        if offset == 0 {
            let mut blank = Node::new(parent, 0, "");
            blank.is_checkbox = original.is_checkbox;
            self.insert_at(&mut txn, blank, slot);
            self.selection.set_focus(Some(Focus::start(id)));
            return Ok(self.commit(txn));
        }

        let (head, tail) = original.split_content(offset);
        self.edit_node(&mut txn, id, |node| {
            node.content = head;
            node.collapsed = false;
        });
        let mut next = Node::new(parent, 0, tail);
        next.is_checkbox = original.is_checkbox;
        next.collapsed = original.collapsed;
        let next_id = self.insert_at(&mut txn, next, slot + 1);

        let children = self.index.children(Some(id)).to_vec();
        for (position, child) in children.into_iter().enumerate() {
            self.relocate(&mut txn, child, Some(next_id), position);
        }
        self.selection.set_focus(Some(Focus::start(next_id)));
        self.selection.clear_selection();
        Ok(self.commit(txn))
    }

    /// Appends `id`'s content to its previous sibling, or to its parent when
    /// it is the first child, then removes it.
    ///
    /// Children move under the target: after the sibling's own children, or
    /// into `id`'s old slot under the parent. No-op when there is no target
    /// or the target is the zoom root.
    pub fn merge_with_previous(&mut self, id: NodeId) -> MutationResult<CommandOutcome> {
        let content = self.store.get(id)?.content.clone();
        let (parent, slot) = self.locate(id)?;
        let previous = self.index.previous_sibling(id);
        let Some(target) = previous.or(parent) else {
            return Ok(self.snapshot(false));
        };
        if Some(target) == self.selection.zoom_root() {
            return Ok(self.snapshot(false));
        }
        let boundary = self.store.get(target)?.content_len();

        let mut txn = self.begin(ChangeKind::Merge);
        self.edit_node(&mut txn, target, |node| node.content.push_str(&content));
        let children = self.index.children(Some(id)).to_vec();
        let base = if previous.is_some() {
            self.index.children(Some(target)).len()
        } else {
            slot
        };
        for (position, child) in children.into_iter().enumerate() {
            self.relocate(&mut txn, child, Some(target), base + position);
        }
        self.remove_subtree(&mut txn, id);
        self.selection.set_focus(Some(Focus::at(target, boundary)));
        self.selection.clear_selection();
        Ok(self.commit(txn))
    }

    /// Deletes a node. With `cascade` its subtree goes too; otherwise its
    /// children take its place. Deleting everything is a no-op.
    pub fn delete_node(&mut self, id: NodeId, cascade: bool) -> MutationResult<CommandOutcome> {
        self.store.get(id)?;
        let removed: HashSet<NodeId> = if cascade {
            self.index.subtree(id).into_iter().collect()
        } else {
            HashSet::from([id])
        };
        if removed.len() >= self.store.len() {
            info!("event=mutation module=engine status=noop kind=delete reason=last_node");
            return Ok(self.snapshot(false));
        }
        let focus = self.focus_after_removal(&removed);
        let (parent, slot) = self.locate(id)?;

        let mut txn = self.begin(ChangeKind::Delete);
        if !cascade {
            let children = self.index.children(Some(id)).to_vec();
            for (position, child) in children.into_iter().enumerate() {
                self.relocate(&mut txn, child, parent, slot + 1 + position);
            }
        }
        self.remove_subtree(&mut txn, id);
        self.selection.set_focus(focus);
        Ok(self.commit(txn))
    }

    /// Makes `id` the last child of its previous sibling, expanding it.
    pub fn indent(&mut self, id: NodeId) -> MutationResult<CommandOutcome> {
        self.store.get(id)?;
        let mut txn = self.begin(ChangeKind::Indent);
        self.indent_in(&mut txn, id);
        Ok(self.commit(txn))
    }

    /// Makes `id` the next sibling of its parent; the siblings that followed
    /// it become its trailing children.
    pub fn outdent(&mut self, id: NodeId) -> MutationResult<CommandOutcome> {
        self.store.get(id)?;
        let mut txn = self.begin(ChangeKind::Outdent);
        self.outdent_in(&mut txn, id);
        Ok(self.commit(txn))
    }

    /// Swaps `id` with its previous sibling.
    pub fn move_up(&mut self, id: NodeId) -> MutationResult<CommandOutcome> {
        let (parent, slot) = self.locate(id)?;
        if slot == 0 {
            return Ok(self.snapshot(false));
        }
        let mut txn = self.begin(ChangeKind::MoveUp);
        self.relocate(&mut txn, id, parent, slot - 1);
        Ok(self.commit(txn))
    }

    /// Swaps `id` with its next sibling.
    pub fn move_down(&mut self, id: NodeId) -> MutationResult<CommandOutcome> {
        let (parent, slot) = self.locate(id)?;
        if slot + 1 >= self.index.children(parent).len() {
            return Ok(self.snapshot(false));
        }
        let mut txn = self.begin(ChangeKind::MoveDown);
        self.relocate(&mut txn, id, parent, slot + 1);
        Ok(self.commit(txn))
    }

    /// Moves `id` under `new_parent` at `index`, clamped to the sibling count.
    ///
    /// # Errors
    /// - `InvalidOperation` when `new_parent` is `id` or one of its
    ///   descendants.
    pub fn move_node(
        &mut self,
        id: NodeId,
        new_parent: Option<NodeId>,
        index: usize,
    ) -> MutationResult<CommandOutcome> {
        self.store.get(id)?;
        if let Some(parent) = new_parent {
            self.store.get(parent)?;
            if parent == id || self.index.is_ancestor(id, parent) {
                return Err(MutationError::InvalidOperation(format!(
                    "cannot move {id} under itself or its descendant {parent}"
                )));
            }
        }
        let (old_parent, old_slot) = self.locate(id)?;
        let available = self
            .index
            .children(new_parent)
            .iter()
            .filter(|sibling| **sibling != id)
            .count();
        let slot = index.min(available);
        if old_parent == new_parent && old_slot == slot {
            return Ok(self.snapshot(false));
        }

        let mut txn = self.begin(ChangeKind::Move);
        self.relocate(&mut txn, id, new_parent, slot);
        Ok(self.commit(txn))
    }

    /// Adds externally parsed nodes in one undoable step.
    ///
    /// Parents must resolve to existing nodes or to nodes in the batch.
    /// Order keys are reassigned: per parent, batch nodes follow existing
    /// children in input order.
    pub fn import_nodes(&mut self, nodes: Vec<Node>) -> MutationResult<CommandOutcome> {
        if nodes.is_empty() {
            return Ok(self.snapshot(false));
        }
        let mut batch: HashMap<NodeId, Option<NodeId>> = HashMap::with_capacity(nodes.len());
        for node in &nodes {
            if self.store.exists(node.id) || batch.insert(node.id, node.parent_id).is_some() {
                return Err(MutationError::InvalidOperation(format!(
                    "imported node {} already exists",
                    node.id
                )));
            }
        }
        for node in &nodes {
            let mut cursor = node.parent_id;
            let mut steps = 0;
            while let Some(parent) = cursor {
                if self.store.exists(parent) {
                    break;
                }
                let Some(next) = batch.get(&parent) else {
                    return Err(MutationError::InvalidOperation(format!(
                        "imported node {} references missing parent {parent}",
                        node.id
                    )));
                };
                steps += 1;
                if steps > batch.len() {
                    return Err(MutationError::InvalidOperation(format!(
                        "imported node {} is part of a parent cycle",
                        node.id
                    )));
                }
                cursor = *next;
            }
        }

        let mut next_keys: HashMap<Option<NodeId>, i64> = HashMap::new();
        let mut keyed = Vec::with_capacity(nodes.len());
        for mut node in nodes {
            let index = &self.index;
            let key = next_keys.entry(node.parent_id).or_insert_with(|| {
                index
                    .children(node.parent_id)
                    .last()
                    .and_then(|last| index.order_key(*last))
                    .map_or(0, |last| last.saturating_add(ORDER_KEY_STEP))
            });
            node.order_key = *key;
            *key = key.checked_add(ORDER_KEY_STEP).ok_or_else(|| {
                MutationError::InvalidOperation("order key space exhausted".to_string())
            })?;
            keyed.push(node);
        }

        let mut txn = self.begin(ChangeKind::Import);
        for node in keyed {
            txn.touch(node.id, None);
            self.store.put(node);
        }
        self.index.rebuild_full(self.store.iter());
        info!(
            "event=import module=engine status=ok nodes={}",
            self.store.len()
        );
        Ok(self.commit(txn))
    }

    pub(super) fn indent_in(&mut self, txn: &mut Transaction, id: NodeId) -> bool {
        let Some(previous) = self.index.previous_sibling(id) else {
            return false;
        };
        if self.store.get(previous).is_ok_and(|node| node.collapsed) {
            self.edit_node(txn, previous, |node| node.collapsed = false);
        }
        let slot = self.index.children(Some(previous)).len();
        self.relocate(txn, id, Some(previous), slot);
        true
    }

    pub(super) fn outdent_in(&mut self, txn: &mut Transaction, id: NodeId) -> bool {
        let Some(parent) = self.index.parent_of(id).flatten() else {
            return false;
        };
        if Some(parent) == self.selection.zoom_root() {
            return false;
        }
        let (Some(own_slot), Some(parent_slot)) =
            (self.index.sibling_index(id), self.index.sibling_index(parent))
        else {
            return false;
        };
        let grandparent = self.index.parent_of(parent).flatten();
        let following = self.index.children(Some(parent))[own_slot + 1..].to_vec();

        self.relocate(txn, id, grandparent, parent_slot + 1);
        if !following.is_empty() && self.store.get(id).is_ok_and(|node| node.collapsed) {
            self.edit_node(txn, id, |node| node.collapsed = false);
        }
        let base = self.index.children(Some(id)).len();
        for (position, sibling) in following.into_iter().enumerate() {
            self.relocate(txn, sibling, Some(id), base + position);
        }
        true
    }
}
