//! Payload commands: content, completion, collapse and metadata.

use super::error::MutationResult;
use super::{CommandOutcome, MutationEngine};
use crate::history::ChangeKind;
use crate::model::node::{Node, NodeId};
use crate::selection::Focus;
use log::info;
use std::collections::{BTreeSet, HashSet};

impl MutationEngine {
    /// Replaces content. Rapid edits on one node share an undo entry.
    pub fn set_content(
        &mut self,
        id: NodeId,
        content: impl Into<String>,
    ) -> MutationResult<CommandOutcome> {
        let content = content.into();
        self.edit_payload(ChangeKind::EditContent, id, |node| node.content = content)
    }

    pub fn set_note(&mut self, id: NodeId, note: Option<String>) -> MutationResult<CommandOutcome> {
        self.edit_payload(ChangeKind::EditAttributes, id, |node| node.note = note)
    }

    pub fn set_checkbox(&mut self, id: NodeId, is_checkbox: bool) -> MutationResult<CommandOutcome> {
        self.edit_payload(ChangeKind::EditAttributes, id, |node| {
            node.is_checkbox = is_checkbox
        })
    }

    pub fn set_tags(
        &mut self,
        id: NodeId,
        tags: impl IntoIterator<Item = String>,
    ) -> MutationResult<CommandOutcome> {
        let tags: BTreeSet<String> = tags.into_iter().collect();
        self.edit_payload(ChangeKind::EditAttributes, id, |node| node.tags = tags)
    }

    pub fn set_due_date(&mut self, id: NodeId, due_date: Option<i64>) -> MutationResult<CommandOutcome> {
        self.edit_payload(ChangeKind::EditAttributes, id, |node| node.due_date = due_date)
    }

    pub fn set_recurrence_rule(
        &mut self,
        id: NodeId,
        rule: Option<String>,
    ) -> MutationResult<CommandOutcome> {
        self.edit_payload(ChangeKind::EditAttributes, id, |node| {
            node.recurrence_rule = rule
        })
    }

    /// Collapses or expands `id`. Collapsing pulls focus out of the hidden
    /// subtree onto `id`.
    pub fn set_collapsed(&mut self, id: NodeId, collapsed: bool) -> MutationResult<CommandOutcome> {
        self.store.get(id)?;
        let mut txn = self.begin(ChangeKind::Collapse);
        self.edit_node(&mut txn, id, |node| node.collapsed = collapsed);
        if collapsed
            && self
                .selection
                .focused_id()
                .is_some_and(|focused| self.index.is_ancestor(id, focused))
        {
            self.selection.set_focus(Some(Focus::end(id)));
        }
        Ok(self.commit(txn))
    }

    /// Toggles completion of one node.
    pub fn toggle_complete(&mut self, id: NodeId) -> MutationResult<CommandOutcome> {
        self.toggle_complete_many(&[id])
    }

    /// If any target is incomplete all become complete, otherwise all become
    /// incomplete. Selection is preserved.
    pub fn toggle_complete_many(&mut self, ids: &[NodeId]) -> MutationResult<CommandOutcome> {
        for id in ids {
            self.store.get(*id)?;
        }
        let targets = self.in_document_order(ids.iter().copied().collect::<HashSet<_>>());
        if targets.is_empty() {
            return Ok(self.snapshot(false));
        }
        let complete = targets
            .iter()
            .any(|id| self.store.get(*id).is_ok_and(|node| !node.completed));

        let mut txn = self.begin(ChangeKind::ToggleComplete);
        for id in targets {
            self.edit_node(&mut txn, id, |node| node.completed = complete);
        }
        Ok(self.commit(txn))
    }

    /// Removes every completed node with its subtree. A removal that would
    /// leave the document empty is skipped.
    pub fn delete_completed_items(&mut self) -> MutationResult<CommandOutcome> {
        let mut removed = HashSet::new();
        let mut roots = Vec::new();
        for id in self.index.document_order() {
            let parent_removed = self
                .index
                .parent_of(id)
                .flatten()
                .is_some_and(|parent| removed.contains(&parent));
            if parent_removed {
                removed.insert(id);
                continue;
            }
            if !self.store.get(id).is_ok_and(|node| node.completed) {
                continue;
            }
            let subtree = self.index.subtree(id).len();
            if subtree >= self.store.len() - removed.len() {
                info!("event=mutation module=engine status=skipped kind=delete_completed reason=last_node node={id}");
                continue;
            }
            removed.insert(id);
            roots.push(id);
        }
        if roots.is_empty() {
            return Ok(self.snapshot(false));
        }

        let focus = self.focus_after_removal(&removed);
        let mut txn = self.begin(ChangeKind::DeleteCompleted);
        for id in roots {
            self.remove_subtree(&mut txn, id);
        }
        self.selection.set_focus(focus);
        self.selection.clear_selection();
        Ok(self.commit(txn))
    }

    fn edit_payload(
        &mut self,
        kind: ChangeKind,
        id: NodeId,
        edit: impl FnOnce(&mut Node),
    ) -> MutationResult<CommandOutcome> {
        self.store.get(id)?;
        let mut txn = self.begin(kind);
        self.edit_node(&mut txn, id, edit);
        Ok(self.commit(txn))
    }
}
