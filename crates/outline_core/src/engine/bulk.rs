//! Multi-selection structural commands.
//!
//! # Invariants
//! - All ids are validated before anything is written.
//! - Each single-node operation runs once per id, in document order, inside
//!   one transaction. `move_down_many` walks the same order bottom-up so a
//!   selected block shifts as a unit.
//! - Deletion targets are topmost only: an id whose ancestor is also
//!   targeted goes with that ancestor.
//! - One history entry per call, whatever the number of targets.

use super::error::MutationResult;
use super::{CommandOutcome, MutationEngine};
use crate::history::ChangeKind;
use crate::model::node::NodeId;
use log::info;
use std::collections::HashSet;

impl MutationEngine {
    pub fn indent_many(&mut self, ids: &[NodeId]) -> MutationResult<CommandOutcome> {
        let targets = self.ordered_targets(ids)?;
        let mut txn = self.begin(ChangeKind::Indent);
        for id in targets {
            self.indent_in(&mut txn, id);
        }
        Ok(self.commit(txn))
    }

    pub fn outdent_many(&mut self, ids: &[NodeId]) -> MutationResult<CommandOutcome> {
        let targets = self.ordered_targets(ids)?;
        let mut txn = self.begin(ChangeKind::Outdent);
        for id in targets {
            self.outdent_in(&mut txn, id);
        }
        Ok(self.commit(txn))
    }

    pub fn move_up_many(&mut self, ids: &[NodeId]) -> MutationResult<CommandOutcome> {
        let targets = self.ordered_targets(ids)?;
        let mut txn = self.begin(ChangeKind::MoveUp);
        for id in targets {
            let (Some(parent), Some(slot)) = (self.index.parent_of(id), self.index.sibling_index(id))
            else {
                continue;
            };
            if slot > 0 {
                self.relocate(&mut txn, id, parent, slot - 1);
            }
        }
        Ok(self.commit(txn))
    }

    pub fn move_down_many(&mut self, ids: &[NodeId]) -> MutationResult<CommandOutcome> {
        let targets = self.ordered_targets(ids)?;
        let mut txn = self.begin(ChangeKind::MoveDown);
        for id in targets.into_iter().rev() {
            let (Some(parent), Some(slot)) = (self.index.parent_of(id), self.index.sibling_index(id))
            else {
                continue;
            };
            if slot + 1 < self.index.children(parent).len() {
                self.relocate(&mut txn, id, parent, slot + 1);
            }
        }
        Ok(self.commit(txn))
    }

    /// Deletes every target with its subtree and clears the selection.
    /// Targets whose removal would empty the document are skipped.
    pub fn delete_many(&mut self, ids: &[NodeId]) -> MutationResult<CommandOutcome> {
        let targets = self.topmost_targets(ids)?;
        let mut removed = HashSet::new();
        let mut roots = Vec::with_capacity(targets.len());
        for id in targets {
            let subtree = self.index.subtree(id);
            if subtree.len() >= self.store.len() - removed.len() {
                info!("event=mutation module=engine status=skipped kind=delete reason=last_node node={id}");
                continue;
            }
            removed.extend(subtree);
            roots.push(id);
        }
        if roots.is_empty() {
            return Ok(self.snapshot(false));
        }

        let focus = self.focus_after_removal(&removed);
        let mut txn = self.begin(ChangeKind::Delete);
        for id in roots {
            self.remove_subtree(&mut txn, id);
        }
        self.selection.set_focus(focus);
        self.selection.clear_selection();
        Ok(self.commit(txn))
    }

    /// Validates ids and returns them deduplicated in document order.
    fn ordered_targets(&self, ids: &[NodeId]) -> MutationResult<Vec<NodeId>> {
        for id in ids {
            self.store.get(*id)?;
        }
        let requested: HashSet<NodeId> = ids.iter().copied().collect();
        Ok(self.in_document_order(requested.into_iter()))
    }

    /// Like `ordered_targets`, dropping ids whose ancestor is also requested.
    fn topmost_targets(&self, ids: &[NodeId]) -> MutationResult<Vec<NodeId>> {
        let ordered = self.ordered_targets(ids)?;
        let requested: HashSet<NodeId> = ordered.iter().copied().collect();
        Ok(ordered
            .into_iter()
            .filter(|id| {
                let mut cursor = self.index.parent_of(*id).flatten();
                while let Some(ancestor) = cursor {
                    if requested.contains(&ancestor) {
                        return false;
                    }
                    cursor = self.index.parent_of(ancestor).flatten();
                }
                true
            })
            .collect())
    }
}
