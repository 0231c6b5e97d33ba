//! Per-command change recording.
//!
//! # Invariants
//! - The first snapshot taken for a node is its pre-command state.
//! - `finish` drops nodes whose final state equals their first snapshot.

use crate::history::{ChangeKind, NodeChange};
use crate::model::node::{Node, NodeId};
use crate::selection::Focus;
use crate::store::node_store::NodeStore;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

#[derive(Debug)]
pub(super) struct Transaction {
    pub(super) kind: ChangeKind,
    pub(super) focus_before: Option<Focus>,
    pub(super) zoom_before: Option<NodeId>,
    /// Rows visible under the zoom root before the command; 0 when unzoomed.
    pub(super) visible_before: usize,
    touched: Vec<NodeId>,
    before: HashMap<NodeId, Option<Node>>,
}

impl Transaction {
    pub(super) fn new(
        kind: ChangeKind,
        focus_before: Option<Focus>,
        zoom_before: Option<NodeId>,
        visible_before: usize,
    ) -> Self {
        Self {
            kind,
            focus_before,
            zoom_before,
            visible_before,
            touched: Vec::new(),
            before: HashMap::new(),
        }
    }

    /// Remembers `current` as the pre-command state of `id`.
    /// Call before every write.
    pub(super) fn touch(&mut self, id: NodeId, current: Option<&Node>) {
        if let Entry::Vacant(slot) = self.before.entry(id) {
            slot.insert(current.cloned());
            self.touched.push(id);
        }
    }

    /// Parent a node had before the command, if it existed then.
    pub(super) fn prior_parent(&self, id: NodeId) -> Option<Option<NodeId>> {
        self.before
            .get(&id)
            .and_then(Option::as_ref)
            .map(|node| node.parent_id)
    }

    pub(super) fn finish(mut self, store: &NodeStore) -> Vec<NodeChange> {
        let mut changes = Vec::with_capacity(self.touched.len());
        for id in self.touched {
            let before = self.before.remove(&id).flatten();
            let after = store.get(id).ok().cloned();
            if before != after {
                changes.push(NodeChange { id, before, after });
            }
        }
        changes
    }
}
