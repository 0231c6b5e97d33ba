//! Hierarchical index derived from the node store.
//!
//! # Responsibility
//! - Keep ordered children lists, parent links, order keys and depths.
//! - Patch those structures surgically so cost tracks the changed subtree.
//! - Produce the visible projection honouring collapse and zoom.
//!
//! # Invariants
//! - Children lists are sorted by strictly increasing order key.
//! - `depth(child) == depth(parent) + 1`; root-level nodes have depth 0.
//! - Any failed self-check is reported as `IndexError`; callers recover with
//!   `rebuild_full`.

use crate::model::node::{Node, NodeId, OrderKey};
use crate::store::node_store::NodeStore;
use log::warn;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type for surgical index updates.
pub type IndexResult<T> = Result<T, IndexError>;

/// Internal consistency failures detected while patching the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Node is not present in the index.
    UnknownNode(NodeId),
    /// Parent referenced by a node is not present in the index.
    UnknownParent(NodeId),
    /// Sibling anchor is not a child of the expected parent.
    UnknownSibling(NodeId),
    /// Insert target is already indexed.
    AlreadyIndexed(NodeId),
    /// Move target slot is past the end of the sibling list.
    PositionOutOfRange {
        parent: Option<NodeId>,
        index: usize,
        len: usize,
    },
    /// Order keys around a slot are not strictly increasing.
    OrderMismatch {
        parent: Option<NodeId>,
        node: NodeId,
    },
    /// Move would place a node under itself.
    Cycle(NodeId),
    /// Index and store disagree.
    Drift(String),
}

impl Display for IndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownNode(id) => write!(f, "node not indexed: {id}"),
            Self::UnknownParent(id) => write!(f, "parent not indexed: {id}"),
            Self::UnknownSibling(id) => write!(f, "sibling anchor not found: {id}"),
            Self::AlreadyIndexed(id) => write!(f, "node already indexed: {id}"),
            Self::PositionOutOfRange { parent, index, len } => write!(
                f,
                "slot {index} out of range for {len} children of {}",
                describe_parent(*parent)
            ),
            Self::OrderMismatch { parent, node } => write!(
                f,
                "order keys out of sequence at {node} under {}",
                describe_parent(*parent)
            ),
            Self::Cycle(id) => write!(f, "move would make {id} its own ancestor"),
            Self::Drift(details) => write!(f, "index drift: {details}"),
        }
    }
}

impl Error for IndexError {}

fn describe_parent(parent: Option<NodeId>) -> String {
    parent.map_or_else(|| "root".to_string(), |id| id.to_string())
}

/// One row of the visible projection consumed by the view layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VisibleRow {
    pub id: NodeId,
    /// Depth relative to the projection top level.
    pub depth: usize,
    pub collapsed: bool,
    pub has_children: bool,
}

/// Ordered visible rows plus an id -> row lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    rows: Vec<VisibleRow>,
    positions: HashMap<NodeId, usize>,
    zoom_root: Option<NodeId>,
}

impl Projection {
    pub fn rows(&self) -> &[VisibleRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&VisibleRow> {
        self.rows.get(position)
    }

    pub fn first(&self) -> Option<&VisibleRow> {
        self.rows.first()
    }

    pub fn last(&self) -> Option<&VisibleRow> {
        self.rows.last()
    }

    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.positions.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.rows.iter().map(|row| row.id).collect()
    }

    /// Zoom root this projection was computed for.
    pub fn zoom_root(&self) -> Option<NodeId> {
        self.zoom_root
    }
}

/// Derived parent -> children ordering, keys and depths.
#[derive(Debug, Clone, Default)]
pub struct TreeIndex {
    children: HashMap<Option<NodeId>, Vec<NodeId>>,
    parents: HashMap<NodeId, Option<NodeId>>,
    keys: HashMap<NodeId, OrderKey>,
    depths: HashMap<NodeId, usize>,
}

impl TreeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from scratch.
    pub fn from_nodes<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        let mut index = Self::new();
        index.rebuild_full(nodes);
        index
    }

    /// Recomputes every derived structure. O(n log n) for sorting siblings.
    pub fn rebuild_full<'a>(&mut self, nodes: impl IntoIterator<Item = &'a Node>) {
        self.children.clear();
        self.parents.clear();
        self.keys.clear();
        self.depths.clear();

        let mut grouped: HashMap<Option<NodeId>, Vec<(OrderKey, NodeId)>> = HashMap::new();
        for node in nodes {
            self.parents.insert(node.id, node.parent_id);
            self.keys.insert(node.id, node.order_key);
            grouped
                .entry(node.parent_id)
                .or_default()
                .push((node.order_key, node.id));
        }

        let orphan_parents: Vec<Option<NodeId>> = grouped
            .keys()
            .filter(|parent| matches!(parent, Some(id) if !self.parents.contains_key(id)))
            .copied()
            .collect();
        for parent in orphan_parents {
            let Some(entries) = grouped.remove(&parent) else {
                continue;
            };
            warn!(
                "event=index_orphans module=index status=repaired parent={} count={}",
                describe_parent(parent),
                entries.len()
            );
            for (_, id) in &entries {
                self.parents.insert(*id, None);
            }
            grouped.entry(None).or_default().extend(entries);
        }

        for (parent, mut entries) in grouped {
            entries.sort_unstable();
            self.children
                .insert(parent, entries.into_iter().map(|(_, id)| id).collect());
        }

        let mut stack: Vec<(NodeId, usize)> = self
            .children(None)
            .iter()
            .rev()
            .map(|id| (*id, 0))
            .collect();
        while let Some((id, depth)) = stack.pop() {
            if self.depths.insert(id, depth).is_some() {
                continue;
            }
            stack.extend(self.children(Some(id)).iter().rev().map(|kid| (*kid, depth + 1)));
        }

        let unreachable = self.parents.len() - self.depths.len();
        if unreachable > 0 {
            warn!(
                "event=index_rebuild module=index status=degraded unreachable={}",
                unreachable
            );
        }
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.parents.contains_key(&id)
    }

    /// Ordered children of `parent` (`None` = root level).
    pub fn children(&self, parent: Option<NodeId>) -> &[NodeId] {
        self.children.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        !self.children(Some(id)).is_empty()
    }

    /// Returns `None` when `id` is not indexed, `Some(None)` for root level.
    pub fn parent_of(&self, id: NodeId) -> Option<Option<NodeId>> {
        self.parents.get(&id).copied()
    }

    pub fn order_key(&self, id: NodeId) -> Option<OrderKey> {
        self.keys.get(&id).copied()
    }

    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.depths.get(&id).copied()
    }

    /// Position among siblings. O(children of parent).
    pub fn sibling_index(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent_of(id)?;
        self.children(parent).iter().position(|sibling| *sibling == id)
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent_of(id)?;
        let index = self.sibling_index(id)?;
        index
            .checked_sub(1)
            .and_then(|previous| self.children(parent).get(previous))
            .copied()
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent_of(id)?;
        let index = self.sibling_index(id)?;
        self.children(parent).get(index + 1).copied()
    }

    /// Returns whether `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cursor = self.parent_of(id).flatten();
        let mut steps = 0;
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.parents.len() {
                return false;
            }
            cursor = self.parent_of(current).flatten();
        }
        false
    }

    /// Node and all descendants in pre-order.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        if !self.contains(id) {
            return Vec::new();
        }
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            result.push(current);
            stack.extend(self.children(Some(current)).iter().rev().copied());
        }
        result
    }

    /// Every indexed node in document (pre-)order.
    pub fn document_order(&self) -> Vec<NodeId> {
        let mut result = Vec::with_capacity(self.parents.len());
        let mut stack: Vec<NodeId> = self.children(None).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            result.push(current);
            stack.extend(self.children(Some(current)).iter().rev().copied());
        }
        result
    }

    /// Inserts a new leaf right after `after` (or first when `None`).
    pub fn apply_insert(&mut self, node: &Node, after: Option<NodeId>) -> IndexResult<()> {
        if self.contains(node.id) {
            return Err(IndexError::AlreadyIndexed(node.id));
        }
        let depth = self.child_depth(node.parent_id)?;
        let siblings = self.children.entry(node.parent_id).or_default();
        let index = match after {
            Some(anchor) => {
                siblings
                    .iter()
                    .position(|sibling| *sibling == anchor)
                    .ok_or(IndexError::UnknownSibling(anchor))?
                    + 1
            }
            None => 0,
        };
        siblings.insert(index, node.id);
        self.parents.insert(node.id, node.parent_id);
        self.keys.insert(node.id, node.order_key);
        self.depths.insert(node.id, depth);
        self.check_slot(node.parent_id, index)
    }

    /// Removes a node with all descendants; returns removed ids in pre-order.
    pub fn apply_remove(&mut self, id: NodeId) -> IndexResult<Vec<NodeId>> {
        let parent = self.parent_of(id).ok_or(IndexError::UnknownNode(id))?;
        let removed = self.subtree(id);
        self.detach(id, parent)?;
        for node in &removed {
            self.parents.remove(node);
            self.keys.remove(node);
            self.depths.remove(node);
            self.children.remove(&Some(*node));
        }
        Ok(removed)
    }

    /// Moves `node.id` under `node.parent_id` at `index` (counted without the
    /// node itself) and refreshes depths over the moved subtree only.
    pub fn apply_move(&mut self, node: &Node, index: usize) -> IndexResult<()> {
        let id = node.id;
        let old_parent = self.parent_of(id).ok_or(IndexError::UnknownNode(id))?;
        if let Some(parent) = node.parent_id {
            if !self.contains(parent) {
                return Err(IndexError::UnknownParent(parent));
            }
            if parent == id || self.is_ancestor(id, parent) {
                return Err(IndexError::Cycle(id));
            }
        }

        let mut len = self.children(node.parent_id).len();
        if old_parent == node.parent_id {
            len -= 1;
        }
        if index > len {
            return Err(IndexError::PositionOutOfRange {
                parent: node.parent_id,
                index,
                len,
            });
        }

        self.detach(id, old_parent)?;
        self.children
            .entry(node.parent_id)
            .or_default()
            .insert(index, id);
        self.parents.insert(id, node.parent_id);
        self.keys.insert(id, node.order_key);
        let depth = self.child_depth(node.parent_id)?;
        self.set_subtree_depth(id, depth);
        self.check_slot(node.parent_id, index)
    }

    /// Replaces order keys without reordering; verifies touched slots.
    pub fn apply_rekey(&mut self, updates: &[(NodeId, OrderKey)]) -> IndexResult<()> {
        for (id, key) in updates {
            if !self.contains(*id) {
                return Err(IndexError::UnknownNode(*id));
            }
            self.keys.insert(*id, *key);
        }
        for (id, _) in updates {
            let parent = self.parent_of(*id).ok_or(IndexError::UnknownNode(*id))?;
            let index = self
                .sibling_index(*id)
                .ok_or_else(|| IndexError::Drift(format!("{id} missing from sibling list")))?;
            self.check_slot(parent, index)?;
        }
        Ok(())
    }

    /// Moves the index to the given per-node target states.
    ///
    /// Each target is the node's new record, or `None` when it no longer
    /// exists. Nodes not listed keep their position.
    pub fn apply_patch(&mut self, targets: &[(NodeId, Option<&Node>)]) -> IndexResult<()> {
        for (id, _) in targets {
            if let Some(parent) = self.parent_of(*id) {
                self.detach(*id, parent)?;
            }
        }

        for (id, target) in targets {
            match target {
                Some(node) => {
                    self.parents.insert(*id, node.parent_id);
                    self.keys.insert(*id, node.order_key);
                }
                None => {
                    self.parents.remove(id);
                    self.keys.remove(id);
                    self.depths.remove(id);
                }
            }
        }

        for (id, target) in targets {
            let Some(node) = target else {
                if self
                    .children
                    .remove(&Some(*id))
                    .is_some_and(|kids| !kids.is_empty())
                {
                    return Err(IndexError::Drift(format!("removed {id} still has children")));
                }
                continue;
            };
            if let Some(parent) = node.parent_id {
                if !self.contains(parent) {
                    return Err(IndexError::UnknownParent(parent));
                }
            }
            let keys = &self.keys;
            let siblings = self.children.entry(node.parent_id).or_default();
            let slot = siblings.partition_point(|sibling| {
                keys.get(sibling).copied().unwrap_or(OrderKey::MIN) < node.order_key
            });
            siblings.insert(slot, *id);
        }

        let patched: HashSet<NodeId> = targets
            .iter()
            .filter(|(_, target)| target.is_some())
            .map(|(id, _)| *id)
            .collect();
        for (id, target) in targets {
            let Some(node) = target else {
                continue;
            };
            if node.parent_id.is_some_and(|parent| patched.contains(&parent)) {
                continue;
            }
            let depth = self.child_depth(node.parent_id)?;
            self.set_subtree_depth(*id, depth);
        }
        for id in &patched {
            if !self.depths.contains_key(id) {
                return Err(IndexError::Cycle(*id));
            }
        }
        Ok(())
    }

    /// Full consistency check against the store.
    pub fn verify(&self, store: &NodeStore) -> IndexResult<()> {
        if self.parents.len() != store.len() {
            return Err(IndexError::Drift(format!(
                "index holds {} nodes, store holds {}",
                self.parents.len(),
                store.len()
            )));
        }
        for node in store.iter() {
            if self.parent_of(node.id) != Some(node.parent_id) {
                return Err(IndexError::Drift(format!("parent mismatch for {}", node.id)));
            }
            if self.order_key(node.id) != Some(node.order_key) {
                return Err(IndexError::Drift(format!("order key mismatch for {}", node.id)));
            }
            let expected_depth = match node.parent_id {
                Some(parent) => self.depth(parent).map(|depth| depth + 1),
                None => Some(0),
            };
            if self.depth(node.id) != expected_depth {
                return Err(IndexError::Drift(format!("depth mismatch for {}", node.id)));
            }
        }

        let mut listed = 0;
        for (parent, kids) in &self.children {
            listed += kids.len();
            for kid in kids {
                if self.parent_of(*kid) != Some(*parent) {
                    return Err(IndexError::Drift(format!("{kid} listed under wrong parent")));
                }
            }
            for pair in kids.windows(2) {
                if self.order_key(pair[0]) >= self.order_key(pair[1]) {
                    return Err(IndexError::OrderMismatch {
                        parent: *parent,
                        node: pair[1],
                    });
                }
            }
        }
        if listed != self.parents.len() {
            return Err(IndexError::Drift(format!(
                "{listed} listed children for {} nodes",
                self.parents.len()
            )));
        }
        Ok(())
    }

    /// Computes visible rows below `zoom_root` (or the whole forest).
    ///
    /// The zoom root itself is not a row, and its own `collapsed` flag is
    /// ignored so zooming into a collapsed node still shows its children.
    pub fn project(&self, store: &NodeStore, zoom_root: Option<NodeId>) -> Projection {
        let base_depth = zoom_root
            .and_then(|root| self.depth(root))
            .map_or(0, |depth| depth + 1);
        let mut rows = Vec::new();
        let mut positions = HashMap::new();
        let mut stack: Vec<NodeId> = self.children(zoom_root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Ok(node) = store.get(id) else {
                continue;
            };
            let kids = self.children(Some(id));
            positions.insert(id, rows.len());
            rows.push(VisibleRow {
                id,
                depth: self
                    .depth(id)
                    .unwrap_or(base_depth)
                    .saturating_sub(base_depth),
                collapsed: node.collapsed,
                has_children: !kids.is_empty(),
            });
            if !node.collapsed {
                stack.extend(kids.iter().rev().copied());
            }
        }
        Projection {
            rows,
            positions,
            zoom_root,
        }
    }

    fn child_depth(&self, parent: Option<NodeId>) -> IndexResult<usize> {
        match parent {
            Some(parent) => self
                .depth(parent)
                .map(|depth| depth + 1)
                .ok_or(IndexError::UnknownParent(parent)),
            None => Ok(0),
        }
    }

    fn detach(&mut self, id: NodeId, parent: Option<NodeId>) -> IndexResult<()> {
        let siblings = self
            .children
            .get_mut(&parent)
            .ok_or_else(|| IndexError::Drift(format!("no sibling list for {id}")))?;
        let position = siblings
            .iter()
            .position(|sibling| *sibling == id)
            .ok_or_else(|| IndexError::Drift(format!("{id} missing from sibling list")))?;
        siblings.remove(position);
        if siblings.is_empty() && parent.is_some() {
            self.children.remove(&parent);
        }
        Ok(())
    }

    fn set_subtree_depth(&mut self, id: NodeId, depth: usize) {
        let mut stack = vec![(id, depth)];
        let mut budget = self.parents.len();
        while let Some((current, depth)) = stack.pop() {
            if budget == 0 {
                break;
            }
            budget -= 1;
            self.depths.insert(current, depth);
            stack.extend(
                self.children(Some(current))
                    .iter()
                    .map(|kid| (*kid, depth + 1)),
            );
        }
    }

    fn check_slot(&self, parent: Option<NodeId>, index: usize) -> IndexResult<()> {
        let siblings = self.children(parent);
        let Some(id) = siblings.get(index).copied() else {
            return Err(IndexError::PositionOutOfRange {
                parent,
                index,
                len: siblings.len(),
            });
        };
        let key = self.order_key(id).ok_or(IndexError::UnknownNode(id))?;
        let before_ok = index
            .checked_sub(1)
            .and_then(|previous| siblings.get(previous))
            .map_or(true, |previous| {
                self.order_key(*previous).is_some_and(|other| other < key)
            });
        let after_ok = siblings.get(index + 1).map_or(true, |next| {
            self.order_key(*next).is_some_and(|other| other > key)
        });
        if before_ok && after_ok {
            Ok(())
        } else {
            Err(IndexError::OrderMismatch { parent, node: id })
        }
    }
}
