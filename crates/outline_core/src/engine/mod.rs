//! Transactional mutation engine over the outline tree.
//!
//! # Responsibility
//! - Own the node store, tree index, selection, history and persistence
//!   queue of one open document.
//! - Run every command as validate, apply, commit.
//! - Keep the index in step with the store surgically and self-heal with a
//!   full rebuild when a surgical step reports drift.
//!
//! # Invariants
//! - Commands either fail before writing or settle completely.
//! - At least one node exists after every command.
//! - Each settled command yields exactly one history entry, one change event
//!   and its persistence operations; no-ops yield none of them.

mod attributes;
mod bulk;
pub mod error;
pub mod events;
mod structure;
mod txn;

use crate::config::{DeleteFocusPolicy, EngineConfig};
use crate::history::{ChangeKind, HistoryEntry, HistoryManager, NodeChange};
use crate::index::tree_index::{IndexError, IndexResult, Projection, TreeIndex};
use crate::model::node::{Node, NodeId, OrderKey, ORDER_KEY_STEP};
use crate::repo::node_repo::PersistenceAdapter;
use crate::repo::persist_queue::{FlushReport, PersistOp, PersistQueue};
use crate::selection::{Caret, Focus, SelectionController, SelectionState};
use crate::store::node_store::NodeStore;
use error::{MutationError, MutationResult};
use events::{ChangeEvent, ChangeOrigin, EventBus, SubscriberId};
use log::{debug, info, warn};
use once_cell::unsync::OnceCell;
use std::collections::HashSet;
use std::time::Instant;
use txn::Transaction;

/// State reported back to the caller after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// `false` for silent no-ops.
    pub applied: bool,
    pub focus: Option<Focus>,
    /// Selected ids in document order.
    pub selection: Vec<NodeId>,
    pub zoom_root: Option<NodeId>,
    pub created: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

#[derive(Debug)]
pub struct MutationEngine {
    config: EngineConfig,
    store: NodeStore,
    index: TreeIndex,
    selection: SelectionController,
    history: HistoryManager,
    events: EventBus,
    persistence: PersistQueue,
    projection: OnceCell<Projection>,
}

impl MutationEngine {
    /// Creates an engine holding one empty root node.
    ///
    /// The seed node is queued for persistence like any other new node.
    /// An invalid config is logged and clamped: zero limits become one.
    pub fn new(config: EngineConfig) -> Self {
        if let Err(err) = config.validate() {
            warn!("event=engine_config module=engine status=clamped reason={err}");
        }
        let seed = Node::new(None, 0, "");
        let mut store = NodeStore::new();
        store.put(seed.clone());
        let index = TreeIndex::from_nodes(store.iter());
        let mut engine = Self::assemble(config, store, index);
        engine
            .persistence
            .enqueue(PersistOp::Create(seed), Instant::now());
        engine
    }

    /// Loads persisted nodes. An empty list yields one blank node.
    ///
    /// # Errors
    /// - `InvalidOperation` for invalid config, duplicate ids, dangling
    ///   parents, cycles or duplicate sibling keys.
    pub fn from_nodes(config: EngineConfig, nodes: Vec<Node>) -> MutationResult<Self> {
        config
            .validate()
            .map_err(|err| MutationError::InvalidOperation(err.to_string()))?;

        if nodes.is_empty() {
            return Ok(Self::new(config));
        }
        let mut store = NodeStore::new();
        for node in nodes {
            if let Some(previous) = store.put(node) {
                return Err(MutationError::InvalidOperation(format!(
                    "duplicate node id {}",
                    previous.id
                )));
            }
        }

        let mut slots = HashSet::with_capacity(store.len());
        for node in store.iter() {
            if let Some(parent) = node.parent_id {
                if !store.exists(parent) {
                    return Err(MutationError::InvalidOperation(format!(
                        "node {} references missing parent {parent}",
                        node.id
                    )));
                }
            }
            if !slots.insert((node.parent_id, node.order_key)) {
                return Err(MutationError::InvalidOperation(format!(
                    "duplicate order key {} among siblings of {}",
                    node.order_key, node.id
                )));
            }
        }

        let index = TreeIndex::from_nodes(store.iter());
        if let Some(node) = store.iter().find(|node| index.depth(node.id).is_none()) {
            return Err(MutationError::InvalidOperation(format!(
                "node {} is part of a parent cycle",
                node.id
            )));
        }

        info!(
            "event=engine_load module=engine status=ok nodes={}",
            store.len()
        );
        Ok(Self::assemble(config, store, index))
    }

    fn assemble(config: EngineConfig, store: NodeStore, index: TreeIndex) -> Self {
        let history = HistoryManager::new(config.history_limit, config.text_coalesce_window());
        let persistence = PersistQueue::new(config.persist_debounce(), config.persist_max_attempts);
        Self {
            config,
            store,
            index,
            selection: SelectionController::new(),
            history,
            events: EventBus::new(),
            persistence,
            projection: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn node(&self, id: NodeId) -> MutationResult<&Node> {
        Ok(self.store.get(id)?)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.store.exists(id)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.store.iter()
    }

    pub fn children(&self, parent: Option<NodeId>) -> &[NodeId] {
        self.index.children(parent)
    }

    pub fn parent_of(&self, id: NodeId) -> MutationResult<Option<NodeId>> {
        Ok(self.store.get(id)?.parent_id)
    }

    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.index.depth(id)
    }

    pub fn document_order(&self) -> Vec<NodeId> {
        self.index.document_order()
    }

    /// Visible rows for the current zoom scope. Cached until the next change.
    pub fn projection(&self) -> &Projection {
        cached_projection(
            &self.projection,
            &self.index,
            &self.store,
            self.selection.zoom_root(),
        )
    }

    pub fn selection(&self) -> &SelectionController {
        &self.selection
    }

    pub fn selection_state(&self) -> SelectionState {
        self.selection.state()
    }

    pub fn focus(&self) -> Option<Focus> {
        self.selection.focus()
    }

    pub fn zoom_root(&self) -> Option<NodeId> {
        self.selection.zoom_root()
    }

    /// Verifies the index against the store.
    pub fn check_integrity(&self) -> MutationResult<()> {
        self.index.verify(&self.store)?;
        Ok(())
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&ChangeEvent) + 'static) -> SubscriberId {
        self.events.subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.events.unsubscribe(id)
    }

    // Focus, selection and zoom. None of these touch history.

    pub fn set_focus(&mut self, id: NodeId, caret: Caret) -> MutationResult<()> {
        self.store.get(id)?;
        self.selection.set_focus(Some(Focus { id, caret }));
        Ok(())
    }

    pub fn clear_focus(&mut self) {
        self.selection.set_focus(None);
    }

    pub fn click(&mut self, id: NodeId) -> MutationResult<()> {
        self.store.get(id)?;
        self.selection.click(id);
        Ok(())
    }

    pub fn toggle_click(&mut self, id: NodeId) -> MutationResult<()> {
        self.store.get(id)?;
        self.selection.toggle_click(id);
        Ok(())
    }

    pub fn range_click(&mut self, id: NodeId) -> MutationResult<()> {
        self.store.get(id)?;
        let projection = cached_projection(
            &self.projection,
            &self.index,
            &self.store,
            self.selection.zoom_root(),
        );
        self.selection.range_click(id, projection);
        Ok(())
    }

    pub fn escape(&mut self) {
        self.selection.escape();
    }

    pub fn select_all(&mut self) {
        let projection = cached_projection(
            &self.projection,
            &self.index,
            &self.store,
            self.selection.zoom_root(),
        );
        self.selection.select_all(projection);
    }

    /// Moves focus to the next visible row; `false` at the last row.
    pub fn focus_next(&mut self) -> bool {
        let projection = cached_projection(
            &self.projection,
            &self.index,
            &self.store,
            self.selection.zoom_root(),
        );
        self.selection.move_down(projection)
    }

    /// Moves focus to the previous visible row; `false` at the first row.
    pub fn focus_previous(&mut self) -> bool {
        let projection = cached_projection(
            &self.projection,
            &self.index,
            &self.store,
            self.selection.zoom_root(),
        );
        self.selection.move_up(projection)
    }

    /// Zooms into the focused node. Returns `false` when unfocused.
    pub fn zoom_in(&mut self) -> bool {
        let zoomed = self.selection.zoom_in();
        if zoomed {
            self.projection.take();
            debug!(
                "event=zoom module=engine status=ok direction=in root={:?}",
                self.selection.zoom_root()
            );
        }
        zoomed
    }

    /// Pops to the parent scope and focuses the old zoom root.
    /// Returns `false` when not zoomed.
    pub fn zoom_out(&mut self) -> bool {
        let Some(root) = self.selection.zoom_root() else {
            return false;
        };
        let parent = self.index.parent_of(root).flatten();
        self.selection.set_zoom_root(parent);
        self.selection.click(root);
        self.projection.take();
        debug!("event=zoom module=engine status=ok direction=out root={parent:?}");
        true
    }

    /// Sets the zoom scope directly; `None` shows the whole document.
    pub fn zoom_to(&mut self, root: Option<NodeId>) -> MutationResult<()> {
        if let Some(id) = root {
            self.store.get(id)?;
        }
        self.selection.set_zoom_root(root);
        self.selection.clear_selection();
        self.projection.take();
        Ok(())
    }

    // History.

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Starts a new undo unit for the next content edit.
    pub fn seal_history(&mut self) {
        self.history.seal();
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Reverts the latest entry. No-op when history is empty.
    pub fn undo(&mut self) -> MutationResult<CommandOutcome> {
        let Some(entry) = self.history.pop_undo() else {
            return Ok(self.snapshot(false));
        };
        let changes: Vec<NodeChange> = entry.changes.iter().rev().map(NodeChange::inverted).collect();
        self.replay(&changes);
        self.selection.set_zoom_root(entry.zoom_before);
        self.selection.set_focus(entry.focus_before);
        let outcome = self.settle_replay(entry.kind, ChangeOrigin::Undo, &changes);
        self.history.push_redo(entry);
        Ok(outcome)
    }

    /// Re-applies the latest undone entry. No-op when nothing was undone.
    pub fn redo(&mut self) -> MutationResult<CommandOutcome> {
        let Some(entry) = self.history.pop_redo() else {
            return Ok(self.snapshot(false));
        };
        let changes = entry.changes.clone();
        self.replay(&changes);
        self.selection.set_zoom_root(entry.zoom_after);
        self.selection.set_focus(entry.focus_after);
        let outcome = self.settle_replay(entry.kind, ChangeOrigin::Redo, &changes);
        self.history.push_undo(entry);
        Ok(outcome)
    }

    // Persistence.

    pub fn pending_persistence(&self) -> usize {
        self.persistence.len()
    }

    pub fn persist_queue(&self) -> &PersistQueue {
        &self.persistence
    }

    /// Sends persistence operations that are due at `now`.
    pub fn flush_persistence<A>(&mut self, adapter: &mut A, now: Instant) -> FlushReport
    where
        A: PersistenceAdapter + ?Sized,
    {
        self.persistence.flush_due(adapter, now)
    }

    /// Sends every pending persistence operation, ignoring debounce.
    pub fn flush_all_persistence<A>(&mut self, adapter: &mut A) -> FlushReport
    where
        A: PersistenceAdapter + ?Sized,
    {
        self.persistence.flush_all(adapter)
    }

    // Transaction plumbing shared by the command modules.

    fn begin(&self, kind: ChangeKind) -> Transaction {
        let zoom = self.selection.zoom_root();
        let visible = if zoom.is_some() {
            self.projection().len()
        } else {
            0
        };
        Transaction::new(kind, self.selection.focus(), zoom, visible)
    }

    fn commit(&mut self, txn: Transaction) -> CommandOutcome {
        self.projection.take();
        self.settle_zoom(&txn);
        self.settle_selection(txn.focus_before.is_some());

        let kind = txn.kind;
        let focus_before = txn.focus_before;
        let zoom_before = txn.zoom_before;
        let changes = txn.finish(&self.store);
        if changes.is_empty() {
            debug!("event=mutation module=engine status=noop kind={kind}");
            return self.snapshot(false);
        }

        let now = Instant::now();
        self.persistence.enqueue_changes(&changes, now);
        let event = ChangeEvent::from_changes(kind, ChangeOrigin::Command, &changes);
        self.events.emit(&event);
        debug!(
            "event=mutation module=engine status=ok kind={} changes={}",
            kind,
            changes.len()
        );
        self.history.record(HistoryEntry {
            kind,
            changes,
            focus_before,
            focus_after: self.selection.focus(),
            zoom_before,
            zoom_after: self.selection.zoom_root(),
            recorded_at: now,
        });
        self.outcome(true, event.created, event.removed)
    }

    fn replay(&mut self, changes: &[NodeChange]) {
        for change in changes {
            match &change.after {
                Some(node) => {
                    self.store.put(node.clone());
                }
                None => {
                    self.store.remove(change.id);
                }
            }
        }
        let targets: Vec<(NodeId, Option<&Node>)> = changes
            .iter()
            .map(|change| (change.id, self.store.get(change.id).ok()))
            .collect();
        let result = self.index.apply_patch(&targets);
        self.settle_index(result);
        self.projection.take();
    }

    fn settle_replay(
        &mut self,
        kind: ChangeKind,
        origin: ChangeOrigin,
        changes: &[NodeChange],
    ) -> CommandOutcome {
        let store = &self.store;
        self.selection.retain(|id| store.exists(id));
        self.persistence.enqueue_changes(changes, Instant::now());
        let event = ChangeEvent::from_changes(kind, origin, changes);
        self.events.emit(&event);
        debug!(
            "event=history_replay module=engine status=ok kind={} origin={:?} changes={}",
            kind,
            origin,
            changes.len()
        );
        self.outcome(true, event.created, event.removed)
    }

    /// Relaxes zoom while its root is gone or its view was emptied.
    fn settle_zoom(&mut self, txn: &Transaction) {
        let Some(mut root) = self.selection.zoom_root() else {
            return;
        };
        let start = root;
        loop {
            let parent = if !self.store.exists(root) {
                txn.prior_parent(root).flatten()
            } else if txn.visible_before > 0 && !self.index.has_children(root) {
                self.index.parent_of(root).flatten()
            } else {
                break;
            };
            match parent {
                Some(parent) => root = parent,
                None => {
                    self.selection.set_zoom_root(None);
                    info!("event=zoom_relax module=engine status=ok from={start} to=document");
                    return;
                }
            }
        }
        if root != start {
            self.selection.set_zoom_root(Some(root));
            info!("event=zoom_relax module=engine status=ok from={start} to={root}");
        }
    }

    /// Drops deleted ids from the selection and lands a lost focus on the
    /// first visible row.
    fn settle_selection(&mut self, was_focused: bool) {
        let store = &self.store;
        self.selection.retain(|id| store.exists(id));
        if was_focused && self.selection.focus().is_none() {
            let first = self.projection().first().map(|row| Focus::start(row.id));
            self.selection.set_focus(first);
        }
    }

    fn snapshot(&self, applied: bool) -> CommandOutcome {
        self.outcome(applied, Vec::new(), Vec::new())
    }

    fn outcome(&self, applied: bool, created: Vec<NodeId>, removed: Vec<NodeId>) -> CommandOutcome {
        CommandOutcome {
            applied,
            focus: self.selection.focus(),
            selection: self.in_document_order(self.selection.selected().iter().copied()),
            zoom_root: self.selection.zoom_root(),
            created,
            removed,
        }
    }

    fn settle_index(&mut self, result: IndexResult<()>) {
        if let Err(err) = result {
            self.recover_index(&err);
        }
    }

    fn recover_index(&mut self, err: &IndexError) {
        warn!("event=index_rebuild module=engine status=recovered reason={err}");
        self.index.rebuild_full(self.store.iter());
        self.projection.take();
    }

    /// Parent and sibling slot of an existing node.
    fn locate(&mut self, id: NodeId) -> MutationResult<(Option<NodeId>, usize)> {
        let parent = self.store.get(id)?.parent_id;
        if self.index.parent_of(id) != Some(parent) {
            self.recover_index(&IndexError::Drift(format!("parent of {id} out of date")));
        }
        self.index
            .sibling_index(id)
            .map(|slot| (parent, slot))
            .ok_or(MutationError::IndexInconsistency(IndexError::UnknownNode(id)))
    }

    /// Sibling positions from the top level down; sorts in document order.
    fn document_path(&self, id: NodeId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            path.push(self.index.sibling_index(current).unwrap_or(usize::MAX));
            if path.len() > self.index.len() {
                break;
            }
            cursor = self.index.parent_of(current).flatten();
        }
        path.reverse();
        path
    }

    fn in_document_order(&self, ids: impl IntoIterator<Item = NodeId>) -> Vec<NodeId> {
        let mut keyed: Vec<(Vec<usize>, NodeId)> = ids
            .into_iter()
            .map(|id| (self.document_path(id), id))
            .collect();
        keyed.sort();
        keyed.into_iter().map(|(_, id)| id).collect()
    }

    /// Where focus should land once `removed` is gone, judged against the
    /// current projection.
    fn focus_after_removal(&self, removed: &HashSet<NodeId>) -> Option<Focus> {
        let focus = self.selection.focus()?;
        if !removed.contains(&focus.id) {
            return Some(focus);
        }
        let projection = self.projection();
        let Some(position) = projection.position(focus.id) else {
            let mut cursor = self.index.parent_of(focus.id).flatten();
            while let Some(id) = cursor {
                if !removed.contains(&id) && projection.contains(id) {
                    return Some(Focus::end(id));
                }
                cursor = self.index.parent_of(id).flatten();
            }
            return None;
        };
        let rows = projection.rows();
        let next = rows[position + 1..]
            .iter()
            .find(|row| !removed.contains(&row.id))
            .map(|row| Focus::start(row.id));
        let previous = rows[..position]
            .iter()
            .rev()
            .find(|row| !removed.contains(&row.id))
            .map(|row| Focus::end(row.id));
        match self.config.delete_focus {
            DeleteFocusPolicy::NextThenPrevious => next.or(previous),
            DeleteFocusPolicy::PreviousThenNext => previous.or(next),
        }
    }

    // Write primitives. Validation is done by the caller; these never fail.
    // Each one snapshots through `txn` before writing, updates the store,
    // then patches the index.

    /// Inserts a new node at `slot` among its parent's children.
    fn insert_at(&mut self, txn: &mut Transaction, mut node: Node, slot: usize) -> NodeId {
        node.order_key = self.allocate_key(txn, node.parent_id, slot, None);
        let after = slot
            .checked_sub(1)
            .and_then(|previous| self.index.children(node.parent_id).get(previous))
            .copied();
        let id = node.id;
        txn.touch(id, None);
        let result = self.index.apply_insert(&node, after);
        self.store.put(node);
        self.settle_index(result);
        id
    }

    /// Applies a payload edit. Position fields must not be changed here.
    fn edit_node(&mut self, txn: &mut Transaction, id: NodeId, edit: impl FnOnce(&mut Node)) {
        let Ok(current) = self.store.get(id) else {
            return;
        };
        txn.touch(id, Some(current));
        let mut next = current.clone();
        edit(&mut next);
        self.store.put(next);
    }

    /// Moves `id` with its subtree under `parent` at `slot`, counted without
    /// the node itself.
    fn relocate(&mut self, txn: &mut Transaction, id: NodeId, parent: Option<NodeId>, slot: usize) {
        let key = self.allocate_key(txn, parent, slot, Some(id));
        let Ok(current) = self.store.get(id) else {
            return;
        };
        txn.touch(id, Some(current));
        let mut moved = current.clone();
        moved.parent_id = parent;
        moved.order_key = key;
        let result = self.index.apply_move(&moved, slot);
        self.store.put(moved);
        self.settle_index(result);
    }

    /// Removes `id` and its descendants; returns removed ids in pre-order.
    fn remove_subtree(&mut self, txn: &mut Transaction, id: NodeId) -> Vec<NodeId> {
        let ids = self.index.subtree(id);
        for node_id in &ids {
            txn.touch(*node_id, self.store.get(*node_id).ok());
        }
        let result = self.index.apply_remove(id).map(|_| ());
        for node_id in &ids {
            self.store.remove(*node_id);
        }
        self.settle_index(result);
        ids
    }

    fn allocate_key(
        &mut self,
        txn: &mut Transaction,
        parent: Option<NodeId>,
        slot: usize,
        moving: Option<NodeId>,
    ) -> OrderKey {
        if let Some(key) = self.key_for_slot(parent, slot, moving) {
            return key;
        }
        self.rebalance(txn, parent);
        self.key_for_slot(parent, slot, moving).unwrap_or_else(|| {
            warn!("event=order_key module=engine status=degraded parent={parent:?} slot={slot}");
            OrderKey::MAX
        })
    }

    fn key_for_slot(&self, parent: Option<NodeId>, slot: usize, moving: Option<NodeId>) -> Option<OrderKey> {
        let siblings: Vec<NodeId> = self
            .index
            .children(parent)
            .iter()
            .copied()
            .filter(|id| Some(*id) != moving)
            .collect();
        let key_at = |position: usize| {
            siblings
                .get(position)
                .and_then(|id| self.index.order_key(*id))
        };
        let previous = slot.checked_sub(1).and_then(key_at);
        let next = key_at(slot);
        key_between(previous, next)
    }

    /// Re-keys every child of `parent` to multiples of `ORDER_KEY_STEP`.
    fn rebalance(&mut self, txn: &mut Transaction, parent: Option<NodeId>) {
        let siblings = self.index.children(parent).to_vec();
        let mut updates = Vec::with_capacity(siblings.len());
        for (position, id) in siblings.iter().enumerate() {
            let Ok(current) = self.store.get(*id) else {
                continue;
            };
            let key = position as OrderKey * ORDER_KEY_STEP;
            txn.touch(*id, Some(current));
            let mut next = current.clone();
            next.order_key = key;
            self.store.put(next);
            updates.push((*id, key));
        }
        debug!(
            "event=order_rebalance module=engine status=ok parent={parent:?} count={}",
            updates.len()
        );
        let result = self.index.apply_rekey(&updates);
        self.settle_index(result);
    }
}

/// Key strictly between two neighbours, or `None` when they are adjacent.
fn key_between(previous: Option<OrderKey>, next: Option<OrderKey>) -> Option<OrderKey> {
    match (previous, next) {
        (None, None) => Some(0),
        (Some(previous), None) => previous.checked_add(ORDER_KEY_STEP),
        (None, Some(next)) => next.checked_sub(ORDER_KEY_STEP),
        (Some(previous), Some(next)) => {
            let gap = next.checked_sub(previous)?;
            (gap > 1).then(|| previous + gap / 2)
        }
    }
}

fn cached_projection<'a>(
    cell: &'a OnceCell<Projection>,
    index: &TreeIndex,
    store: &NodeStore,
    zoom_root: Option<NodeId>,
) -> &'a Projection {
    cell.get_or_init(|| index.project(store, zoom_root))
}

#[cfg(test)]
mod tests {
    use super::{key_between, MutationEngine};
    use crate::config::EngineConfig;
    use crate::model::node::{Node, ORDER_KEY_STEP};

    #[test]
    fn key_between_uses_midpoints_and_edges() {
        assert_eq!(key_between(None, None), Some(0));
        assert_eq!(key_between(Some(0), None), Some(ORDER_KEY_STEP));
        assert_eq!(key_between(None, Some(0)), Some(-ORDER_KEY_STEP));
        assert_eq!(key_between(Some(0), Some(10)), Some(5));
        assert_eq!(key_between(Some(4), Some(5)), None);
        assert_eq!(key_between(Some(i64::MAX), None), None);
    }

    #[test]
    fn repeated_inserts_at_one_slot_trigger_rebalance() {
        let mut engine = MutationEngine::new(EngineConfig::default());
        let first = engine.document_order()[0];
        let last = engine.append_node(None, "last").unwrap();

        for round in 0..40 {
            engine
                .insert_node(None, Some(first), format!("wedge {round}"))
                .unwrap();
        }

        engine.check_integrity().unwrap();
        let roots = engine.children(None).to_vec();
        assert_eq!(roots.len(), 42);
        assert_eq!(roots[0], first);
        assert_eq!(roots[41], last);
        assert_eq!(engine.node(roots[1]).unwrap().content, "wedge 39");
    }

    #[test]
    fn from_nodes_rejects_cycles_and_duplicate_keys() {
        let mut a = Node::new(None, 0, "a");
        let mut b = Node::new(Some(a.id), 0, "b");
        a.parent_id = Some(b.id);
        let err = MutationEngine::from_nodes(EngineConfig::default(), vec![a, b.clone()]);
        assert!(err.is_err());

        b.parent_id = None;
        let twin = Node::new(None, 0, "twin");
        let err = MutationEngine::from_nodes(EngineConfig::default(), vec![b, twin]);
        assert!(err.is_err());
    }

    fn three_roots() -> (MutationEngine, [Node; 3]) {
        let nodes = [
            Node::new(None, 0, "a"),
            Node::new(None, ORDER_KEY_STEP, "b"),
            Node::new(None, 2 * ORDER_KEY_STEP, "c"),
        ];
        let engine = MutationEngine::from_nodes(EngineConfig::default(), nodes.to_vec()).unwrap();
        (engine, nodes)
    }

    fn contents(engine: &MutationEngine) -> Vec<String> {
        engine
            .document_order()
            .into_iter()
            .map(|id| engine.node(id).unwrap().content.clone())
            .collect()
    }

    #[test]
    fn drifted_index_is_rebuilt_before_a_structural_command() {
        let (mut engine, [a, b, _]) = three_roots();
        let mut stray = b.clone();
        stray.parent_id = Some(a.id);
        engine.index.apply_move(&stray, 0).unwrap();
        assert!(engine.check_integrity().is_err());

        let outcome = engine.move_node(b.id, None, 0).unwrap();

        assert!(outcome.applied);
        assert_eq!(contents(&engine), vec!["b", "a", "c"]);
        engine.check_integrity().unwrap();
    }

    #[test]
    fn failed_surgical_update_falls_back_to_full_rebuild() {
        let (mut engine, [_, _, c]) = three_roots();
        let result = engine.index.apply_rekey(&[(c.id, 0)]);
        assert!(result.is_err());
        assert!(engine.check_integrity().is_err());

        engine.settle_index(result);

        engine.check_integrity().unwrap();
        assert_eq!(contents(&engine), vec!["a", "b", "c"]);
        let outcome = engine.move_up(c.id).unwrap();
        assert!(outcome.applied);
        assert_eq!(contents(&engine), vec!["a", "c", "b"]);
        engine.check_integrity().unwrap();
    }

    #[test]
    fn new_clamps_an_invalid_config() {
        let config = EngineConfig {
            history_limit: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let mut engine = MutationEngine::new(config);
        let first = engine.document_order()[0];
        engine.toggle_complete(first).unwrap();

        assert!(engine.can_undo());
    }

    #[test]
    fn empty_load_seeds_one_blank_node() {
        let engine = MutationEngine::from_nodes(EngineConfig::default(), Vec::new()).unwrap();
        assert_eq!(engine.len(), 1);
        assert!(engine.nodes().all(|node| node.content.is_empty()));
    }
}
