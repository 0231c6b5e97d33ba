//! Batched hand-off of settled mutations to a persistence adapter.
//!
//! # Responsibility
//! - Turn node change sets into create/update/delete/reorder operations.
//! - Debounce payload updates and coalesce work per node.
//! - Retry failed operations without ever touching in-memory state.
//!
//! # Invariants
//! - Operations are sent in enqueue order; a failure stops the flush.
//! - Structural operations are due immediately; updates after the debounce.
//! - An operation is dropped after `max_attempts` failures.

use crate::history::NodeChange;
use crate::model::node::{Node, NodeId, OrderKey};
use crate::repo::node_repo::{NodeRepoResult, PersistenceAdapter};
use log::{debug, error, warn};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One pending persistence call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOp {
    Create(Node),
    Update(Node),
    Delete(NodeId),
    Reorder {
        id: NodeId,
        parent_id: Option<NodeId>,
        order_key: OrderKey,
    },
}

impl PersistOp {
    pub fn node_id(&self) -> NodeId {
        match self {
            Self::Create(node) | Self::Update(node) => node.id,
            Self::Delete(id) | Self::Reorder { id, .. } => *id,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
            Self::Reorder { .. } => "reorder",
        }
    }
}

#[derive(Debug, Clone)]
struct PendingOp {
    op: PersistOp,
    due_at: Instant,
    attempts: u32,
}

/// Counters from one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub sent: usize,
    pub failed: usize,
    pub dropped: usize,
    pub remaining: usize,
}

#[derive(Debug)]
pub struct PersistQueue {
    pending: VecDeque<PendingOp>,
    debounce: Duration,
    max_attempts: u32,
}

impl PersistQueue {
    pub fn new(debounce: Duration, max_attempts: u32) -> Self {
        Self {
            pending: VecDeque::new(),
            debounce,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending operations in send order.
    pub fn pending(&self) -> impl Iterator<Item = &PersistOp> {
        self.pending.iter().map(|entry| &entry.op)
    }

    /// Earliest instant at which `flush_due` has work.
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.iter().map(|entry| entry.due_at).min()
    }

    /// Translates one transaction's change set into operations.
    pub fn enqueue_changes(&mut self, changes: &[NodeChange], now: Instant) {
        for change in changes {
            match (&change.before, &change.after) {
                (None, Some(after)) => self.enqueue(PersistOp::Create(after.clone()), now),
                (Some(_), None) => self.enqueue(PersistOp::Delete(change.id), now),
                (Some(before), Some(after)) => {
                    if after.position_differs(before) {
                        self.enqueue(
                            PersistOp::Reorder {
                                id: after.id,
                                parent_id: after.parent_id,
                                order_key: after.order_key,
                            },
                            now,
                        );
                    }
                    if after.payload_differs(before) {
                        self.enqueue(PersistOp::Update(after.clone()), now);
                    }
                }
                (None, None) => {}
            }
        }
    }

    /// Adds one operation, folding it into pending work for the same node.
    pub fn enqueue(&mut self, op: PersistOp, now: Instant) {
        let id = op.node_id();
        match op {
            PersistOp::Update(node) => {
                if let Some(entry) = self.find_mut(id, |op| matches!(op, PersistOp::Create(_))) {
                    entry.op = PersistOp::Create(node);
                    return;
                }
                let due_at = now + self.debounce;
                if let Some(entry) = self.find_mut(id, |op| matches!(op, PersistOp::Update(_))) {
                    entry.op = PersistOp::Update(node);
                    entry.due_at = due_at;
                    return;
                }
                self.push(PersistOp::Update(node), due_at);
            }
            PersistOp::Reorder {
                parent_id,
                order_key,
                ..
            } => {
                if let Some(entry) = self.find_mut(id, |op| matches!(op, PersistOp::Create(_))) {
                    if let PersistOp::Create(node) = &mut entry.op {
                        node.parent_id = parent_id;
                        node.order_key = order_key;
                    }
                    return;
                }
                let reorder = PersistOp::Reorder {
                    id,
                    parent_id,
                    order_key,
                };
                if let Some(entry) =
                    self.find_mut(id, |op| matches!(op, PersistOp::Reorder { .. }))
                {
                    entry.op = reorder;
                    return;
                }
                self.push(reorder, now);
            }
            PersistOp::Delete(_) => {
                let before = self.pending.len();
                let mut unsent_create = false;
                let mut unsent_delete = false;
                self.pending.retain(|entry| {
                    if entry.op.node_id() != id {
                        return true;
                    }
                    match entry.op {
                        PersistOp::Create(_) => unsent_create = true,
                        PersistOp::Delete(_) => unsent_delete = true,
                        _ => {}
                    }
                    false
                });
                if before != self.pending.len() {
                    debug!(
                        "event=persist_coalesce module=persist status=ok node={} cancelled={}",
                        id,
                        before - self.pending.len()
                    );
                }
                // A create queued behind an unsent delete revives a stored row,
                // so that delete still has to reach the adapter.
                if !unsent_create || unsent_delete {
                    self.push(PersistOp::Delete(id), now);
                }
            }
            PersistOp::Create(node) => self.push(PersistOp::Create(node), now),
        }
    }

    /// Sends every operation whose due time has passed.
    pub fn flush_due<A>(&mut self, adapter: &mut A, now: Instant) -> FlushReport
    where
        A: PersistenceAdapter + ?Sized,
    {
        self.flush(adapter, Some(now))
    }

    /// Sends everything regardless of debounce.
    pub fn flush_all<A>(&mut self, adapter: &mut A) -> FlushReport
    where
        A: PersistenceAdapter + ?Sized,
    {
        self.flush(adapter, None)
    }

    /// Drops all pending work without sending it.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn flush<A>(&mut self, adapter: &mut A, now: Option<Instant>) -> FlushReport
    where
        A: PersistenceAdapter + ?Sized,
    {
        let mut report = FlushReport::default();
        let mut kept = VecDeque::with_capacity(self.pending.len());
        let mut halted = false;

        while let Some(mut entry) = self.pending.pop_front() {
            let due = now.map_or(true, |now| entry.due_at <= now);
            if halted || !due {
                kept.push_back(entry);
                continue;
            }

            match send(adapter, &entry.op) {
                Ok(()) => report.sent += 1,
                Err(err) => {
                    entry.attempts += 1;
                    report.failed += 1;
                    if entry.attempts >= self.max_attempts {
                        error!(
                            "event=persist_drop module=persist status=error op={} node={} attempts={} error={}",
                            entry.op.as_str(),
                            entry.op.node_id(),
                            entry.attempts,
                            err
                        );
                        report.dropped += 1;
                        continue;
                    }
                    warn!(
                        "event=persist_retry module=persist status=error op={} node={} attempts={} error={}",
                        entry.op.as_str(),
                        entry.op.node_id(),
                        entry.attempts,
                        err
                    );
                    kept.push_back(entry);
                    halted = true;
                }
            }
        }

        self.pending = kept;
        report.remaining = self.pending.len();
        if report.sent > 0 || report.failed > 0 {
            debug!(
                "event=persist_flush module=persist status=ok sent={} failed={} dropped={} remaining={}",
                report.sent, report.failed, report.dropped, report.remaining
            );
        }
        report
    }

    fn find_mut(
        &mut self,
        id: NodeId,
        kind: impl Fn(&PersistOp) -> bool,
    ) -> Option<&mut PendingOp> {
        self.pending
            .iter_mut()
            .find(|entry| entry.op.node_id() == id && kind(&entry.op))
    }

    fn push(&mut self, op: PersistOp, due_at: Instant) {
        self.pending.push_back(PendingOp {
            op,
            due_at,
            attempts: 0,
        });
    }
}

fn send<A>(adapter: &mut A, op: &PersistOp) -> NodeRepoResult<()>
where
    A: PersistenceAdapter + ?Sized,
{
    match op {
        PersistOp::Create(node) => adapter.create_node(node),
        PersistOp::Update(node) => adapter.update_node(node),
        PersistOp::Delete(id) => adapter.delete_node(*id),
        PersistOp::Reorder {
            id,
            parent_id,
            order_key,
        } => adapter.reorder_node(*id, *parent_id, *order_key),
    }
}
