//! Synchronous change notification for view and sync layers.
//!
//! # Invariants
//! - One event per settled transaction, undo or redo.
//! - Subscribers run in registration order.

use crate::history::{ChangeKind, NodeChange};
use crate::model::node::NodeId;
use serde::Serialize;
use std::fmt::{Debug, Formatter};

/// What produced a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    Command,
    Undo,
    Redo,
}

/// Ids touched by one settled transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub origin: ChangeOrigin,
    pub created: Vec<NodeId>,
    pub updated: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

impl ChangeEvent {
    pub fn from_changes(kind: ChangeKind, origin: ChangeOrigin, changes: &[NodeChange]) -> Self {
        let mut event = Self {
            kind,
            origin,
            created: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
        };
        for change in changes {
            match (&change.before, &change.after) {
                (None, Some(_)) => event.created.push(change.id),
                (Some(_), None) => event.removed.push(change.id),
                (Some(_), Some(_)) => event.updated.push(change.id),
                (None, None) => {}
            }
        }
        event
    }
}

/// Handle returned by `subscribe`.
pub type SubscriberId = u64;

type Subscriber = Box<dyn FnMut(&ChangeEvent)>;

#[derive(Default)]
pub struct EventBus {
    next_id: SubscriberId,
    subscribers: Vec<(SubscriberId, Subscriber)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&ChangeEvent) + 'static) -> SubscriberId {
        self.next_id += 1;
        self.subscribers.push((self.next_id, Box::new(subscriber)));
        self.next_id
    }

    /// Returns `false` when the id was not registered.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(current, _)| *current != id);
        before != self.subscribers.len()
    }

    pub fn emit(&mut self, event: &ChangeEvent) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl Debug for EventBus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{ChangeEvent, ChangeOrigin, EventBus};
    use crate::history::{ChangeKind, NodeChange};
    use crate::model::node::Node;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn event_classifies_changes() {
        let kept = Node::new(None, 0, "kept");
        let gone = Node::new(None, 1, "gone");
        let born = Node::new(None, 2, "born");
        let changes = vec![
            NodeChange {
                id: kept.id,
                before: Some(kept.clone()),
                after: Some(kept.clone()),
            },
            NodeChange {
                id: gone.id,
                before: Some(gone.clone()),
                after: None,
            },
            NodeChange {
                id: born.id,
                before: None,
                after: Some(born.clone()),
            },
        ];
        let event = ChangeEvent::from_changes(ChangeKind::Merge, ChangeOrigin::Undo, &changes);
        assert_eq!(event.created, vec![born.id]);
        assert_eq!(event.updated, vec![kept.id]);
        assert_eq!(event.removed, vec![gone.id]);
    }

    #[test]
    fn unsubscribed_listeners_stop_receiving() {
        let seen = Rc::new(RefCell::new(0));
        let mut bus = EventBus::new();
        let counter = Rc::clone(&seen);
        let id = bus.subscribe(move |_| *counter.borrow_mut() += 1);

        let event = ChangeEvent::from_changes(ChangeKind::Insert, ChangeOrigin::Command, &[]);
        bus.emit(&event);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&event);
        assert_eq!(*seen.borrow(), 1);
        assert!(bus.is_empty());
    }
}
