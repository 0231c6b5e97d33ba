//! Outline node domain model.
//!
//! # Responsibility
//! - Define the canonical record for one outline entry.
//! - Provide char-offset helpers used by split/merge.
//!
//! # Invariants
//! - `id` is stable for the node lifetime and never reused.
//! - `order_key` is unique among nodes sharing `parent_id`.
//! - `completed` is only meaningful when `is_checkbox` is set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Stable identifier for one outline node.
pub type NodeId = Uuid;

/// Sortable sibling position. Lower keys come first.
pub type OrderKey = i64;

/// Spacing used when order keys are allocated at the edges of a sibling list
/// or reassigned by a rebalance.
pub const ORDER_KEY_STEP: OrderKey = 1 << 16;

/// Canonical record for one outline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Stable node id.
    pub id: NodeId,
    /// Parent node id. `None` means root level.
    pub parent_id: Option<NodeId>,
    /// Sibling order key within `parent_id`.
    pub order_key: OrderKey,
    /// Opaque rich-text payload.
    pub content: String,
    /// Optional secondary payload shown under the content.
    pub note: Option<String>,
    /// Completion flag for checkbox nodes.
    pub completed: bool,
    /// Checkbox (`true`) or bullet (`false`) presentation.
    pub is_checkbox: bool,
    /// Hides descendants from the visible projection.
    pub collapsed: bool,
    /// Tag references maintained by an external extractor.
    pub tags: BTreeSet<String>,
    /// Unix epoch milliseconds, opaque to the engine.
    pub due_date: Option<i64>,
    /// Opaque recurrence expression.
    pub recurrence_rule: Option<String>,
}

impl Node {
    /// Creates a node with a generated id.
    pub fn new(parent_id: Option<NodeId>, order_key: OrderKey, content: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), parent_id, order_key, content)
    }

    /// Creates a node with a caller-provided id.
    ///
    /// Used by load/import paths where identity already exists.
    pub fn with_id(
        id: NodeId,
        parent_id: Option<NodeId>,
        order_key: OrderKey,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            parent_id,
            order_key,
            content: content.into(),
            note: None,
            completed: false,
            is_checkbox: false,
            collapsed: false,
            tags: BTreeSet::new(),
            due_date: None,
            recurrence_rule: None,
        }
    }

    /// Returns whether this node sits at root level.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Content length in chars; cursor offsets use the same unit.
    pub fn content_len(&self) -> usize {
        self.content.chars().count()
    }

    /// Splits content at a char offset, clamped to the content length.
    pub fn split_content(&self, offset: usize) -> (String, String) {
        let at = byte_index(&self.content, offset);
        (
            self.content[..at].to_string(),
            self.content[at..].to_string(),
        )
    }

    /// Returns whether the payload fields differ, ignoring position.
    pub fn payload_differs(&self, other: &Node) -> bool {
        self.content != other.content
            || self.note != other.note
            || self.completed != other.completed
            || self.is_checkbox != other.is_checkbox
            || self.collapsed != other.collapsed
            || self.tags != other.tags
            || self.due_date != other.due_date
            || self.recurrence_rule != other.recurrence_rule
    }

    /// Returns whether parent or order key differ.
    pub fn position_differs(&self, other: &Node) -> bool {
        self.parent_id != other.parent_id || self.order_key != other.order_key
    }
}

fn byte_index(value: &str, char_offset: usize) -> usize {
    value
        .char_indices()
        .nth(char_offset)
        .map_or(value.len(), |(index, _)| index)
}
