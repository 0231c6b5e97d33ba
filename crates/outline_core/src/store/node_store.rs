//! Keyed in-memory node storage.
//!
//! # Responsibility
//! - Own every node record of the open document.
//! - Provide O(1) lookups; validation lives in the engine.

use crate::model::node::{Node, NodeId};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type for store lookups.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from node store lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record exists for the id.
    NotFound(NodeId),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "node not found: {id}"),
        }
    }
}

impl Error for StoreError {}

/// Authoritative id -> record map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStore {
    nodes: HashMap<NodeId, Node>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> StoreResult<&Node> {
        self.nodes.get(&id).ok_or(StoreError::NotFound(id))
    }

    /// Inserts or replaces a record, returning the previous one.
    pub fn put(&mut self, node: Node) -> Option<Node> {
        self.nodes.insert(node.id, node)
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(&id)
    }

    pub fn exists(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates records in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }
}
