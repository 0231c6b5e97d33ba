//! Error surface of engine commands.

use crate::index::tree_index::IndexError;
use crate::model::node::NodeId;
use crate::store::node_store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by engine commands.
pub type MutationResult<T> = Result<T, MutationError>;

/// Errors returned by engine commands.
///
/// Validation runs before any write, so an error always means nothing
/// changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    /// A referenced node does not exist.
    NotFound(NodeId),
    /// The request would break a tree invariant.
    InvalidOperation(String),
    /// The index disagrees with the store and could not be recovered.
    IndexInconsistency(IndexError),
}

impl Display for MutationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "node not found: {id}"),
            Self::InvalidOperation(message) => write!(f, "invalid operation: {message}"),
            Self::IndexInconsistency(err) => write!(f, "index inconsistency: {err}"),
        }
    }
}

impl Error for MutationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::IndexInconsistency(err) => Some(err),
            Self::NotFound(_) | Self::InvalidOperation(_) => None,
        }
    }
}

impl From<StoreError> for MutationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
        }
    }
}

impl From<IndexError> for MutationError {
    fn from(value: IndexError) -> Self {
        Self::IndexInconsistency(value)
    }
}
