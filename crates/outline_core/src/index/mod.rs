//! Derived hierarchical index and visible projection.

pub mod tree_index;
