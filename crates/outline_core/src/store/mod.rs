//! Canonical node storage.

pub mod node_store;
