//! Outline domain model.
//!
//! # Responsibility
//! - Define the node record shared by store, index, engine and persistence.
//!
//! # Invariants
//! - Every node is identified by a stable `NodeId`.
//! - Components other than the store hold ids, never node references.

pub mod node;
