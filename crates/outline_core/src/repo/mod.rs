//! Persistence contracts, SQLite implementation and write batching.
//!
//! # Responsibility
//! - Define the adapter surface the engine hands settled changes to.
//! - Isolate SQLite query details from engine orchestration.
//!
//! # Invariants
//! - Persistence is fire-and-forget from the engine's point of view; failures
//!   never roll back in-memory state.

pub mod node_repo;
pub mod persist_queue;
