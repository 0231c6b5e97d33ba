//! Outline tree engine.
//!
//! This crate owns every structural invariant of an outline document: node
//! identity and ordering, the derived hierarchy, focus and zoom, undo/redo,
//! and the hand-off of settled changes to storage.

pub mod config;
pub mod db;
pub mod engine;
pub mod history;
pub mod index;
pub mod logging;
pub mod model;
pub mod repo;
pub mod selection;
pub mod store;

pub use config::{ConfigError, DeleteFocusPolicy, EngineConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use engine::error::{MutationError, MutationResult};
pub use engine::events::{ChangeEvent, ChangeOrigin, SubscriberId};
pub use engine::{CommandOutcome, MutationEngine};
pub use history::{ChangeKind, NodeChange};
pub use index::tree_index::{IndexError, Projection, TreeIndex, VisibleRow};
pub use logging::{init_logging, logging_status, LogLevel, LoggingError};
pub use model::node::{Node, NodeId, OrderKey, ORDER_KEY_STEP};
pub use repo::node_repo::{NodeRepoError, NodeRepoResult, PersistenceAdapter, SqliteNodeRepository};
pub use repo::persist_queue::{FlushReport, PersistOp, PersistQueue};
pub use selection::{Caret, Focus, SelectionState};
pub use store::node_store::{NodeStore, StoreError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
