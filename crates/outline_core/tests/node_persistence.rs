mod common;

use common::{id, render, snapshot};
use outline_core::{
    open_db, EngineConfig, MutationEngine, Node, NodeId, NodeRepoError, NodeRepoResult, OrderKey,
    PersistOp, PersistenceAdapter, SqliteNodeRepository,
};
use std::time::{Duration, Instant};

fn load(repo: &SqliteNodeRepository<'_>) -> MutationEngine {
    MutationEngine::from_nodes(EngineConfig::default(), repo.load_all().unwrap()).unwrap()
}

#[test]
fn engine_state_survives_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outline.db");

    let mut engine = MutationEngine::new(EngineConfig::default());
    let root = engine.document_order()[0];
    engine.set_content(root, "groceries").unwrap();
    let milk = engine.append_node(Some(root), "milk").unwrap();
    let bread = engine.append_node(Some(root), "bread").unwrap();
    engine.set_checkbox(milk, true).unwrap();
    engine.toggle_complete(milk).unwrap();
    engine
        .set_tags(bread, ["bakery".to_string(), "today".to_string()])
        .unwrap();
    engine.set_note(bread, Some("sourdough".to_string())).unwrap();
    engine.set_due_date(bread, Some(1_700_000_000_000)).unwrap();
    engine
        .set_recurrence_rule(bread, Some("FREQ=WEEKLY".to_string()))
        .unwrap();
    engine.move_up(bread).unwrap();

    {
        let conn = open_db(&path).unwrap();
        let mut repo = SqliteNodeRepository::try_new(&conn).unwrap();
        let report = engine.flush_all_persistence(&mut repo);
        assert_eq!(report.failed, 0);
        assert_eq!(report.remaining, 0);
        assert_eq!(engine.pending_persistence(), 0);
    }

    let conn = open_db(&path).unwrap();
    let repo = SqliteNodeRepository::try_new(&conn).unwrap();
    let reloaded = load(&repo);
    assert_eq!(render(&reloaded), vec!["groceries", "  bread", "  milk"]);
    assert_eq!(snapshot(&reloaded), snapshot(&engine));
}

#[test]
fn deletes_are_soft_and_undo_revives_rows() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db(dir.path().join("outline.db")).unwrap();
    let mut repo = SqliteNodeRepository::try_new(&conn).unwrap();

    let mut engine = MutationEngine::new(EngineConfig::default());
    let first = engine.document_order()[0];
    let second = engine.append_node(None, "second").unwrap();
    let child = engine.append_node(Some(second), "child").unwrap();
    engine.flush_all_persistence(&mut repo);
    assert_eq!(repo.count_active().unwrap(), 3);

    engine.delete_node(second, true).unwrap();
    engine.flush_all_persistence(&mut repo);
    assert_eq!(repo.is_deleted(second).unwrap(), Some(true));
    assert_eq!(repo.is_deleted(child).unwrap(), Some(true));
    assert_eq!(repo.is_deleted(first).unwrap(), Some(false));
    assert!(repo.get_node(second, false).unwrap().is_none());
    assert_eq!(
        repo.get_node(second, true).unwrap().map(|node| node.content),
        Some("second".to_string())
    );
    assert_eq!(render(&load(&repo)), vec![""]);

    engine.undo().unwrap();
    engine.flush_all_persistence(&mut repo);
    assert_eq!(repo.is_deleted(second).unwrap(), Some(false));
    assert_eq!(render(&load(&repo)), vec!["", "second", "  child"]);
}

#[test]
fn content_updates_wait_for_the_debounce_but_moves_do_not() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db(dir.path().join("outline.db")).unwrap();
    let mut repo = SqliteNodeRepository::try_new(&conn).unwrap();
    let mut engine = MutationEngine::new(EngineConfig::default());
    let first = engine.document_order()[0];
    let second = engine.append_node(None, "second").unwrap();
    engine.flush_all_persistence(&mut repo);

    engine.set_content(first, "typed").unwrap();
    engine.move_up(second).unwrap();
    let now = Instant::now();
    let report = engine.flush_persistence(&mut repo, now);

    assert_eq!(report.sent, 1);
    assert_eq!(report.remaining, 1);
    assert!(matches!(
        engine.persist_queue().pending().next(),
        Some(PersistOp::Update(node)) if node.content == "typed"
    ));
    assert_eq!(render(&load(&repo)), vec!["second", ""]);

    let later = now + engine.config().persist_debounce() + Duration::from_millis(10);
    let report = engine.flush_persistence(&mut repo, later);
    assert_eq!(report.sent, 1);
    assert_eq!(render(&load(&repo)), vec!["second", "typed"]);
}

#[test]
fn rapid_edits_reach_storage_as_one_update() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db(dir.path().join("outline.db")).unwrap();
    let mut repo = SqliteNodeRepository::try_new(&conn).unwrap();
    let mut engine = MutationEngine::new(EngineConfig::default());
    let first = engine.document_order()[0];
    engine.flush_all_persistence(&mut repo);

    for text in ["h", "he", "hel", "hell", "hello"] {
        engine.set_content(first, text).unwrap();
    }

    assert_eq!(engine.pending_persistence(), 1);
    let report = engine.flush_all_persistence(&mut repo);
    assert_eq!(report.sent, 1);
    assert_eq!(
        repo.get_node(first, false).unwrap().map(|node| node.content),
        Some("hello".to_string())
    );
}

/// Adapter that fails every call until switched on.
#[derive(Default)]
struct Offline {
    online: bool,
    created: Vec<NodeId>,
}

impl Offline {
    fn call(&mut self, id: NodeId) -> NodeRepoResult<()> {
        if self.online {
            Ok(())
        } else {
            Err(NodeRepoError::NodeNotFound(id))
        }
    }
}

impl PersistenceAdapter for Offline {
    fn create_node(&mut self, node: &Node) -> NodeRepoResult<()> {
        self.call(node.id)?;
        self.created.push(node.id);
        Ok(())
    }

    fn update_node(&mut self, node: &Node) -> NodeRepoResult<()> {
        self.call(node.id)
    }

    fn delete_node(&mut self, id: NodeId) -> NodeRepoResult<()> {
        self.call(id)
    }

    fn reorder_node(
        &mut self,
        id: NodeId,
        _parent_id: Option<NodeId>,
        _order_key: OrderKey,
    ) -> NodeRepoResult<()> {
        self.call(id)
    }
}

#[test]
fn persistence_failures_never_roll_back_local_edits() {
    let mut engine = MutationEngine::new(EngineConfig::default());
    let first = engine.document_order()[0];
    let mut adapter = Offline::default();

    let created = engine.append_node(None, "offline edit").unwrap();
    let report = engine.flush_all_persistence(&mut adapter);
    assert_eq!(report.sent, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(report.remaining, 2);
    assert!(engine.contains(created));
    assert_eq!(id(&engine, "offline edit"), created);

    adapter.online = true;
    let report = engine.flush_all_persistence(&mut adapter);
    assert_eq!(report.sent, 2);
    assert_eq!(adapter.created, vec![first, created]);
    assert_eq!(engine.pending_persistence(), 0);
}
