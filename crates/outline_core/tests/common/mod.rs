//! Helpers shared by the engine integration tests.
#![allow(dead_code)]

use outline_core::{EngineConfig, MutationEngine, Node, NodeId, ORDER_KEY_STEP};
use std::collections::HashMap;

/// Builds an engine from indented lines, two spaces per level.
pub fn outline(lines: &[&str]) -> MutationEngine {
    outline_with(EngineConfig::default(), lines)
}

pub fn outline_with(config: EngineConfig, lines: &[&str]) -> MutationEngine {
    MutationEngine::from_nodes(config, nodes_from_lines(lines)).unwrap()
}

/// Parses indented lines into nodes with evenly spaced order keys.
pub fn nodes_from_lines(lines: &[&str]) -> Vec<Node> {
    let mut nodes = Vec::with_capacity(lines.len());
    let mut ancestors: Vec<NodeId> = Vec::new();
    let mut next_key: HashMap<Option<NodeId>, i64> = HashMap::new();
    for line in lines {
        let content = line.trim_start();
        let depth = (line.len() - content.len()) / 2;
        assert!(depth <= ancestors.len(), "line `{line}` skips a level");
        ancestors.truncate(depth);
        let parent = ancestors.last().copied();
        let key = next_key.entry(parent).or_insert(0);
        let node = Node::new(parent, *key, content);
        *key += ORDER_KEY_STEP;
        ancestors.push(node.id);
        nodes.push(node);
    }
    nodes
}

/// Id of the only node whose content is `content`.
pub fn id(engine: &MutationEngine, content: &str) -> NodeId {
    let matches: Vec<NodeId> = engine
        .nodes()
        .filter(|node| node.content == content)
        .map(|node| node.id)
        .collect();
    assert_eq!(matches.len(), 1, "expected one node with content `{content}`");
    matches[0]
}

/// Whole document in order, indented two spaces per level.
pub fn render(engine: &MutationEngine) -> Vec<String> {
    engine
        .document_order()
        .into_iter()
        .map(|node_id| {
            let depth = engine.depth(node_id).unwrap();
            let content = &engine.node(node_id).unwrap().content;
            format!("{}{content}", "  ".repeat(depth))
        })
        .collect()
}

/// Visible projection rows, indented by projection depth.
pub fn visible(engine: &MutationEngine) -> Vec<String> {
    engine
        .projection()
        .rows()
        .iter()
        .map(|row| {
            let content = &engine.node(row.id).unwrap().content;
            format!("{}{content}", "  ".repeat(row.depth))
        })
        .collect()
}

/// Every node sorted by id; equal snapshots mean equal documents.
pub fn snapshot(engine: &MutationEngine) -> Vec<Node> {
    let mut nodes: Vec<Node> = engine.nodes().cloned().collect();
    nodes.sort_by_key(|node| node.id);
    nodes
}
