//! Outline node persistence contract and SQLite implementation.
//!
//! # Responsibility
//! - Define the write surface the engine's persistence queue drives.
//! - Keep SQL details and row decoding inside the repository boundary.
//!
//! # Invariants
//! - Deletes are soft (`is_deleted=1`); creates upsert and revive rows.
//! - Only active rows are returned by default.
//! - Loading is deterministic: `parent_uuid ASC, order_key ASC, node_uuid ASC`.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::node::{Node, NodeId, OrderKey};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Result type used by node repository operations.
pub type NodeRepoResult<T> = Result<T, NodeRepoError>;

/// Errors from node repository operations.
#[derive(Debug)]
pub enum NodeRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target node does not exist or is soft-deleted.
    NodeNotFound(NodeId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid node.
    InvalidData(String),
}

impl Display for NodeRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NodeNotFound(id) => write!(f, "outline node not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "node repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "node repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "node repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid outline data: {message}"),
        }
    }
}

impl Error for NodeRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for NodeRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for NodeRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Write surface driven by the persistence queue.
///
/// Implementations receive operations in commit order. A failed call is
/// retried later with the same arguments, so every method must be safe to
/// repeat.
pub trait PersistenceAdapter {
    /// Stores a new node, or revives a previously deleted one.
    fn create_node(&mut self, node: &Node) -> NodeRepoResult<()>;
    /// Stores payload fields. Position is written by `reorder_node`.
    fn update_node(&mut self, node: &Node) -> NodeRepoResult<()>;
    /// Marks one node deleted.
    fn delete_node(&mut self, id: NodeId) -> NodeRepoResult<()>;
    /// Stores a new parent and order key.
    fn reorder_node(
        &mut self,
        id: NodeId,
        parent_id: Option<NodeId>,
        order_key: OrderKey,
    ) -> NodeRepoResult<()>;
}

const NODE_COLUMNS: [&str; 14] = [
    "node_uuid",
    "parent_uuid",
    "order_key",
    "content",
    "note",
    "completed",
    "is_checkbox",
    "collapsed",
    "tags_json",
    "due_date",
    "recurrence_rule",
    "is_deleted",
    "created_at",
    "updated_at",
];

/// SQLite-backed outline node repository.
pub struct SqliteNodeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNodeRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> NodeRepoResult<Self> {
        ensure_node_connection_ready(conn)?;
        Ok(Self { conn })
    }

    /// Loads every active node. Row order is stable but not hierarchical;
    /// callers rebuild structure from `parent_id`.
    pub fn load_all(&self) -> NodeRepoResult<Vec<Node>> {
        let mut stmt = self.conn.prepare(
            "SELECT node_uuid, parent_uuid, order_key, content, note, completed,
                    is_checkbox, collapsed, tags_json, due_date, recurrence_rule
             FROM outline_nodes
             WHERE is_deleted = 0
             ORDER BY parent_uuid ASC, order_key ASC, node_uuid ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            nodes.push(parse_node_row(row)?);
        }
        Ok(nodes)
    }

    /// Loads one node by id.
    pub fn get_node(&self, id: NodeId, include_deleted: bool) -> NodeRepoResult<Option<Node>> {
        let sql = if include_deleted {
            "SELECT node_uuid, parent_uuid, order_key, content, note, completed,
                    is_checkbox, collapsed, tags_json, due_date, recurrence_rule
             FROM outline_nodes
             WHERE node_uuid = ?1;"
        } else {
            "SELECT node_uuid, parent_uuid, order_key, content, note, completed,
                    is_checkbox, collapsed, tags_json, due_date, recurrence_rule
             FROM outline_nodes
             WHERE node_uuid = ?1 AND is_deleted = 0;"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_node_row(row)?)),
            None => Ok(None),
        }
    }

    /// Returns the soft-delete flag, or `None` when no row exists.
    pub fn is_deleted(&self, id: NodeId) -> NodeRepoResult<Option<bool>> {
        let flag = self
            .conn
            .query_row(
                "SELECT is_deleted FROM outline_nodes WHERE node_uuid = ?1;",
                [id.to_string()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(flag.map(|value| value == 1))
    }

    /// Number of active rows.
    pub fn count_active(&self) -> NodeRepoResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM outline_nodes WHERE is_deleted = 0;",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl PersistenceAdapter for SqliteNodeRepository<'_> {
    fn create_node(&mut self, node: &Node) -> NodeRepoResult<()> {
        let tags_json = encode_tags(&node.tags)?;
        self.conn.execute(
            "INSERT INTO outline_nodes (
                node_uuid, parent_uuid, order_key, content, note, completed,
                is_checkbox, collapsed, tags_json, due_date, recurrence_rule, is_deleted
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0)
             ON CONFLICT(node_uuid) DO UPDATE SET
                parent_uuid = excluded.parent_uuid,
                order_key = excluded.order_key,
                content = excluded.content,
                note = excluded.note,
                completed = excluded.completed,
                is_checkbox = excluded.is_checkbox,
                collapsed = excluded.collapsed,
                tags_json = excluded.tags_json,
                due_date = excluded.due_date,
                recurrence_rule = excluded.recurrence_rule,
                is_deleted = 0,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                node.id.to_string(),
                node.parent_id.map(|id| id.to_string()),
                node.order_key,
                node.content,
                node.note,
                bool_to_int(node.completed),
                bool_to_int(node.is_checkbox),
                bool_to_int(node.collapsed),
                tags_json,
                node.due_date,
                node.recurrence_rule,
            ],
        )?;
        Ok(())
    }

    fn update_node(&mut self, node: &Node) -> NodeRepoResult<()> {
        let tags_json = encode_tags(&node.tags)?;
        let changed = self.conn.execute(
            "UPDATE outline_nodes
             SET content = ?2,
                 note = ?3,
                 completed = ?4,
                 is_checkbox = ?5,
                 collapsed = ?6,
                 tags_json = ?7,
                 due_date = ?8,
                 recurrence_rule = ?9,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE node_uuid = ?1 AND is_deleted = 0;",
            params![
                node.id.to_string(),
                node.content,
                node.note,
                bool_to_int(node.completed),
                bool_to_int(node.is_checkbox),
                bool_to_int(node.collapsed),
                tags_json,
                node.due_date,
                node.recurrence_rule,
            ],
        )?;
        if changed == 0 {
            return Err(NodeRepoError::NodeNotFound(node.id));
        }
        Ok(())
    }

    fn delete_node(&mut self, id: NodeId) -> NodeRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE outline_nodes
             SET is_deleted = 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE node_uuid = ?1;",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(NodeRepoError::NodeNotFound(id));
        }
        Ok(())
    }

    fn reorder_node(
        &mut self,
        id: NodeId,
        parent_id: Option<NodeId>,
        order_key: OrderKey,
    ) -> NodeRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE outline_nodes
             SET parent_uuid = ?2,
                 order_key = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE node_uuid = ?1 AND is_deleted = 0;",
            params![id.to_string(), parent_id.map(|id| id.to_string()), order_key],
        )?;
        if changed == 0 {
            return Err(NodeRepoError::NodeNotFound(id));
        }
        Ok(())
    }
}

fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

fn encode_tags(tags: &BTreeSet<String>) -> NodeRepoResult<String> {
    serde_json::to_string(tags)
        .map_err(|err| NodeRepoError::InvalidData(format!("cannot encode tags: {err}")))
}

fn parse_node_row(row: &Row<'_>) -> NodeRepoResult<Node> {
    let id = parse_uuid(&row.get::<_, String>("node_uuid")?, "outline_nodes.node_uuid")?;
    let parent_id = row
        .get::<_, Option<String>>("parent_uuid")?
        .map(|value| parse_uuid(&value, "outline_nodes.parent_uuid"))
        .transpose()?;
    let tags_json: String = row.get("tags_json")?;
    let tags: BTreeSet<String> = serde_json::from_str(&tags_json).map_err(|err| {
        NodeRepoError::InvalidData(format!(
            "invalid tags `{tags_json}` in outline_nodes.tags_json: {err}"
        ))
    })?;

    let mut node = Node::with_id(
        id,
        parent_id,
        row.get("order_key")?,
        row.get::<_, String>("content")?,
    );
    node.note = row.get("note")?;
    node.completed = parse_flag(row, "completed")?;
    node.is_checkbox = parse_flag(row, "is_checkbox")?;
    node.collapsed = parse_flag(row, "collapsed")?;
    node.tags = tags;
    node.due_date = row.get("due_date")?;
    node.recurrence_rule = row.get("recurrence_rule")?;
    Ok(node)
}

fn parse_flag(row: &Row<'_>, column: &'static str) -> NodeRepoResult<bool> {
    match row.get::<_, i64>(column)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(NodeRepoError::InvalidData(format!(
            "invalid {column} value `{other}` in outline_nodes.{column}"
        ))),
    }
}

fn parse_uuid(value: &str, column: &'static str) -> NodeRepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| NodeRepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn ensure_node_connection_ready(conn: &Connection) -> NodeRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(NodeRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "outline_nodes")? {
        return Err(NodeRepoError::MissingRequiredTable("outline_nodes"));
    }

    for column in NODE_COLUMNS {
        if !table_has_column(conn, "outline_nodes", column)? {
            return Err(NodeRepoError::MissingRequiredColumn {
                table: "outline_nodes",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> NodeRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> NodeRepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::{NodeRepoError, PersistenceAdapter, SqliteNodeRepository};
    use crate::db::open_db_in_memory;
    use crate::model::node::Node;
    use rusqlite::Connection;

    #[test]
    fn unmigrated_connection_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let err = SqliteNodeRepository::try_new(&conn).err().unwrap();
        assert!(matches!(
            err,
            NodeRepoError::UninitializedConnection {
                actual_version: 0,
                ..
            }
        ));
    }

    #[test]
    fn create_update_and_load_round_trip_payload() {
        let conn = open_db_in_memory().unwrap();
        let mut repo = SqliteNodeRepository::try_new(&conn).unwrap();

        let mut node = Node::new(None, 0, "groceries");
        node.is_checkbox = true;
        node.tags.insert("home".to_string());
        repo.create_node(&node).unwrap();

        node.content = "groceries today".to_string();
        node.due_date = Some(1_700_000_000_000);
        repo.update_node(&node).unwrap();

        assert_eq!(repo.load_all().unwrap(), vec![node]);
    }

    #[test]
    fn update_of_missing_node_reports_not_found() {
        let conn = open_db_in_memory().unwrap();
        let mut repo = SqliteNodeRepository::try_new(&conn).unwrap();
        let node = Node::new(None, 0, "ghost");
        let err = repo.update_node(&node).unwrap_err();
        assert!(matches!(err, NodeRepoError::NodeNotFound(id) if id == node.id));
    }
}
