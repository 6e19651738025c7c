//! Read operations for the project graph.
//!
//! Every result is a decoded copy; callers never hold live references into
//! the store. Lists are ordered by ID so repeated reads of unchanged data
//! return the same sequence.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension};

use trellis_core::{Edge, Node, NodeType};

use crate::client::{GraphError, GraphStore};
use crate::rows::{decode_edges, decode_nodes, EdgeRow, NodeRow, EDGE_COLUMNS, NODE_COLUMNS};

/// Optional, composable node predicates. All supplied predicates are ANDed;
/// an empty list means "any".
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub types: Vec<NodeType>,
    pub sources: Vec<String>,
    /// Only nodes updated strictly after this instant.
    pub updated_after: Option<DateTime<Utc>>,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(mut self, types: impl IntoIterator<Item = NodeType>) -> Self {
        self.types.extend(types);
        self
    }

    pub fn sources<S: Into<String>>(mut self, sources: impl IntoIterator<Item = S>) -> Self {
        self.sources.extend(sources.into_iter().map(Into::into));
        self
    }

    pub fn updated_after(mut self, at: DateTime<Utc>) -> Self {
        self.updated_after = Some(at);
        self
    }

    /// WHERE clause and bound values for the type/source predicates.
    fn sql_predicates(&self) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if !self.types.is_empty() {
            let start = values.len();
            values.extend(self.types.iter().map(|t| t.as_str().to_string()));
            clauses.push(format!("type IN ({})", placeholders(start, values.len())));
        }
        if !self.sources.is_empty() {
            let start = values.len();
            values.extend(self.sources.iter().cloned());
            clauses.push(format!("source IN ({})", placeholders(start, values.len())));
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), values)
        }
    }

    /// The timestamp predicate, applied to decoded metadata.
    fn admits_update(&self, node: &Node) -> bool {
        match self.updated_after {
            Some(after) => node.metadata.updated_at.is_some_and(|at| at > after),
            None => true,
        }
    }
}

/// `?N` placeholders for bound values `start..end` (1-based in SQL).
fn placeholders(start: usize, end: usize) -> String {
    (start + 1..=end)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl GraphStore {
    // ── Single Lookups ───────────────────────────────────────────

    pub fn get_node(&self, id: &str) -> Result<Node, GraphError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"),
                params![id],
                NodeRow::from_row,
            )
            .optional()?;

        match row {
            Some(row) => row.decode(),
            None => Err(GraphError::node_not_found(id)),
        }
    }

    pub fn get_edge(&self, id: &str) -> Result<Edge, GraphError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {EDGE_COLUMNS} FROM edges WHERE id = ?1"),
                params![id],
                EdgeRow::from_row,
            )
            .optional()?;

        match row {
            Some(row) => row.decode(),
            None => Err(GraphError::edge_not_found(id)),
        }
    }

    pub fn node_exists(&self, id: &str) -> Result<bool, GraphError> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?)
    }

    // ── List Queries ─────────────────────────────────────────────

    /// List nodes matching `filter`, or every node when `filter` is `None`.
    pub fn list_nodes(&self, filter: Option<&NodeFilter>) -> Result<Vec<Node>, GraphError> {
        let default = NodeFilter::default();
        let filter = filter.unwrap_or(&default);
        let (predicates, values) = filter.sql_predicates();

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes{predicates} ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), NodeRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut nodes = decode_nodes(rows)?;
        nodes.retain(|node| filter.admits_update(node));
        Ok(nodes)
    }

    pub fn count_nodes(&self, filter: Option<&NodeFilter>) -> Result<usize, GraphError> {
        if filter.is_some_and(|f| f.updated_after.is_some()) {
            return Ok(self.list_nodes(filter)?.len());
        }

        let (predicates, values) = filter.map(NodeFilter::sql_predicates).unwrap_or_default();
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT count(*) FROM nodes{predicates}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn count_edges(&self) -> Result<usize, GraphError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT count(*) FROM edges", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Nodes from `source` whose last reconciliation is missing or older than `cutoff`.
    pub fn stale_nodes(&self, source: &str, cutoff: DateTime<Utc>) -> Result<Vec<Node>, GraphError> {
        let filter = NodeFilter::new().sources([source]);
        let mut nodes = self.list_nodes(Some(&filter))?;
        nodes.retain(|node| node.metadata.last_synced_at.map_or(true, |at| at < cutoff));
        Ok(nodes)
    }

    // ── Neighbor Queries ─────────────────────────────────────────

    /// Every edge where `node_id` is either endpoint.
    pub fn get_edges(&self, node_id: &str) -> Result<Vec<Edge>, GraphError> {
        self.require_node(node_id)?;

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM edges
             WHERE from_id = ?1 OR to_id = ?1
             ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![node_id], EdgeRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        decode_edges(rows)
    }

    /// Distinct nodes one hop away in either direction, excluding `node_id` itself.
    pub fn get_neighbors(&self, node_id: &str) -> Result<Vec<Node>, GraphError> {
        self.require_node(node_id)?;

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes
             WHERE id IN (
               SELECT to_id FROM edges WHERE from_id = ?1
               UNION
               SELECT from_id FROM edges WHERE to_id = ?1
             )
             AND id <> ?1
             ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![node_id], NodeRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        decode_nodes(rows)
    }

    fn require_node(&self, id: &str) -> Result<(), GraphError> {
        if self.node_exists(id)? {
            Ok(())
        } else {
            Err(GraphError::node_not_found(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_numbered_from_offset() {
        assert_eq!(placeholders(0, 2), "?1, ?2");
        assert_eq!(placeholders(2, 3), "?3");
    }

    #[test]
    fn filter_builds_anded_clauses() {
        let filter = NodeFilter::new()
            .types([NodeType::Issue, NodeType::Pr])
            .sources(["github"]);
        let (sql, values) = filter.sql_predicates();
        assert_eq!(sql, " WHERE type IN (?1, ?2) AND source IN (?3)");
        assert_eq!(values, vec!["issue", "pr", "github"]);
    }

    #[test]
    fn empty_filter_has_no_where() {
        let (sql, values) = NodeFilter::new().sql_predicates();
        assert!(sql.is_empty());
        assert!(values.is_empty());
    }
}
