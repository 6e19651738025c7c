//! Write operations for the project graph.
//!
//! Two operation families share one storage path: `add_*` insists the record
//! is new, `upsert_*` reconciles to the supplied state (last writer wins).
//! Both replace whole records; there is no partial-field update. Edge
//! cleanup on node deletion is done by the `ON DELETE CASCADE` foreign keys.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use trellis_core::{Edge, EdgeMetadata, Node, NodeMetadata};

use crate::client::{constraint_violation, Constraint, GraphError, GraphStore};

/// A set of nodes and edges applied in one transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Batch {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// Counts of records written by [`GraphStore::upsert_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub nodes: usize,
    pub edges: usize,
}

impl GraphStore {
    // ── Node Writes ──────────────────────────────────────────────

    /// Insert a node that must not exist yet.
    ///
    /// Missing creation/update timestamps are filled with the current time.
    /// Returns the stored copy.
    pub fn add_node(&mut self, node: &Node) -> Result<Node, GraphError> {
        require_id(&node.id, "node id must not be empty")?;

        let now = Utc::now();
        let mut stored = node.clone();
        stored.metadata.created_at.get_or_insert(now);
        stored.metadata.updated_at.get_or_insert(now);

        let data = serde_json::to_string(&stored.data)?;
        let metadata = serde_json::to_string(&stored.metadata)?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO nodes (id, type, source, data, metadata) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                stored.id,
                stored.node_type.as_str(),
                stored.source,
                data,
                metadata
            ],
        )
        .map_err(|err| match constraint_violation(&err) {
            Some(Constraint::PrimaryKey) => GraphError::Conflict {
                kind: "node",
                id: stored.id.clone(),
            },
            _ => GraphError::Storage(err),
        })?;

        tracing::debug!(node_id = %stored.id, node_type = %stored.node_type, "Node added");
        Ok(stored)
    }

    /// Insert or fully replace a node.
    ///
    /// `updated_at` becomes the current time (never earlier than the stored
    /// value); a previously stored `created_at` is kept.
    pub fn upsert_node(&mut self, node: &Node) -> Result<Node, GraphError> {
        let tx = self.conn_mut()?.transaction()?;
        let stored = upsert_node_tx(&tx, node, Utc::now())?;
        tx.commit()?;

        tracing::debug!(node_id = %stored.id, node_type = %stored.node_type, "Node upserted");
        Ok(stored)
    }

    /// Delete a node and, through the foreign keys, every edge touching it.
    ///
    /// Returns how many edges went with it.
    pub fn delete_node(&mut self, id: &str) -> Result<usize, GraphError> {
        let tx = self.conn_mut()?.transaction()?;
        let edges: i64 = tx.query_row(
            "SELECT count(*) FROM edges WHERE from_id = ?1 OR to_id = ?1",
            params![id],
            |row| row.get(0),
        )?;

        if tx.execute("DELETE FROM nodes WHERE id = ?1", params![id])? == 0 {
            return Err(GraphError::node_not_found(id));
        }
        tx.commit()?;

        tracing::debug!(node_id = %id, edges_removed = edges, "Node deleted");
        Ok(edges as usize)
    }

    // ── Edge Writes ──────────────────────────────────────────────

    /// Insert an edge that must not exist yet, by ID or by `(from, to, relation)`.
    pub fn add_edge(&mut self, edge: &Edge) -> Result<Edge, GraphError> {
        let stored = prepare_edge(edge, Utc::now())?;

        let tx = self.conn_mut()?.transaction()?;
        if let Some(existing) = edge_id_for_triple(&tx, &stored)? {
            return Err(GraphError::IntegrityViolation(format!(
                "uniqueness: {} -{}-> {} already exists as edge {existing}",
                stored.from_id, stored.relation, stored.to_id
            )));
        }
        insert_edge(&tx, &stored)?;
        tx.commit()?;

        tracing::debug!(edge_id = %stored.id, relation = %stored.relation, "Edge added");
        Ok(stored)
    }

    /// Insert or replace an edge.
    ///
    /// A stored edge with the same `(from, to, relation)` triple is replaced,
    /// keeping its original `created_at`, even when it was stored under another
    /// ID. An ID already held by a different triple is a
    /// [`GraphError::Conflict`]; derived IDs can coincide for distinct triples
    /// (`a-blocks -blocks-> b` and `a -blocks-> blocks-b`).
    pub fn upsert_edge(&mut self, edge: &Edge) -> Result<Edge, GraphError> {
        let tx = self.conn_mut()?.transaction()?;
        let stored = upsert_edge_tx(&tx, edge, Utc::now())?;
        tx.commit()?;

        tracing::debug!(edge_id = %stored.id, relation = %stored.relation, "Edge upserted");
        Ok(stored)
    }

    pub fn delete_edge(&mut self, id: &str) -> Result<(), GraphError> {
        let conn = self.conn()?;
        if conn.execute("DELETE FROM edges WHERE id = ?1", params![id])? == 0 {
            return Err(GraphError::edge_not_found(id));
        }

        tracing::debug!(edge_id = %id, "Edge deleted");
        Ok(())
    }

    // ── Batch Operations ─────────────────────────────────────────

    /// Upsert every node, then every edge, in a single transaction.
    ///
    /// Nothing is written if any record fails.
    pub fn upsert_batch(&mut self, batch: &Batch) -> Result<BatchReport, GraphError> {
        let now = Utc::now();
        let tx = self.conn_mut()?.transaction()?;

        for node in &batch.nodes {
            upsert_node_tx(&tx, node, now)?;
        }
        for edge in &batch.edges {
            upsert_edge_tx(&tx, edge, now)?;
        }
        tx.commit()?;

        let report = BatchReport {
            nodes: batch.nodes.len(),
            edges: batch.edges.len(),
        };
        tracing::debug!(nodes = report.nodes, edges = report.edges, "Batch upserted");
        Ok(report)
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn require_id(id: &str, message: &'static str) -> Result<(), GraphError> {
    if id.trim().is_empty() {
        return Err(GraphError::InvalidInput(message));
    }
    Ok(())
}

fn upsert_node_tx(conn: &Connection, node: &Node, now: DateTime<Utc>) -> Result<Node, GraphError> {
    require_id(&node.id, "node id must not be empty")?;

    let previous: Option<String> = conn
        .query_row(
            "SELECT metadata FROM nodes WHERE id = ?1",
            params![node.id],
            |row| row.get(0),
        )
        .optional()?;
    let previous: Option<NodeMetadata> = previous
        .map(|raw| serde_json::from_str(&raw))
        .transpose()?;

    let prev_created = previous.as_ref().and_then(|m| m.created_at);
    let prev_updated = previous.as_ref().and_then(|m| m.updated_at);

    let mut stored = node.clone();
    stored.metadata.created_at = prev_created.or(node.metadata.created_at).or(Some(now));
    stored.metadata.updated_at = Some(prev_updated.map_or(now, |prev| prev.max(now)));

    let data = serde_json::to_string(&stored.data)?;
    let metadata = serde_json::to_string(&stored.metadata)?;

    // ON CONFLICT keeps the row in place; REPLACE would delete it and cascade its edges.
    conn.execute(
        "INSERT INTO nodes (id, type, source, data, metadata) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
           type = excluded.type, source = excluded.source,
           data = excluded.data, metadata = excluded.metadata",
        params![
            stored.id,
            stored.node_type.as_str(),
            stored.source,
            data,
            metadata
        ],
    )?;

    Ok(stored)
}

/// Resolve the edge ID and fill in `created_at`.
fn prepare_edge(edge: &Edge, now: DateTime<Utc>) -> Result<Edge, GraphError> {
    require_id(&edge.from_id, "edge from_id must not be empty")?;
    require_id(&edge.to_id, "edge to_id must not be empty")?;
    if edge.metadata.reserved_extra_key().is_some() {
        return Err(GraphError::InvalidInput(
            "edge metadata annex must not use a reserved key (created_at)",
        ));
    }

    let mut stored = edge.clone();
    stored.id = edge.resolved_id().into_owned();
    stored.metadata.created_at.get_or_insert(now);
    Ok(stored)
}

fn edge_id_for_triple(conn: &Connection, edge: &Edge) -> Result<Option<String>, GraphError> {
    Ok(conn
        .query_row(
            "SELECT id FROM edges WHERE from_id = ?1 AND to_id = ?2 AND relation = ?3",
            params![edge.from_id, edge.to_id, edge.relation.as_str()],
            |row| row.get(0),
        )
        .optional()?)
}

fn insert_edge(conn: &Connection, edge: &Edge) -> Result<(), GraphError> {
    let metadata = serde_json::to_string(&edge.metadata)?;
    conn.execute(
        "INSERT INTO edges (id, from_id, to_id, relation, metadata) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            edge.id,
            edge.from_id,
            edge.to_id,
            edge.relation.as_str(),
            metadata
        ],
    )
    .map_err(|err| edge_write_error(conn, edge, err))?;
    Ok(())
}

fn upsert_edge_tx(conn: &Connection, edge: &Edge, now: DateTime<Utc>) -> Result<Edge, GraphError> {
    let mut stored = prepare_edge(edge, now)?;

    // Only the same logical edge may be replaced through a shared ID.
    let holder: Option<(String, String, String)> = conn
        .query_row(
            "SELECT from_id, to_id, relation FROM edges WHERE id = ?1",
            params![stored.id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    if let Some((from_id, to_id, relation)) = holder {
        if from_id != stored.from_id || to_id != stored.to_id || relation != stored.relation.as_str() {
            return Err(GraphError::Conflict {
                kind: "edge",
                id: stored.id,
            });
        }
    }

    let matches = "id = ?1 OR (from_id = ?2 AND to_id = ?3 AND relation = ?4)";
    let keys = params![
        stored.id,
        stored.from_id,
        stored.to_id,
        stored.relation.as_str()
    ];

    let mut stmt = conn.prepare(&format!("SELECT metadata FROM edges WHERE {matches}"))?;
    let previous = stmt
        .query_map(keys, |row| row.get::<_, Option<String>>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut prev_created: Option<DateTime<Utc>> = None;
    for raw in previous.iter().flatten() {
        let meta: EdgeMetadata = serde_json::from_str(raw)?;
        if let Some(created) = meta.created_at {
            prev_created = Some(prev_created.map_or(created, |c| c.min(created)));
        }
    }
    if prev_created.is_some() {
        stored.metadata.created_at = prev_created;
    }

    conn.execute(&format!("DELETE FROM edges WHERE {matches}"), keys)?;
    insert_edge(conn, &stored)?;
    Ok(stored)
}

fn edge_write_error(conn: &Connection, edge: &Edge, err: rusqlite::Error) -> GraphError {
    match constraint_violation(&err) {
        Some(Constraint::PrimaryKey) => GraphError::Conflict {
            kind: "edge",
            id: edge.id.clone(),
        },
        Some(Constraint::ForeignKey) => {
            let missing = match missing_endpoints(conn, edge) {
                Ok(missing) if !missing.is_empty() => missing.join(", "),
                _ => "unknown".to_string(),
            };
            GraphError::IntegrityViolation(format!(
                "edge {} references missing node(s): {missing}",
                edge.id
            ))
        }
        Some(Constraint::Unique) => GraphError::IntegrityViolation(format!(
            "uniqueness: {} -{}-> {} already exists",
            edge.from_id, edge.relation, edge.to_id
        )),
        _ => GraphError::Storage(err),
    }
}

fn missing_endpoints(conn: &Connection, edge: &Edge) -> rusqlite::Result<Vec<String>> {
    let mut missing = Vec::new();
    for id in [&edge.from_id, &edge.to_id] {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if !exists && !missing.contains(id) {
            missing.push(id.clone());
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_core::{NodeType, Relation};

    fn store_with(ids: &[&str]) -> GraphStore {
        let mut store = GraphStore::in_memory().unwrap();
        for id in ids {
            store
                .add_node(&Node::new(*id, NodeType::Issue, "test", json!({})))
                .unwrap();
        }
        store
    }

    #[test]
    fn upsert_edge_replaces_explicit_id_on_same_triple() {
        let mut store = store_with(&["A", "B"]);
        let first = store.add_edge(&Edge::new("A", Relation::Blocks, "B")).unwrap();

        let mut renamed = Edge::new("A", Relation::Blocks, "B");
        renamed.id = "custom".to_string();
        let stored = store.upsert_edge(&renamed).unwrap();

        assert_eq!(stored.id, "custom");
        assert_eq!(stored.metadata.created_at, first.metadata.created_at);
        assert_eq!(store.count_edges().unwrap(), 1);
        assert!(matches!(
            store.get_edge(&first.id),
            Err(GraphError::NotFound { .. })
        ));
    }

    #[test]
    fn upsert_edge_refuses_id_held_by_another_triple() {
        let mut store = store_with(&["A", "A-blocks", "B", "blocks-B"]);
        let first = store
            .upsert_edge(&Edge::new("A-blocks", Relation::Blocks, "B"))
            .unwrap();

        // Derives the same ID from a different triple.
        let err = store
            .upsert_edge(&Edge::new("A", Relation::Blocks, "blocks-B"))
            .unwrap_err();
        assert!(matches!(err, GraphError::Conflict { kind: "edge", ref id } if *id == first.id));
        assert_eq!(store.get_edge(&first.id).unwrap().from_id, "A-blocks");
        assert_eq!(store.count_edges().unwrap(), 1);

        let mut explicit = Edge::new("A", Relation::Related, "B");
        explicit.id = first.id.clone();
        assert!(matches!(
            store.upsert_edge(&explicit),
            Err(GraphError::Conflict { .. })
        ));
    }

    #[test]
    fn missing_endpoints_are_named() {
        let mut store = store_with(&["A"]);
        let err = store
            .add_edge(&Edge::new("A", Relation::Blocks, "ghost"))
            .unwrap_err();
        match err {
            GraphError::IntegrityViolation(message) => {
                assert!(message.ends_with("missing node(s): ghost"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reserved_annex_key_is_rejected_before_io() {
        let mut store = store_with(&["A", "B"]);
        let edge = Edge::new("A", Relation::Blocks, "B").with_extra("created_at", json!("yesterday"));

        assert!(matches!(store.add_edge(&edge), Err(GraphError::InvalidInput(_))));
        assert!(matches!(store.upsert_edge(&edge), Err(GraphError::InvalidInput(_))));
        assert_eq!(store.count_edges().unwrap(), 0);
        assert!(store.get_edges("A").unwrap().is_empty());
    }

    #[test]
    fn add_edge_with_taken_id_is_conflict() {
        let mut store = store_with(&["A", "B", "C"]);
        let mut first = Edge::new("A", Relation::Related, "B");
        first.id = "e1".to_string();
        store.add_edge(&first).unwrap();

        let mut second = Edge::new("A", Relation::Related, "C");
        second.id = "e1".to_string();
        let err = store.add_edge(&second).unwrap_err();
        assert!(matches!(err, GraphError::Conflict { kind: "edge", .. }));
    }

    #[test]
    fn empty_ids_are_rejected_before_io() {
        let mut store = store_with(&[]);
        let err = store
            .add_node(&Node::new("  ", NodeType::File, "test", json!({})))
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidInput(_)));

        let err = store.add_edge(&Edge::new("", Relation::Calls, "x")).unwrap_err();
        assert!(matches!(err, GraphError::InvalidInput(_)));
    }

    #[test]
    fn failed_batch_writes_nothing() {
        let mut store = store_with(&[]);
        let batch = Batch {
            nodes: vec![Node::new("A", NodeType::Service, "scan", json!({"name": "api"}))],
            edges: vec![Edge::new("A", Relation::Calls, "missing")],
        };

        let err = store.upsert_batch(&batch).unwrap_err();
        assert!(matches!(err, GraphError::IntegrityViolation(_)));
        assert_eq!(store.count_nodes(None).unwrap(), 0);
    }

    #[test]
    fn delete_node_reports_cascaded_edges() {
        let mut store = store_with(&["A", "B", "C"]);
        store.add_edge(&Edge::new("A", Relation::Blocks, "B")).unwrap();
        store.add_edge(&Edge::new("C", Relation::Mentions, "A")).unwrap();
        store.add_edge(&Edge::new("B", Relation::Related, "C")).unwrap();

        assert_eq!(store.delete_node("A").unwrap(), 2);
        assert_eq!(store.count_edges().unwrap(), 1);
    }
}
