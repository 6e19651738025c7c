//! Row <-> domain conversion for the base tables.

use rusqlite::Row;
use serde_json::Value;

use trellis_core::{Edge, EdgeMetadata, Node, NodeMetadata};

use crate::client::GraphError;

pub(crate) const NODE_COLUMNS: &str = "id, type, source, data, metadata";
pub(crate) const EDGE_COLUMNS: &str = "id, from_id, to_id, relation, metadata";

/// A `nodes` row with its enum and JSON columns still undecoded.
pub(crate) struct NodeRow {
    id: String,
    node_type: String,
    source: String,
    data: String,
    metadata: String,
}

impl NodeRow {
    /// Expects the columns in [`NODE_COLUMNS`] order.
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            node_type: row.get(1)?,
            source: row.get(2)?,
            data: row.get(3)?,
            metadata: row.get(4)?,
        })
    }

    pub(crate) fn decode(self) -> Result<Node, GraphError> {
        let data: Value = serde_json::from_str(&self.data)?;
        let metadata: NodeMetadata = serde_json::from_str(&self.metadata)?;
        Ok(Node {
            node_type: self.node_type.parse()?,
            id: self.id,
            source: self.source,
            data,
            metadata,
        })
    }
}

pub(crate) struct EdgeRow {
    id: String,
    from_id: String,
    to_id: String,
    relation: String,
    metadata: Option<String>,
}

impl EdgeRow {
    /// Expects the columns in [`EDGE_COLUMNS`] order.
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            from_id: row.get(1)?,
            to_id: row.get(2)?,
            relation: row.get(3)?,
            metadata: row.get(4)?,
        })
    }

    pub(crate) fn decode(self) -> Result<Edge, GraphError> {
        let metadata = match self.metadata.as_deref() {
            Some(raw) => serde_json::from_str(raw)?,
            None => EdgeMetadata::default(),
        };
        Ok(Edge {
            relation: self.relation.parse()?,
            id: self.id,
            from_id: self.from_id,
            to_id: self.to_id,
            metadata,
        })
    }
}

pub(crate) fn decode_nodes(rows: Vec<NodeRow>) -> Result<Vec<Node>, GraphError> {
    rows.into_iter().map(NodeRow::decode).collect()
}

pub(crate) fn decode_edges(rows: Vec<EdgeRow>) -> Result<Vec<Edge>, GraphError> {
    rows.into_iter().map(EdgeRow::decode).collect()
}
