//! Batch ingestion: validate raw records from a collaborator and upsert them.
//!
//! Collaborators hand over a JSON document of the form
//! `{ "nodes": [...], "edges": [...] }`. Type and relation strings are
//! checked against the closed enums before anything touches the store, and
//! the whole batch is written in one transaction.

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use trellis_core::{Edge, Node, RawEdge, RawNode};
use trellis_graph::{Batch, BatchReport, GraphStore};

use crate::error::{CliError, Result};

/// A batch as it arrives on the wire.
#[derive(Debug, Default, Deserialize)]
pub struct RawBatch {
    #[serde(default)]
    pub nodes: Vec<RawNode>,
    #[serde(default)]
    pub edges: Vec<RawEdge>,
}

impl TryFrom<RawBatch> for Batch {
    type Error = CliError;

    fn try_from(raw: RawBatch) -> Result<Self> {
        let nodes = raw
            .nodes
            .into_iter()
            .enumerate()
            .map(|(index, node)| {
                Node::try_from(node).map_err(|source| CliError::InvalidRecord {
                    kind: "node",
                    index,
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let edges = raw
            .edges
            .into_iter()
            .enumerate()
            .map(|(index, edge)| {
                Edge::try_from(edge).map_err(|source| CliError::InvalidRecord {
                    kind: "edge",
                    index,
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Batch { nodes, edges })
    }
}

/// Parse and validate a batch document.
pub fn parse_batch(json: &str) -> Result<Batch> {
    let raw: RawBatch = serde_json::from_str(json)?;
    Batch::try_from(raw)
}

/// Read a batch from `path`, or from stdin when `path` is `-`.
pub fn read_batch(path: &Path) -> Result<Batch> {
    let json = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(path)?
    };
    parse_batch(&json)
}

/// Upsert a validated batch.
pub fn ingest(store: &mut GraphStore, batch: &Batch) -> Result<BatchReport> {
    if batch.is_empty() {
        tracing::info!("Empty batch, nothing to ingest");
        return Ok(BatchReport::default());
    }

    let report = store.upsert_batch(batch)?;
    tracing::info!(nodes = report.nodes, edges = report.edges, "Batch ingested");
    Ok(report)
}
