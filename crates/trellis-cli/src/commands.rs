//! Subcommands and their output.
//!
//! Reads go straight to the store. Destructive commands only reach the store
//! when the operator confirmed them with `--yes`.

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use clap::Subcommand;
use serde::Serialize;

use trellis_core::{Edge, Node, NodeType};
use trellis_graph::{GraphError, GraphStore, IssueBlock, NodeFilter, PrFileChange};

use crate::error::{CliError, Result};
use crate::ingest;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the database and schema, then exit.
    Init,

    /// Upsert nodes and edges from a JSON batch file ("-" reads stdin).
    Ingest { path: PathBuf },

    /// List nodes, optionally filtered.
    List {
        /// Node type to include (repeatable).
        #[arg(long = "type")]
        types: Vec<NodeType>,

        /// Source to include (repeatable).
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Only nodes updated strictly after this RFC 3339 timestamp.
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },

    /// Show one node with its relationships.
    Show { id: String },

    /// List every edge touching a node.
    Edges { id: String },

    /// List the nodes one hop away from a node.
    Neighbors { id: String },

    /// Issue-blocks-issue relationships.
    Blocks {
        /// Only blockers of this issue.
        #[arg(long)]
        issue: Option<String>,
    },

    /// PR-modifies-file relationships.
    PrFiles {
        /// Only files touched by this PR.
        #[arg(long, conflicts_with = "file")]
        pr: Option<String>,

        /// Only PRs touching this file.
        #[arg(long)]
        file: Option<String>,
    },

    /// Nodes from a source not reconciled recently.
    Stale {
        #[arg(long)]
        source: String,

        #[arg(long, default_value_t = 24)]
        older_than_hours: u64,
    },

    /// Delete a node and every edge touching it.
    DeleteNode {
        id: String,

        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Delete a single edge.
    DeleteEdge {
        id: String,

        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

/// Execute `command` against `store`, writing results to `out`.
pub fn run(store: &mut GraphStore, command: Command, json: bool, out: &mut dyn Write) -> Result<()> {
    match command {
        Command::Init => {
            let nodes = store.count_nodes(None)?;
            let edges = store.count_edges()?;
            writeln!(out, "graph ready: {nodes} nodes, {edges} edges")?;
        }
        Command::Ingest { path } => {
            let batch = ingest::read_batch(&path)?;
            let report = ingest::ingest(store, &batch)?;
            if json {
                emit_json(out, &report)?;
            } else {
                writeln!(out, "ingested {} nodes, {} edges", report.nodes, report.edges)?;
            }
        }
        Command::List {
            types,
            sources,
            since,
        } => {
            let mut filter = NodeFilter::new().types(types).sources(sources);
            filter.updated_after = since;
            let nodes = store.list_nodes(Some(&filter))?;
            write_nodes(out, &nodes, json)?;
        }
        Command::Show { id } => show(store, &id, json, out)?,
        Command::Edges { id } => {
            let edges = store.get_edges(&id)?;
            if json {
                emit_json(out, &edges)?;
            } else {
                for edge in &edges {
                    writeln!(out, "{}", edge_line(edge))?;
                }
            }
        }
        Command::Neighbors { id } => {
            let nodes = store.get_neighbors(&id)?;
            write_nodes(out, &nodes, json)?;
        }
        Command::Blocks { issue } => {
            let blocks = match issue {
                Some(id) => store.blockers_of(&id)?,
                None => store.issue_blocks()?,
            };
            write_blocks(out, &blocks, json)?;
        }
        Command::PrFiles { pr, file } => {
            let changes = match (pr, file) {
                (Some(pr), _) => store.files_modified_by(&pr)?,
                (None, Some(file)) => store.prs_touching(&file)?,
                (None, None) => store.pr_file_changes()?,
            };
            write_pr_files(out, &changes, json)?;
        }
        Command::Stale {
            source,
            older_than_hours,
        } => {
            let cutoff = Utc::now() - Duration::hours(older_than_hours.min(i32::MAX as u64) as i64);
            let nodes = store.stale_nodes(&source, cutoff)?;
            write_nodes(out, &nodes, json)?;
        }
        Command::DeleteNode { id, yes } => {
            confirm(yes, || format!("delete node {id}"))?;
            let edges = store.delete_node(&id)?;
            tracing::info!(node_id = %id, edges_removed = edges, "Node deleted by operator");
            writeln!(out, "deleted node {id} and {edges} edge(s)")?;
        }
        Command::DeleteEdge { id, yes } => {
            confirm(yes, || format!("delete edge {id}"))?;
            store.delete_edge(&id)?;
            tracing::info!(edge_id = %id, "Edge deleted by operator");
            writeln!(out, "deleted edge {id}")?;
        }
    }
    Ok(())
}

fn confirm(yes: bool, action: impl FnOnce() -> String) -> Result<()> {
    if yes {
        Ok(())
    } else {
        Err(CliError::ConfirmationRequired { action: action() })
    }
}

fn show(store: &GraphStore, id: &str, json: bool, out: &mut dyn Write) -> Result<()> {
    let node = store.get_node(id)?;
    let edges = store.get_edges(id)?;

    // An endpoint that vanished is dropped from the view, not an error.
    let mut related = Vec::with_capacity(edges.len());
    for edge in edges {
        let other_id = if edge.from_id == node.id {
            &edge.to_id
        } else {
            &edge.from_id
        };
        match store.get_node(other_id) {
            Ok(other) => related.push((edge, other)),
            Err(GraphError::NotFound { .. }) => {
                tracing::debug!(edge_id = %edge.id, "Skipping edge to missing node");
            }
            Err(e) => return Err(e.into()),
        }
    }

    if json {
        #[derive(Serialize)]
        struct Related<'a> {
            edge: &'a Edge,
            node: &'a Node,
        }
        #[derive(Serialize)]
        struct Detail<'a> {
            node: &'a Node,
            related: Vec<Related<'a>>,
        }
        let detail = Detail {
            node: &node,
            related: related
                .iter()
                .map(|(edge, other)| Related { edge, node: other })
                .collect(),
        };
        return emit_json(out, &detail);
    }

    writeln!(out, "{} [{}] {}", node.id, node.node_type, node.title())?;
    writeln!(out, "  source:   {}", node.source)?;
    let status = node.status();
    if !status.is_empty() {
        writeln!(out, "  status:   {status}")?;
    }
    writeln!(out, "  priority: {}", node.priority())?;
    let labels = node.labels();
    if !labels.is_empty() {
        writeln!(out, "  labels:   {}", labels.join(", "))?;
    }
    if let Some(writer) = &node.metadata.writer {
        writeln!(out, "  writer:   {writer}")?;
    }
    if let Some(updated) = node.metadata.updated_at {
        writeln!(out, "  updated:  {}", updated.to_rfc3339())?;
    }
    let description = node.description();
    if !description.is_empty() {
        writeln!(out, "\n{description}\n")?;
    }
    for (edge, other) in &related {
        let arrow = if edge.from_id == node.id {
            format!("-{}->", edge.relation)
        } else {
            format!("<-{}-", edge.relation)
        };
        writeln!(out, "  {arrow} {} [{}] {}", other.id, other.node_type, other.title())?;
    }
    Ok(())
}

fn emit_json<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn node_line(node: &Node) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        node.id,
        node.node_type,
        node.source,
        node.title()
    )
}

fn edge_line(edge: &Edge) -> String {
    format!(
        "{}\t{} -{}-> {}",
        edge.id, edge.from_id, edge.relation, edge.to_id
    )
}

fn write_nodes(out: &mut dyn Write, nodes: &[Node], json: bool) -> Result<()> {
    if json {
        return emit_json(out, nodes);
    }
    for node in nodes {
        writeln!(out, "{}", node_line(node))?;
    }
    Ok(())
}

fn write_blocks(out: &mut dyn Write, blocks: &[IssueBlock], json: bool) -> Result<()> {
    if json {
        return emit_json(out, blocks);
    }
    for b in blocks {
        writeln!(
            out,
            "{} ({}) blocks {} ({})",
            b.blocker_id, b.blocker_title, b.blocked_id, b.blocked_title
        )?;
    }
    Ok(())
}

fn write_pr_files(out: &mut dyn Write, changes: &[PrFileChange], json: bool) -> Result<()> {
    if json {
        return emit_json(out, changes);
    }
    for c in changes {
        let pr = match c.pr_number {
            Some(n) => format!("#{n}"),
            None => c.pr_id.clone(),
        };
        writeln!(out, "{pr}\t{}\t{}", c.pr_title, c.file_path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_core::Relation;

    fn seeded() -> GraphStore {
        let mut store = GraphStore::in_memory().unwrap();
        store
            .add_node(&Node::new("P1", NodeType::Project, "tracker", json!({"name": "Core"})))
            .unwrap();
        store
            .add_node(&Node::new(
                "I1",
                NodeType::Issue,
                "tracker",
                json!({"title": "Fix bug", "status": "open", "labels": ["bug"]}),
            ))
            .unwrap();
        store
            .add_node(&Node::new("I2", NodeType::Issue, "tracker", json!({"title": "Ship it"})))
            .unwrap();
        store.add_edge(&Edge::new("P1", Relation::Owns, "I1")).unwrap();
        store.add_edge(&Edge::new("I1", Relation::Blocks, "I2")).unwrap();
        store
    }

    fn run_text(store: &mut GraphStore, command: Command) -> Result<String> {
        let mut out = Vec::new();
        run(store, command, false, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_list_filters_by_type() {
        let mut store = seeded();
        let text = run_text(
            &mut store,
            Command::List {
                types: vec![NodeType::Issue],
                sources: vec![],
                since: None,
            },
        )
        .unwrap();
        assert_eq!(text, "I1\tissue\ttracker\tFix bug\nI2\tissue\ttracker\tShip it\n");
    }

    #[test]
    fn test_show_lists_relationships() {
        let mut store = seeded();
        let text = run_text(&mut store, Command::Show { id: "I1".to_string() }).unwrap();
        assert!(text.starts_with("I1 [issue] Fix bug\n"));
        assert!(text.contains("  status:   open\n"));
        assert!(text.contains("  labels:   bug\n"));
        assert!(text.contains("  -blocks-> I2 [issue] Ship it\n"));
        assert!(text.contains("  <-owns- P1 [project] Core\n"));
    }

    #[test]
    fn test_blocks_view_output() {
        let mut store = seeded();
        let text = run_text(&mut store, Command::Blocks { issue: None }).unwrap();
        assert_eq!(text, "I1 (Fix bug) blocks I2 (Ship it)\n");
    }

    #[test]
    fn test_delete_requires_confirmation() {
        let mut store = seeded();
        let err = run_text(
            &mut store,
            Command::DeleteNode {
                id: "P1".to_string(),
                yes: false,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CliError::ConfirmationRequired { .. }));
        assert!(err.is_rejected_write());
        assert!(store.node_exists("P1").unwrap());

        let text = run_text(
            &mut store,
            Command::DeleteNode {
                id: "P1".to_string(),
                yes: true,
            },
        )
        .unwrap();
        assert_eq!(text, "deleted node P1 and 1 edge(s)\n");
        assert!(store.get_neighbors("I1").unwrap().iter().all(|n| n.id != "P1"));
    }

    #[test]
    fn test_delete_missing_edge_is_rejected_write() {
        let mut store = seeded();
        let err = run_text(
            &mut store,
            Command::DeleteEdge {
                id: "nope".to_string(),
                yes: true,
            },
        )
        .unwrap_err();
        assert!(err.is_rejected_write());
    }

    #[test]
    fn test_json_output_is_parseable() {
        let mut store = seeded();
        let mut out = Vec::new();
        run(
            &mut store,
            Command::Neighbors {
                id: "I1".to_string(),
            },
            true,
            &mut out,
        )
        .unwrap();
        let nodes: Vec<Node> = serde_json::from_slice(&out).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id, "I2");
        assert_eq!(nodes[1].id, "P1");
    }
}
