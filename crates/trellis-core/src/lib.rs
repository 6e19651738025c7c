//! trellis-core: Entity schema, configuration, and error types for the Trellis project graph.
//!
//! This crate provides the foundational types shared by the store and its callers:
//! - Node types (Issue, PR, Commit, etc.) and their opaque payload accessors
//! - Relations (blocks, owns, modifies, etc.) for directed edges
//! - Raw serialized shapes validated at the ingestion boundary
//! - Configuration management
//! - Schema parse errors

pub mod config;
pub mod error;
pub mod types;

pub use error::SchemaError;
pub use types::{
    validate_node_type, validate_relation, AccessLevel, Edge, EdgeMetadata, Node, NodeMetadata,
    NodeType, RawEdge, RawNode, Relation, Writer,
};
