//! Trellis Graph: SQLite-backed typed graph store.
//!
//! This crate is the single mutation point for the project graph. All reads
//! and writes flow through [`GraphStore`], which enforces referential
//! integrity, relation uniqueness, and cascading deletes at the storage layer.

pub mod client;
pub mod mutations;
pub mod queries;
mod rows;
mod schema;
pub mod views;

pub use client::{GraphError, GraphStore};
pub use mutations::{Batch, BatchReport};
pub use queries::NodeFilter;
pub use views::{IssueBlock, PrFileChange};
