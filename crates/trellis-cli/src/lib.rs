//! trellis-cli: Operator and ingestion front end for the Trellis project graph.
//!
//! Reads JSON batches from ingestion collaborators into the store, and gives
//! operators read access plus confirmation-gated destructive commands.

pub mod commands;
pub mod error;
pub mod ingest;
