//! Error types for the trellis-cli crate.

use thiserror::Error;

use trellis_core::SchemaError;
use trellis_graph::GraphError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Invalid {kind} #{index} in batch: {source}")]
    InvalidRecord {
        kind: &'static str,
        index: usize,
        #[source]
        source: SchemaError,
    },

    #[error("Refusing to {action} without --yes")]
    ConfirmationRequired { action: String },

    #[error("Failed to parse batch: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// A write the store refused: reported to the operator, not a crash.
    pub fn is_rejected_write(&self) -> bool {
        matches!(
            self,
            CliError::Graph(
                GraphError::Conflict { .. }
                    | GraphError::IntegrityViolation(_)
                    | GraphError::NotFound { .. }
                    | GraphError::InvalidType(_)
                    | GraphError::InvalidRelation(_)
                    | GraphError::InvalidInput(_)
            ) | CliError::InvalidRecord { .. }
                | CliError::ConfirmationRequired { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
