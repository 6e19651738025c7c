use thiserror::Error;

/// Errors raised while parsing schema values from their serialized form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Invalid node type: {0:?}")]
    InvalidType(String),

    #[error("Invalid relation: {0:?}")]
    InvalidRelation(String),

    #[error("Invalid writer tag: {0:?} (expected `human:<name>` or `ai:<session>`)")]
    InvalidWriter(String),

    #[error("Invalid access level: {0:?}")]
    InvalidAccessLevel(String),
}
