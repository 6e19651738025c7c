//! SQLite connection management and the shared graph store handle.

use std::path::Path;
use std::time::Duration;

use rusqlite::{ffi, Connection, ErrorCode};

use trellis_core::config::StoreConfig;
use trellis_core::SchemaError;

use crate::schema;

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    Conflict { kind: &'static str, id: String },

    #[error("Invalid node type: {0:?}")]
    InvalidType(String),

    #[error("Invalid relation: {0:?}")]
    InvalidRelation(String),

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("Invalid stored metadata: {0}")]
    InvalidMetadata(String),

    #[error("SQLite error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Graph store is closed")]
    Closed,
}

impl From<SchemaError> for GraphError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::InvalidType(t) => GraphError::InvalidType(t),
            SchemaError::InvalidRelation(r) => GraphError::InvalidRelation(r),
            other => GraphError::InvalidMetadata(other.to_string()),
        }
    }
}

impl GraphError {
    pub(crate) fn node_not_found(id: &str) -> Self {
        GraphError::NotFound {
            kind: "node",
            id: id.to_string(),
        }
    }

    pub(crate) fn edge_not_found(id: &str) -> Self {
        GraphError::NotFound {
            kind: "edge",
            id: id.to_string(),
        }
    }
}

/// Which table constraint a failed statement tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Constraint {
    PrimaryKey,
    Unique,
    ForeignKey,
    Other,
}

pub(crate) fn constraint_violation(err: &rusqlite::Error) -> Option<Constraint> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            Some(match e.extended_code {
                ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Constraint::PrimaryKey,
                ffi::SQLITE_CONSTRAINT_UNIQUE => Constraint::Unique,
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Constraint::ForeignKey,
                _ => Constraint::Other,
            })
        }
        _ => None,
    }
}

/// The persistent typed graph store.
///
/// This is the single owner of the database handle and the only mutator of
/// persisted graph state. Writes take `&mut self`, so callers serialize
/// mutations; reads observe every write issued before them on this handle.
#[derive(Debug)]
pub struct GraphStore {
    conn: Option<Connection>,
}

impl GraphStore {
    /// Open (or create) the store described by `config`.
    ///
    /// Schema installation failures abort construction.
    pub fn open(config: &StoreConfig) -> Result<Self, GraphError> {
        let path = Path::new(&config.path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self::initialize(
            conn,
            Duration::from_millis(config.busy_timeout_ms),
            config.wal,
        )?;

        tracing::info!(path = %config.path, wal = config.wal, "Opened graph store");
        Ok(store)
    }

    /// Open a store at `path` with default settings.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let config = StoreConfig {
            path: path.as_ref().to_string_lossy().into_owned(),
            ..Default::default()
        };
        Self::open(&config)
    }

    /// Open a private in-memory store (for tests and dry runs).
    pub fn in_memory() -> Result<Self, GraphError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, Duration::from_secs(5), false)
    }

    fn initialize(conn: Connection, busy_timeout: Duration, wal: bool) -> Result<Self, GraphError> {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        if wal {
            let _mode: String =
                conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        }

        schema::install(&conn)?;
        Ok(Self { conn: Some(conn) })
    }

    /// Release the database handle. Every later call returns [`GraphError::Closed`].
    pub fn close(&mut self) -> Result<(), GraphError> {
        let conn = self.conn.take().ok_or(GraphError::Closed)?;
        match conn.close() {
            Ok(()) => {
                tracing::info!("Closed graph store");
                Ok(())
            }
            Err((conn, err)) => {
                self.conn = Some(conn);
                Err(err.into())
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    pub(crate) fn conn(&self) -> Result<&Connection, GraphError> {
        self.conn.as_ref().ok_or(GraphError::Closed)
    }

    pub(crate) fn conn_mut(&mut self) -> Result<&mut Connection, GraphError> {
        self.conn.as_mut().ok_or(GraphError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_store_rejects_calls() {
        let mut store = GraphStore::in_memory().unwrap();
        assert!(!store.is_closed());
        store.close().unwrap();
        assert!(store.is_closed());
        assert!(matches!(store.conn(), Err(GraphError::Closed)));
        assert!(matches!(store.close(), Err(GraphError::Closed)));
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let store = GraphStore::in_memory().unwrap();
        let enabled: i64 = store
            .conn()
            .unwrap()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn schema_errors_map_to_graph_errors() {
        let err: GraphError = SchemaError::InvalidType("Bogus".to_string()).into();
        assert!(matches!(err, GraphError::InvalidType(t) if t == "Bogus"));

        let err: GraphError = SchemaError::InvalidRelation("likes".to_string()).into();
        assert!(matches!(err, GraphError::InvalidRelation(_)));
    }
}
