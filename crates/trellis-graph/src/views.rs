//! Derived views: read-time joins over the base tables.
//!
//! `issue_blocks` and `pr_modifies_file` are SQL views, not tables, so they
//! are recomputed on every read and cannot drift from the nodes and edges
//! they are built from.

use rusqlite::{Row, ToSql};
use serde::Serialize;

use crate::client::{GraphError, GraphStore};

/// One `blocks` edge between two issues, with both titles inlined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueBlock {
    pub edge_id: String,
    pub blocker_id: String,
    pub blocker_title: String,
    pub blocked_id: String,
    pub blocked_title: String,
}

impl IssueBlock {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            edge_id: row.get(0)?,
            blocker_id: row.get(1)?,
            blocker_title: row.get(2)?,
            blocked_id: row.get(3)?,
            blocked_title: row.get(4)?,
        })
    }
}

/// One `modifies` edge from a pull request to a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrFileChange {
    pub edge_id: String,
    pub pr_id: String,
    /// `data.number` of the PR, when it is an integer.
    pub pr_number: Option<i64>,
    pub pr_title: String,
    pub file_id: String,
    pub file_path: String,
}

impl PrFileChange {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            edge_id: row.get(0)?,
            pr_id: row.get(1)?,
            pr_number: row.get(2)?,
            pr_title: row.get(3)?,
            file_id: row.get(4)?,
            file_path: row.get(5)?,
        })
    }
}

const ISSUE_BLOCK_COLUMNS: &str = "edge_id, blocker_id, blocker_title, blocked_id, blocked_title";
const PR_FILE_COLUMNS: &str = "edge_id, pr_id, pr_number, pr_title, file_id, file_path";

impl GraphStore {
    /// Every issue-blocks-issue relationship.
    pub fn issue_blocks(&self) -> Result<Vec<IssueBlock>, GraphError> {
        self.query_view(
            &format!("SELECT {ISSUE_BLOCK_COLUMNS} FROM issue_blocks ORDER BY edge_id"),
            &[],
            IssueBlock::from_row,
        )
    }

    /// Issues blocking `issue_id`.
    pub fn blockers_of(&self, issue_id: &str) -> Result<Vec<IssueBlock>, GraphError> {
        self.query_view(
            &format!(
                "SELECT {ISSUE_BLOCK_COLUMNS} FROM issue_blocks
                 WHERE blocked_id = ?1 ORDER BY edge_id"
            ),
            &[&issue_id],
            IssueBlock::from_row,
        )
    }

    /// Every PR-modifies-file relationship.
    pub fn pr_file_changes(&self) -> Result<Vec<PrFileChange>, GraphError> {
        self.query_view(
            &format!("SELECT {PR_FILE_COLUMNS} FROM pr_modifies_file ORDER BY edge_id"),
            &[],
            PrFileChange::from_row,
        )
    }

    /// Files touched by `pr_id`.
    pub fn files_modified_by(&self, pr_id: &str) -> Result<Vec<PrFileChange>, GraphError> {
        self.query_view(
            &format!(
                "SELECT {PR_FILE_COLUMNS} FROM pr_modifies_file
                 WHERE pr_id = ?1 ORDER BY file_path, edge_id"
            ),
            &[&pr_id],
            PrFileChange::from_row,
        )
    }

    /// Pull requests touching `file_id`.
    pub fn prs_touching(&self, file_id: &str) -> Result<Vec<PrFileChange>, GraphError> {
        self.query_view(
            &format!(
                "SELECT {PR_FILE_COLUMNS} FROM pr_modifies_file
                 WHERE file_id = ?1 ORDER BY pr_id, edge_id"
            ),
            &[&file_id],
            PrFileChange::from_row,
        )
    }

    fn query_view<T>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, GraphError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, map)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
