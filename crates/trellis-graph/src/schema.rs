//! Table, index, and view definitions.
//!
//! Enum columns carry CHECK constraints generated from the closed enums, so
//! the database rejects values the Rust types cannot represent even when it
//! is written by another tool.

use rusqlite::Connection;

use trellis_core::{NodeType, Relation};

/// Node payload as a JSON document; a JSON string that itself holds valid
/// JSON is unwrapped first, matching `Node::title` and friends.
const NODE_TITLES_VIEW: &str = "
CREATE VIEW IF NOT EXISTS node_titles AS
SELECT
  id,
  type,
  COALESCE(
    NULLIF(CASE json_type(doc, '$.title') WHEN 'text' THEN json_extract(doc, '$.title') END, ''),
    NULLIF(CASE json_type(doc, '$.name') WHEN 'text' THEN json_extract(doc, '$.name') END, ''),
    NULLIF(CASE json_type(doc, '$.path') WHEN 'text' THEN json_extract(doc, '$.path') END, ''),
    id
  ) AS title,
  NULLIF(CASE json_type(doc, '$.path') WHEN 'text' THEN json_extract(doc, '$.path') END, '') AS path,
  CASE json_type(doc, '$.number') WHEN 'integer' THEN json_extract(doc, '$.number') END AS number
FROM (
  SELECT
    id,
    type,
    CASE
      WHEN json_type(data) = 'text' AND json_valid(json_extract(data, '$'))
        THEN json_extract(data, '$')
      ELSE data
    END AS doc
  FROM nodes
);
";

const DERIVED_VIEWS: &str = "
CREATE VIEW IF NOT EXISTS issue_blocks AS
SELECT
  e.id AS edge_id,
  a.id AS blocker_id,
  a.title AS blocker_title,
  b.id AS blocked_id,
  b.title AS blocked_title
FROM edges e
JOIN node_titles a ON a.id = e.from_id
JOIN node_titles b ON b.id = e.to_id
WHERE e.relation = 'blocks' AND a.type = 'issue' AND b.type = 'issue';

CREATE VIEW IF NOT EXISTS pr_modifies_file AS
SELECT
  e.id AS edge_id,
  p.id AS pr_id,
  p.number AS pr_number,
  p.title AS pr_title,
  f.id AS file_id,
  COALESCE(f.path, f.title) AS file_path
FROM edges e
JOIN node_titles p ON p.id = e.from_id
JOIN node_titles f ON f.id = e.to_id
WHERE e.relation = 'modifies' AND p.type = 'pr' AND f.type = 'file';
";

fn quoted_list<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    values
        .into_iter()
        .map(|v| format!("'{v}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn tables_sql() -> String {
    let node_types = quoted_list(NodeType::ALL.iter().map(NodeType::as_str));
    let relations = quoted_list(Relation::ALL.iter().map(Relation::as_str));

    format!(
        "
CREATE TABLE IF NOT EXISTS nodes (
  id TEXT PRIMARY KEY NOT NULL,
  type TEXT NOT NULL CHECK (type IN ({node_types})),
  source TEXT NOT NULL,
  data TEXT NOT NULL DEFAULT 'null',
  metadata TEXT NOT NULL DEFAULT '{{}}'
);

CREATE TABLE IF NOT EXISTS edges (
  id TEXT PRIMARY KEY NOT NULL,
  from_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
  to_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
  relation TEXT NOT NULL CHECK (relation IN ({relations})),
  metadata TEXT,
  UNIQUE (from_id, to_id, relation)
);

CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(type);
CREATE INDEX IF NOT EXISTS idx_nodes_source ON nodes(source);
CREATE INDEX IF NOT EXISTS idx_edges_from ON edges(from_id);
CREATE INDEX IF NOT EXISTS idx_edges_to ON edges(to_id);
"
    )
}

/// Create tables, indexes, and views if they do not exist yet.
pub(crate) fn install(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(&tables_sql())?;
    conn.execute_batch(NODE_TITLES_VIEW)?;
    conn.execute_batch(DERIVED_VIEWS)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        install(&conn).unwrap();
        install(&conn).unwrap();

        let views: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'view'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(views, 3);
    }

    #[test]
    fn check_constraint_rejects_unknown_type() {
        let conn = Connection::open_in_memory().unwrap();
        install(&conn).unwrap();

        let err = conn
            .execute(
                "INSERT INTO nodes (id, type, source) VALUES ('x', 'Bogus', 'test')",
                [],
            )
            .unwrap_err();
        assert!(err.to_string().contains("CHECK"));
    }

    #[test]
    fn relation_list_covers_every_variant() {
        let sql = tables_sql();
        for relation in Relation::ALL {
            assert!(sql.contains(&format!("'{relation}'")));
        }
    }
}
