//! Core domain types for the Trellis project graph.
//!
//! These types represent nodes and edges in the project graph: issues, pull
//! requests, commits, files, projects, and services, plus the typed
//! relationships between them. Node payloads are opaque JSON documents whose
//! shape depends on the originating collaborator; semantic fields are read
//! through best-effort accessors rather than a strict schema.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::SchemaError;

// ── Node Types ────────────────────────────────────────────────────

/// The closed set of entity kinds stored in the graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub enum NodeType {
    Issue,
    Pr,
    Commit,
    File,
    Project,
    Service,
}

impl NodeType {
    pub const ALL: [NodeType; 6] = [
        NodeType::Issue,
        NodeType::Pr,
        NodeType::Commit,
        NodeType::File,
        NodeType::Project,
        NodeType::Service,
    ];

    /// Canonical storage spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Issue => "issue",
            NodeType::Pr => "pr",
            NodeType::Commit => "commit",
            NodeType::File => "file",
            NodeType::Project => "project",
            NodeType::Service => "service",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = SchemaError;

    /// Case-insensitive; `"PR"` and `"pr"` are the same kind.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| SchemaError::InvalidType(s.to_string()))
    }
}

impl TryFrom<String> for NodeType {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeType> for String {
    fn from(value: NodeType) -> Self {
        value.as_str().to_string()
    }
}

// ── Relations ─────────────────────────────────────────────────────

/// The closed set of directed relationship kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub enum Relation {
    Blocks,
    Related,
    Implements,
    Calls,
    Owns,
    Modifies,
    Mentions,
    ParentOf,
}

impl Relation {
    pub const ALL: [Relation; 8] = [
        Relation::Blocks,
        Relation::Related,
        Relation::Implements,
        Relation::Calls,
        Relation::Owns,
        Relation::Modifies,
        Relation::Mentions,
        Relation::ParentOf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Blocks => "blocks",
            Relation::Related => "related",
            Relation::Implements => "implements",
            Relation::Calls => "calls",
            Relation::Owns => "owns",
            Relation::Modifies => "modifies",
            Relation::Mentions => "mentions",
            Relation::ParentOf => "parent_of",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Relation::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| SchemaError::InvalidRelation(s.to_string()))
    }
}

impl TryFrom<String> for Relation {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Relation> for String {
    fn from(value: Relation) -> Self {
        value.as_str().to_string()
    }
}

/// Membership test for the node type enumeration.
pub fn validate_node_type(s: &str) -> bool {
    s.parse::<NodeType>().is_ok()
}

/// Membership test for the relation enumeration.
pub fn validate_relation(s: &str) -> bool {
    s.parse::<Relation>().is_ok()
}

// ── Metadata ──────────────────────────────────────────────────────

/// Who wrote a node: a human operator or an AI session.
///
/// Serialized as a tagged string, `human:<name>` or `ai:<session>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum Writer {
    Human(String),
    AiSession(String),
}

impl Writer {
    pub fn human(name: impl Into<String>) -> Self {
        Self::Human(name.into())
    }

    /// A writer tag for a freshly started AI session.
    pub fn ai_session() -> Self {
        Self::AiSession(Uuid::new_v4().to_string())
    }

    pub fn is_ai(&self) -> bool {
        matches!(self, Self::AiSession(_))
    }
}

impl fmt::Display for Writer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Writer::Human(name) => write!(f, "human:{name}"),
            Writer::AiSession(session) => write!(f, "ai:{session}"),
        }
    }
}

impl FromStr for Writer {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("human", name)) if !name.is_empty() => Ok(Writer::Human(name.to_string())),
            Some(("ai", session)) if !session.is_empty() => {
                Ok(Writer::AiSession(session.to_string()))
            }
            _ => Err(SchemaError::InvalidWriter(s.to_string())),
        }
    }
}

impl TryFrom<String> for Writer {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Writer> for String {
    fn from(value: Writer) -> Self {
        value.to_string()
    }
}

/// Visibility tier of a node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum AccessLevel {
    Exec,
    Lead,
    Ic,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Exec => "exec",
            AccessLevel::Lead => "lead",
            AccessLevel::Ic => "ic",
        }
    }
}

impl FromStr for AccessLevel {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exec" => Ok(AccessLevel::Exec),
            "lead" => Ok(AccessLevel::Lead),
            "ic" => Ok(AccessLevel::Ic),
            _ => Err(SchemaError::InvalidAccessLevel(s.to_string())),
        }
    }
}

impl TryFrom<String> for AccessLevel {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccessLevel> for String {
    fn from(value: AccessLevel) -> Self {
        value.as_str().to_string()
    }
}

/// Bookkeeping attached to every node.
///
/// Timestamps left empty are filled in by the store on write.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer: Option<Writer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_level: Option<AccessLevel>,
    /// When the node was last reconciled against its external source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Bookkeeping attached to an edge, plus an open annex for relation-specific data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EdgeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EdgeMetadata {
    /// Field names the annex may not use; they would collide once flattened.
    pub const RESERVED_KEYS: [&'static str; 1] = ["created_at"];

    /// The first annex key that shadows a bookkeeping field, if any.
    pub fn reserved_extra_key(&self) -> Option<&str> {
        Self::RESERVED_KEYS
            .into_iter()
            .find(|key| self.extra.contains_key(*key))
    }
}

// ── Nodes ─────────────────────────────────────────────────────────

/// A typed entity in the project graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Name of the collaborator that produced this node (e.g. "github", "fs-scan").
    pub source: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub metadata: NodeMetadata,
}

impl Node {
    pub fn new(
        id: impl Into<String>,
        node_type: NodeType,
        source: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: id.into(),
            node_type,
            source: source.into(),
            data,
            metadata: NodeMetadata::default(),
        }
    }

    pub fn with_writer(mut self, writer: Writer) -> Self {
        self.metadata.writer = Some(writer);
        self
    }

    pub fn with_access_level(mut self, level: AccessLevel) -> Self {
        self.metadata.access_level = Some(level);
        self
    }

    pub fn with_last_synced(mut self, at: DateTime<Utc>) -> Self {
        self.metadata.last_synced_at = Some(at);
        self
    }

    /// Display title: `title`, then `name`, then `path`, then the node ID.
    ///
    /// A key holding an empty string counts as absent, so `{"title": "", "name": "x"}`
    /// is titled `x`. The `node_titles` SQL view applies the same rule.
    pub fn title(&self) -> String {
        self.first_string(&["title", "name", "path"])
            .unwrap_or_else(|| self.id.clone())
    }

    /// `description`, then `body`; empty when neither is present.
    pub fn description(&self) -> String {
        self.first_string(&["description", "body"])
            .unwrap_or_default()
    }

    /// `status`, then `state`; empty when neither is present.
    pub fn status(&self) -> String {
        self.first_string(&["status", "state"]).unwrap_or_default()
    }

    /// Integer `priority`; floats truncate, numeric strings parse, anything else is 0.
    pub fn priority(&self) -> i64 {
        let Some(fields) = self.fields() else {
            return 0;
        };
        match fields.get("priority") {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    /// Label names, from either `["bug", ...]` or `[{"name": "bug"}, ...]`.
    pub fn labels(&self) -> Vec<String> {
        let Some(fields) = self.fields() else {
            return Vec::new();
        };
        let Some(Value::Array(items)) = fields.get("labels") else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(obj) => obj.get("name").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect()
    }

    /// The payload as a mapping. A JSON string holding an object is parsed.
    fn fields(&self) -> Option<Cow<'_, Map<String, Value>>> {
        match &self.data {
            Value::Object(map) => Some(Cow::Borrowed(map)),
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => Some(Cow::Owned(map)),
                _ => None,
            },
            _ => None,
        }
    }

    /// First non-empty string among `keys`; empty strings fall through.
    fn first_string(&self, keys: &[&str]) -> Option<String> {
        let fields = self.fields()?;
        keys.iter()
            .filter_map(|k| fields.get(*k))
            .filter_map(Value::as_str)
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }
}

// ── Edges ─────────────────────────────────────────────────────────

/// A directed, typed relationship between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    /// Empty means "derive from the triple"; see [`Edge::derive_id`].
    #[serde(default)]
    pub id: String,
    pub from_id: String,
    pub to_id: String,
    pub relation: Relation,
    #[serde(default)]
    pub metadata: EdgeMetadata,
}

impl Edge {
    /// Build an edge whose ID is derived from its endpoints and relation.
    pub fn new(from_id: impl Into<String>, relation: Relation, to_id: impl Into<String>) -> Self {
        let from_id = from_id.into();
        let to_id = to_id.into();
        Self {
            id: Self::derive_id(&from_id, relation, &to_id),
            from_id,
            to_id,
            relation,
            metadata: EdgeMetadata::default(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.extra.insert(key.into(), value);
        self
    }

    /// The stable ID of the logical edge `from -relation-> to`.
    pub fn derive_id(from_id: &str, relation: Relation, to_id: &str) -> String {
        format!("{from_id}-{relation}-{to_id}")
    }

    /// The explicit ID, or the derived one when none was supplied.
    pub fn resolved_id(&self) -> Cow<'_, str> {
        if self.id.is_empty() {
            Cow::Owned(Self::derive_id(&self.from_id, self.relation, &self.to_id))
        } else {
            Cow::Borrowed(&self.id)
        }
    }
}

// ── Raw (serialized) shapes ───────────────────────────────────────

/// A node as received from an external collaborator, before enum validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub metadata: NodeMetadata,
}

impl TryFrom<RawNode> for Node {
    type Error = SchemaError;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        Ok(Node {
            node_type: raw.node_type.parse()?,
            id: raw.id,
            source: raw.source,
            data: raw.data,
            metadata: raw.metadata,
        })
    }
}

/// An edge as received from an external collaborator, before enum validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEdge {
    #[serde(default)]
    pub id: String,
    pub from_id: String,
    pub to_id: String,
    pub relation: String,
    #[serde(default)]
    pub metadata: EdgeMetadata,
}

impl TryFrom<RawEdge> for Edge {
    type Error = SchemaError;

    fn try_from(raw: RawEdge) -> Result<Self, Self::Error> {
        Ok(Edge {
            relation: raw.relation.parse()?,
            id: raw.id,
            from_id: raw.from_id,
            to_id: raw.to_id,
            metadata: raw.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue(data: Value) -> Node {
        Node::new("I1", NodeType::Issue, "tracker", data)
    }

    #[test]
    fn title_fallback_chain() {
        assert_eq!(issue(json!({"title": "Fix bug", "name": "n"})).title(), "Fix bug");
        assert_eq!(issue(json!({"name": "svc-a", "path": "p"})).title(), "svc-a");
        assert_eq!(issue(json!({"path": "src/lib.rs"})).title(), "src/lib.rs");
        assert_eq!(issue(json!({"other": 1})).title(), "I1");
        assert_eq!(issue(json!({"title": "", "name": "svc-b"})).title(), "svc-b");
        assert_eq!(issue(json!({"title": ""})).title(), "I1");
        assert_eq!(issue(json!([1, 2, 3])).title(), "I1");
        assert_eq!(issue(Value::Null).title(), "I1");
    }

    #[test]
    fn string_payload_is_parsed() {
        let node = issue(Value::String(r#"{"title":"Encoded"}"#.to_string()));
        assert_eq!(node.title(), "Encoded");

        let node = issue(Value::String("not json".to_string()));
        assert_eq!(node.title(), "I1");
        assert_eq!(node.priority(), 0);
    }

    #[test]
    fn field_accessors_zero_values() {
        let node = issue(json!({}));
        assert_eq!(node.description(), "");
        assert_eq!(node.status(), "");
        assert_eq!(node.priority(), 0);
        assert!(node.labels().is_empty());
    }

    #[test]
    fn field_accessors_read_payload() {
        let node = issue(json!({
            "body": "Crashes on start",
            "state": "open",
            "priority": "2",
            "labels": ["bug", {"name": "p1"}, 7]
        }));
        assert_eq!(node.description(), "Crashes on start");
        assert_eq!(node.status(), "open");
        assert_eq!(node.priority(), 2);
        assert_eq!(node.labels(), vec!["bug".to_string(), "p1".to_string()]);

        assert_eq!(issue(json!({"priority": 3.9})).priority(), 3);
    }

    #[test]
    fn node_type_parsing() {
        assert_eq!("issue".parse::<NodeType>().unwrap(), NodeType::Issue);
        assert_eq!("PR".parse::<NodeType>().unwrap(), NodeType::Pr);
        assert_eq!(
            "Bogus".parse::<NodeType>(),
            Err(SchemaError::InvalidType("Bogus".to_string()))
        );
        assert!(validate_node_type("service"));
        assert!(!validate_node_type(""));
    }

    #[test]
    fn relation_parsing() {
        assert_eq!("parent_of".parse::<Relation>().unwrap(), Relation::ParentOf);
        assert!(validate_relation("modifies"));
        assert!(!validate_relation("depends_on"));
        assert!(!validate_relation("Blocks"));
    }

    #[test]
    fn node_type_serializes_lowercase() {
        let json = serde_json::to_string(&NodeType::Pr).unwrap();
        assert_eq!(json, "\"pr\"");

        let err = serde_json::from_str::<Node>(r#"{"id":"x","type":"Bogus","source":"s"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn writer_tags() {
        let w: Writer = "human:alice".parse().unwrap();
        assert_eq!(w, Writer::human("alice"));
        assert_eq!(w.to_string(), "human:alice");

        let ai = Writer::ai_session();
        assert!(ai.is_ai());
        assert_eq!(ai.to_string().parse::<Writer>().unwrap(), ai);

        assert!("robot:x".parse::<Writer>().is_err());
        assert!("human:".parse::<Writer>().is_err());
    }

    #[test]
    fn edge_id_is_derived() {
        let edge = Edge::new("P1", Relation::Owns, "I1");
        assert_eq!(edge.id, "P1-owns-I1");

        let mut anonymous = edge.clone();
        anonymous.id.clear();
        assert_eq!(anonymous.resolved_id(), "P1-owns-I1");
    }

    #[test]
    fn edge_metadata_annex_flattens() {
        let edge = Edge::new("PR1", Relation::Modifies, "F1").with_extra("additions", json!(12));
        let json = serde_json::to_value(&edge.metadata).unwrap();
        assert_eq!(json, json!({"additions": 12}));
    }

    #[test]
    fn annex_key_shadowing_created_at_is_reported() {
        let plain = Edge::new("A", Relation::Blocks, "B").with_extra("weight", json!(1));
        assert_eq!(plain.metadata.reserved_extra_key(), None);

        let shadowing = plain.with_extra("created_at", json!("yesterday"));
        assert_eq!(shadowing.metadata.reserved_extra_key(), Some("created_at"));
    }

    #[test]
    fn raw_node_rejects_unknown_type() {
        let raw = RawNode {
            id: "X".to_string(),
            node_type: "Bogus".to_string(),
            source: "test".to_string(),
            data: Value::Null,
            metadata: NodeMetadata::default(),
        };
        assert!(matches!(Node::try_from(raw), Err(SchemaError::InvalidType(_))));
    }
}
