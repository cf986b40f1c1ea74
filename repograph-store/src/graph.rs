//! Property graph record types
//!
//! Nodes are identified by a [`NodeKey`] (label, owning scope, id) and edges
//! by an [`EdgeKey`] (relationship type plus both endpoint keys). There is at
//! most one record per key; every write is an upsert.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute map attached to nodes and edges.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<String>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Identity of a node: label, owning scope (project) and id within the scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub label: String,
    pub scope: String,
    pub id: String,
}

impl NodeKey {
    pub fn new(label: impl Into<String>, scope: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            scope: scope.into(),
            id: id.into(),
        }
    }

    /// A key is usable only when all three parts are present.
    pub fn is_complete(&self) -> bool {
        !self.label.is_empty() && !self.scope.is_empty() && !self.id.is_empty()
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}/{}]", self.label, self.scope, self.id)
    }
}

/// Identity of an edge. Parallel edges of the same type are not representable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub rel_type: String,
    pub from: NodeKey,
    pub to: NodeKey,
}

impl EdgeKey {
    pub fn new(rel_type: impl Into<String>, from: NodeKey, to: NodeKey) -> Self {
        Self {
            rel_type: rel_type.into(),
            from,
            to,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.rel_type.is_empty() && self.from.is_complete() && self.to.is_complete()
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.from, self.rel_type, self.to)
    }
}

/// A persisted node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredNode {
    pub key: NodeKey,
    pub properties: Properties,
    /// Created only because an edge referenced it; no node upsert seen yet.
    pub placeholder: bool,
}

impl StoredNode {
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}

/// A persisted edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEdge {
    pub key: EdgeKey,
    pub properties: Properties,
}

/// A single upsert inside a commit.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    UpsertNode { key: NodeKey, properties: Properties },
    UpsertEdge { key: EdgeKey, properties: Properties },
}

/// Effect of one [`WriteOp`] on the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Per-commit report, one outcome per op in submission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReport {
    pub outcomes: Vec<WriteOutcome>,
    pub placeholders_created: usize,
}

/// Graph size counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub placeholders: usize,
    pub nodes_by_label: BTreeMap<String, usize>,
    pub edges_by_type: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_key_completeness() {
        assert!(NodeKey::new("File", "proj", "abc").is_complete());
        assert!(!NodeKey::new("File", "", "abc").is_complete());
        assert!(!NodeKey::new("File", "proj", "").is_complete());
        assert!(!NodeKey::new("", "proj", "abc").is_complete());
    }

    #[test]
    fn test_edge_key_requires_both_endpoints() {
        let a = NodeKey::new("File", "p", "a");
        let missing = NodeKey::new("File", "p", "");
        assert!(EdgeKey::new("IMPORTS", a.clone(), a.clone()).is_complete());
        assert!(!EdgeKey::new("IMPORTS", a.clone(), missing).is_complete());
        assert!(!EdgeKey::new("", a.clone(), a).is_complete());
    }

    #[test]
    fn test_key_display() {
        let a = NodeKey::new("File", "p", "a");
        let b = NodeKey::new("File", "p", "b");
        assert_eq!(a.to_string(), "File[p/a]");
        assert_eq!(
            EdgeKey::new("IMPORTS", a, b).to_string(),
            "File[p/a] -[IMPORTS]-> File[p/b]"
        );
    }

    #[test]
    fn test_property_value_accessors() {
        assert_eq!(PropertyValue::from("x").as_str(), Some("x"));
        assert_eq!(PropertyValue::from(3i64).as_int(), Some(3));
        assert_eq!(PropertyValue::from(3i64).as_float(), Some(3.0));
        assert_eq!(PropertyValue::from(0.5).as_float(), Some(0.5));
        assert!(PropertyValue::from(true).as_str().is_none());
        let list = PropertyValue::from(vec!["a".to_string()]);
        assert_eq!(list.as_list(), Some(&["a".to_string()][..]));
    }

    #[test]
    fn test_stored_node_bincode_roundtrip() {
        let mut properties = Properties::new();
        properties.insert("path".into(), "src/a.ts".into());
        properties.insert("confidence".into(), 0.25.into());
        let node = StoredNode {
            key: NodeKey::new("File", "p", "a"),
            properties,
            placeholder: false,
        };
        let bytes = bincode::serialize(&node).unwrap();
        let back: StoredNode = bincode::deserialize(&bytes).unwrap();
        assert_eq!(node, back);
    }
}
