//! Merge intents: units of upsert work submitted to the merge engine.

use crate::error::{IngestError, IngestResult};
use repograph_store::{EdgeKey, NodeKey, Properties, PropertyValue, WriteOp};
use std::fmt;

/// Node labels of the repository graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeLabel {
    File,
    RepoCategory,
    Commit,
    Developer,
    Branch,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "File",
            Self::RepoCategory => "RepoCategory",
            Self::Commit => "Commit",
            Self::Developer => "Developer",
            Self::Branch => "Branch",
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship types of the repository graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeType {
    Imports,
    BelongsToRepoCategory,
    Author,
    Parent,
    BranchCommit,
    UpdateFile,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imports => "IMPORTS",
            Self::BelongsToRepoCategory => "BELONGS_TO_REPO_CATEGORY",
            Self::Author => "AUTHOR",
            Self::Parent => "PARENT",
            Self::BranchCommit => "BRANCH_COMMIT",
            Self::UpdateFile => "UPDATE_FILE",
        }
    }

    /// Labels an edge of this type must connect (from, to).
    pub fn endpoints(&self) -> (NodeLabel, NodeLabel) {
        match self {
            Self::Imports => (NodeLabel::File, NodeLabel::File),
            Self::BelongsToRepoCategory => (NodeLabel::File, NodeLabel::RepoCategory),
            Self::Author => (NodeLabel::Developer, NodeLabel::Commit),
            Self::Parent => (NodeLabel::Commit, NodeLabel::Commit),
            Self::BranchCommit => (NodeLabel::Branch, NodeLabel::Commit),
            Self::UpdateFile => (NodeLabel::Commit, NodeLabel::File),
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic identity of a node: label, owning project and id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MergeKey {
    pub label: NodeLabel,
    pub project_id: String,
    pub id: String,
}

impl MergeKey {
    pub fn new(label: NodeLabel, project_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            label,
            project_id: project_id.into(),
            id: id.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.project_id.trim().is_empty() && !self.id.trim().is_empty()
    }

    pub fn to_node_key(&self) -> NodeKey {
        NodeKey::new(self.label.as_str(), self.project_id.clone(), self.id.clone())
    }
}

impl fmt::Display for MergeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}/{}]", self.label, self.project_id, self.id)
    }
}

/// A unit of upsert work.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeIntent {
    UpsertNode {
        key: MergeKey,
        attributes: Properties,
    },
    UpsertEdge {
        edge_type: EdgeType,
        from: MergeKey,
        to: MergeKey,
        attributes: Properties,
    },
}

impl MergeIntent {
    pub fn node(key: MergeKey, attributes: Properties) -> Self {
        Self::UpsertNode { key, attributes }
    }

    pub fn edge(edge_type: EdgeType, from: MergeKey, to: MergeKey, attributes: Properties) -> Self {
        Self::UpsertEdge {
            edge_type,
            from,
            to,
            attributes,
        }
    }

    pub fn is_edge(&self) -> bool {
        matches!(self, Self::UpsertEdge { .. })
    }

    /// Validate and lower to a store write.
    pub fn to_write_op(&self) -> IngestResult<WriteOp> {
        match self {
            Self::UpsertNode { key, attributes } => {
                if !key.is_complete() {
                    return Err(IngestError::invalid_intent(format!(
                        "node upsert without merge key: {key}"
                    )));
                }
                Ok(WriteOp::UpsertNode {
                    key: key.to_node_key(),
                    properties: attributes.clone(),
                })
            }
            Self::UpsertEdge {
                edge_type,
                from,
                to,
                attributes,
            } => {
                if !from.is_complete() || !to.is_complete() {
                    return Err(IngestError::invalid_intent(format!(
                        "{edge_type} edge without merge key: {from} -> {to}"
                    )));
                }
                let (from_label, to_label) = edge_type.endpoints();
                if from.label != from_label || to.label != to_label {
                    return Err(IngestError::invalid_intent(format!(
                        "{edge_type} must connect {from_label} -> {to_label}, got {} -> {}",
                        from.label, to.label
                    )));
                }
                Ok(WriteOp::UpsertEdge {
                    key: EdgeKey::new(edge_type.as_str(), from.to_node_key(), to.to_node_key()),
                    properties: attributes.clone(),
                })
            }
        }
    }
}

/// Build an attribute map from literal pairs.
pub fn attrs<const N: usize>(pairs: [(&str, PropertyValue); N]) -> Properties {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: &str) -> MergeKey {
        MergeKey::new(NodeLabel::File, "proj", id)
    }

    #[test]
    fn test_node_intent_lowers_to_write_op() {
        let intent = MergeIntent::node(file("abc"), attrs([("path", "src/a.ts".into())]));
        match intent.to_write_op().unwrap() {
            WriteOp::UpsertNode { key, properties } => {
                assert_eq!(key, NodeKey::new("File", "proj", "abc"));
                assert_eq!(properties["path"], PropertyValue::from("src/a.ts"));
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn test_missing_merge_key_is_invalid() {
        let intent = MergeIntent::node(file(""), Properties::new());
        assert!(matches!(
            intent.to_write_op(),
            Err(IngestError::InvalidIntent(_))
        ));

        let blank_project = MergeKey::new(NodeLabel::File, "  ", "abc");
        let edge = MergeIntent::edge(EdgeType::Imports, file("a"), blank_project, Properties::new());
        assert!(matches!(edge.to_write_op(), Err(IngestError::InvalidIntent(_))));
    }

    #[test]
    fn test_edge_endpoint_labels_are_checked() {
        let category = MergeKey::new(NodeLabel::RepoCategory, "proj", "Core");
        let wrong = MergeIntent::edge(EdgeType::Imports, file("a"), category.clone(), Properties::new());
        assert!(matches!(wrong.to_write_op(), Err(IngestError::InvalidIntent(_))));

        let right = MergeIntent::edge(
            EdgeType::BelongsToRepoCategory,
            file("a"),
            category,
            Properties::new(),
        );
        assert!(right.to_write_op().is_ok());
        assert!(right.is_edge());
    }

    #[test]
    fn test_labels_and_types_render() {
        assert_eq!(NodeLabel::RepoCategory.to_string(), "RepoCategory");
        assert_eq!(
            EdgeType::BelongsToRepoCategory.to_string(),
            "BELONGS_TO_REPO_CATEGORY"
        );
        assert_eq!(file("x").to_string(), "File[proj/x]");
    }
}
