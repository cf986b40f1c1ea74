//! Upsert staging shared by all store backends.
//!
//! A commit is first resolved against the current records into a staged
//! change set; the backend then persists the whole set at once. Nodes an edge
//! points at are created as placeholders when absent and enriched by any node
//! upsert for the same key, whichever arrives first.

use std::collections::BTreeMap;

use crate::error::{Result, StoreError};
use crate::graph::{
    CommitReport, EdgeKey, NodeKey, Properties, StoredEdge, StoredNode, WriteOp, WriteOutcome,
};

/// Read access to committed records.
pub(crate) trait RecordSource {
    fn load_node(&self, key: &NodeKey) -> Result<Option<StoredNode>>;
    fn load_edge(&self, key: &EdgeKey) -> Result<Option<StoredEdge>>;
}

/// Records to persist for one commit.
#[derive(Debug, Default)]
pub(crate) struct StagedCommit {
    pub nodes: BTreeMap<NodeKey, StoredNode>,
    pub edges: BTreeMap<EdgeKey, StoredEdge>,
    pub report: CommitReport,
}

pub(crate) fn stage(source: &impl RecordSource, ops: &[WriteOp]) -> Result<StagedCommit> {
    let mut staged = StagedCommit::default();

    for op in ops {
        let outcome = match op {
            WriteOp::UpsertNode { key, properties } => {
                if !key.is_complete() {
                    return Err(StoreError::invalid_key(format!("incomplete node key {key}")));
                }
                staged.upsert_node(source, key, properties)?
            }
            WriteOp::UpsertEdge { key, properties } => {
                if !key.is_complete() {
                    return Err(StoreError::invalid_key(format!("incomplete edge key {key}")));
                }
                staged.upsert_edge(source, key, properties)?
            }
        };
        staged.report.outcomes.push(outcome);
    }

    Ok(staged)
}

impl StagedCommit {
    fn current_node(&self, source: &impl RecordSource, key: &NodeKey) -> Result<Option<StoredNode>> {
        match self.nodes.get(key) {
            Some(node) => Ok(Some(node.clone())),
            None => source.load_node(key),
        }
    }

    fn current_edge(&self, source: &impl RecordSource, key: &EdgeKey) -> Result<Option<StoredEdge>> {
        match self.edges.get(key) {
            Some(edge) => Ok(Some(edge.clone())),
            None => source.load_edge(key),
        }
    }

    fn upsert_node(
        &mut self,
        source: &impl RecordSource,
        key: &NodeKey,
        properties: &Properties,
    ) -> Result<WriteOutcome> {
        let outcome = match self.current_node(source, key)? {
            None => {
                self.nodes.insert(
                    key.clone(),
                    StoredNode {
                        key: key.clone(),
                        properties: properties.clone(),
                        placeholder: false,
                    },
                );
                WriteOutcome::Created
            }
            Some(mut node) => {
                let changed = merge_properties(&mut node.properties, properties) || node.placeholder;
                node.placeholder = false;
                self.nodes.insert(key.clone(), node);
                if changed {
                    WriteOutcome::Updated
                } else {
                    WriteOutcome::Unchanged
                }
            }
        };
        Ok(outcome)
    }

    fn upsert_edge(
        &mut self,
        source: &impl RecordSource,
        key: &EdgeKey,
        properties: &Properties,
    ) -> Result<WriteOutcome> {
        match self.current_edge(source, key)? {
            Some(mut edge) => {
                let changed = merge_properties(&mut edge.properties, properties);
                self.edges.insert(key.clone(), edge);
                Ok(if changed {
                    WriteOutcome::Updated
                } else {
                    WriteOutcome::Unchanged
                })
            }
            None => {
                self.ensure_endpoint(source, &key.from)?;
                self.ensure_endpoint(source, &key.to)?;
                self.edges.insert(
                    key.clone(),
                    StoredEdge {
                        key: key.clone(),
                        properties: properties.clone(),
                    },
                );
                Ok(WriteOutcome::Created)
            }
        }
    }

    fn ensure_endpoint(&mut self, source: &impl RecordSource, key: &NodeKey) -> Result<()> {
        if self.current_node(source, key)?.is_none() {
            self.nodes.insert(
                key.clone(),
                StoredNode {
                    key: key.clone(),
                    properties: Properties::new(),
                    placeholder: true,
                },
            );
            self.report.placeholders_created += 1;
        }
        Ok(())
    }
}

/// Overlay `incoming` onto `existing`; returns whether anything changed.
fn merge_properties(existing: &mut Properties, incoming: &Properties) -> bool {
    let mut changed = false;
    for (name, value) in incoming {
        if existing.get(name) != Some(value) {
            existing.insert(name.clone(), value.clone());
            changed = true;
        }
    }
    changed
}
