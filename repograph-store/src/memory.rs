//! In-memory graph store
//!
//! Same upsert semantics as the RocksDB store without persistence. Used for
//! dry runs and tests.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::graph::{CommitReport, EdgeKey, GraphStats, NodeKey, StoredEdge, StoredNode, WriteOp};
use crate::staging::{self, RecordSource};
use crate::storage::GraphStore;

#[derive(Default)]
struct GraphState {
    nodes: BTreeMap<NodeKey, StoredNode>,
    edges: BTreeMap<EdgeKey, StoredEdge>,
}

impl RecordSource for GraphState {
    fn load_node(&self, key: &NodeKey) -> Result<Option<StoredNode>> {
        Ok(self.nodes.get(key).cloned())
    }

    fn load_edge(&self, key: &EdgeKey) -> Result<Option<StoredEdge>> {
        Ok(self.edges.get(key).cloned())
    }
}

/// Volatile graph store
#[derive(Default)]
pub struct InMemoryGraphStore {
    state: RwLock<GraphState>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GraphStore for InMemoryGraphStore {
    fn commit(&self, ops: &[WriteOp]) -> Result<CommitReport> {
        let mut state = self.state.write();
        // Nothing is applied unless staging succeeds for every op.
        let staged = staging::stage(&*state, ops)?;
        state.nodes.extend(staged.nodes);
        state.edges.extend(staged.edges);
        Ok(staged.report)
    }

    fn node(&self, key: &NodeKey) -> Result<Option<StoredNode>> {
        self.state.read().load_node(key)
    }

    fn edge(&self, key: &EdgeKey) -> Result<Option<StoredEdge>> {
        self.state.read().load_edge(key)
    }

    fn nodes_with_label(&self, label: &str, scope: &str) -> Result<Vec<StoredNode>> {
        Ok(self
            .state
            .read()
            .nodes
            .values()
            .filter(|n| n.key.label == label && n.key.scope == scope)
            .cloned()
            .collect())
    }

    fn edges_of_type(&self, rel_type: &str) -> Result<Vec<StoredEdge>> {
        Ok(self
            .state
            .read()
            .edges
            .values()
            .filter(|e| e.key.rel_type == rel_type)
            .cloned()
            .collect())
    }

    fn stats(&self) -> Result<GraphStats> {
        let state = self.state.read();
        let mut stats = GraphStats {
            nodes: state.nodes.len(),
            edges: state.edges.len(),
            ..Default::default()
        };
        for node in state.nodes.values() {
            if node.placeholder {
                stats.placeholders += 1;
            }
            *stats.nodes_by_label.entry(node.key.label.clone()).or_insert(0) += 1;
        }
        for edge in state.edges.values() {
            *stats.edges_by_type.entry(edge.key.rel_type.clone()).or_insert(0) += 1;
        }
        Ok(stats)
    }
}
