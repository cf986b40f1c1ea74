//! RepoGraph Store
//!
//! Upsert-only property graph persistence for RepoGraph.
//!
//! ## Features
//!
//! - **Merge-key identity** - Nodes keyed by (label, scope, id), edges by type and endpoints
//! - **Atomic commits** - Each commit lands as one RocksDB `WriteBatch`
//! - **Placeholder nodes** - Edges may reference nodes that do not exist yet
//! - **In-memory backend** - Same semantics without persistence
//!
//! ## Example
//!
//! ```ignore
//! use repograph_store::{GraphStore, NodeKey, RocksGraphStore, WriteOp};
//!
//! let store = RocksGraphStore::open(&db_path)?;
//! store.commit(&[WriteOp::UpsertNode {
//!     key: NodeKey::new("File", "my-project", merge_hash),
//!     properties,
//! }])?;
//! ```

pub mod error;
pub mod graph;
pub mod memory;
pub mod migration;
mod staging;
pub mod storage;

// Re-exports for convenience
pub use error::StoreError;
pub use graph::{
    CommitReport, EdgeKey, GraphStats, NodeKey, Properties, PropertyValue, StoredEdge, StoredNode,
    WriteOp, WriteOutcome,
};
pub use memory::InMemoryGraphStore;
pub use storage::{GraphStore, RocksGraphStore};
