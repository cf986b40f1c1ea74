//! RocksDB graph storage
//!
//! Persistent property graph using RocksDB with LZ4 compression. Each commit
//! is staged against the current records and written as a single
//! `WriteBatch`, so a commit is either fully visible or not at all.

use parking_lot::Mutex;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::graph::{
    CommitReport, EdgeKey, GraphStats, NodeKey, StoredEdge, StoredNode, WriteOp,
};
use crate::staging::{self, RecordSource};

const SEP: char = '\0';

/// Upsert-only property graph storage.
///
/// `commit` must be atomic: either every op of the slice is applied or none.
pub trait GraphStore: Send + Sync {
    /// Apply a group of upserts atomically.
    fn commit(&self, ops: &[WriteOp]) -> Result<CommitReport>;

    fn node(&self, key: &NodeKey) -> Result<Option<StoredNode>>;

    fn edge(&self, key: &EdgeKey) -> Result<Option<StoredEdge>>;

    /// All nodes with `label` owned by `scope`.
    fn nodes_with_label(&self, label: &str, scope: &str) -> Result<Vec<StoredNode>>;

    fn edges_of_type(&self, rel_type: &str) -> Result<Vec<StoredEdge>>;

    fn stats(&self) -> Result<GraphStats>;

    /// Edges of `rel_type` leaving `from`.
    fn outgoing(&self, from: &NodeKey, rel_type: &str) -> Result<Vec<StoredEdge>> {
        Ok(self
            .edges_of_type(rel_type)?
            .into_iter()
            .filter(|e| &e.key.from == from)
            .collect())
    }
}

/// RocksDB-backed graph store
pub struct RocksGraphStore {
    db: Arc<DB>,
    write_lock: Mutex<()>,
    sync_writes: bool,
}

impl RocksGraphStore {
    /// Open (or create) a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_background_jobs(2);
        opts.set_bytes_per_sync(1048576); // 1MB
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;
        crate::migration::ensure_schema(&db)?;

        log::info!("RocksGraphStore opened at: {}", path.display());

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
            sync_writes: false,
        })
    }

    /// Fsync every commit before returning.
    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    fn get_record<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<T>> {
        let mut records = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            match bincode::deserialize::<T>(&value) {
                Ok(record) => records.push(record),
                Err(e) => {
                    log::warn!(
                        "Failed to deserialize record {}: {}. Skipping.",
                        String::from_utf8_lossy(&key),
                        e
                    );
                }
            }
        }
        Ok(records)
    }
}

impl RecordSource for RocksGraphStore {
    fn load_node(&self, key: &NodeKey) -> Result<Option<StoredNode>> {
        self.get_record(&node_db_key(key)?)
    }

    fn load_edge(&self, key: &EdgeKey) -> Result<Option<StoredEdge>> {
        self.get_record(&edge_db_key(key)?)
    }
}

impl GraphStore for RocksGraphStore {
    fn commit(&self, ops: &[WriteOp]) -> Result<CommitReport> {
        // Staging reads current records; hold the lock until the batch lands.
        let _guard = self.write_lock.lock();
        let staged = staging::stage(self, ops)?;

        let mut batch = WriteBatch::default();
        for node in staged.nodes.values() {
            batch.put(node_db_key(&node.key)?, bincode::serialize(node)?);
        }
        for edge in staged.edges.values() {
            batch.put(edge_db_key(&edge.key)?, bincode::serialize(edge)?);
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        log::debug!(
            "Committed {} ops ({} nodes, {} edges touched)",
            ops.len(),
            staged.nodes.len(),
            staged.edges.len()
        );
        Ok(staged.report)
    }

    fn node(&self, key: &NodeKey) -> Result<Option<StoredNode>> {
        self.load_node(key)
    }

    fn edge(&self, key: &EdgeKey) -> Result<Option<StoredEdge>> {
        self.load_edge(key)
    }

    fn nodes_with_label(&self, label: &str, scope: &str) -> Result<Vec<StoredNode>> {
        let prefix = encode(&["n", label, scope, ""])?;
        self.scan(&prefix)
    }

    fn edges_of_type(&self, rel_type: &str) -> Result<Vec<StoredEdge>> {
        let prefix = encode(&["e", rel_type, ""])?;
        self.scan(&prefix)
    }

    fn outgoing(&self, from: &NodeKey, rel_type: &str) -> Result<Vec<StoredEdge>> {
        let prefix = encode(&["e", rel_type, &from.label, &from.scope, &from.id, ""])?;
        self.scan(&prefix)
    }

    fn stats(&self) -> Result<GraphStats> {
        let mut stats = GraphStats::default();
        for node in self.scan::<StoredNode>(&encode(&["n", ""])?)? {
            stats.nodes += 1;
            if node.placeholder {
                stats.placeholders += 1;
            }
            *stats.nodes_by_label.entry(node.key.label).or_insert(0) += 1;
        }
        for edge in self.scan::<StoredEdge>(&encode(&["e", ""])?)? {
            stats.edges += 1;
            *stats.edges_by_type.entry(edge.key.rel_type).or_insert(0) += 1;
        }
        Ok(stats)
    }
}

fn encode(parts: &[&str]) -> Result<Vec<u8>> {
    if let Some(bad) = parts.iter().find(|p| p.contains(SEP)) {
        return Err(StoreError::invalid_key(format!(
            "key component contains NUL: {:?}",
            bad
        )));
    }
    Ok(parts.join(&SEP.to_string()).into_bytes())
}

fn node_db_key(key: &NodeKey) -> Result<Vec<u8>> {
    encode(&["n", &key.label, &key.scope, &key.id])
}

fn edge_db_key(key: &EdgeKey) -> Result<Vec<u8>> {
    encode(&[
        "e",
        &key.rel_type,
        &key.from.label,
        &key.from.scope,
        &key.from.id,
        &key.to.label,
        &key.to.scope,
        &key.to.id,
    ])
}
