//! Batch merge engine.
//!
//! The single write path into the graph. Intents are validated, lowered to
//! store writes and committed in groups of at most `batch_size`. Each group is
//! atomic: it either lands completely or not at all, and a failed group never
//! disturbs groups committed before it.

use crate::error::{ErrorKind, IngestError};
use crate::intent::MergeIntent;
use repograph_store::{GraphStore, StoreError, WriteOp, WriteOutcome};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Max intents per transaction
    pub batch_size: usize,
    /// Concurrent group commits across all passes
    pub pool_size: usize,
    /// Extra attempts for a group whose commit failed
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            pool_size: 4,
            retry_attempts: 2,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

/// An intent rejected before reaching the store.
#[derive(Debug)]
pub struct SkippedIntent {
    /// Position in the submitted batch
    pub index: usize,
    pub intent: MergeIntent,
    pub error: IngestError,
}

/// A group whose commit failed after all retries.
#[derive(Debug)]
pub struct GroupFailure {
    pub group: usize,
    pub intents: Vec<MergeIntent>,
    pub error: IngestError,
}

/// Outcome of one engine pass.
#[derive(Debug, Default)]
pub struct MergeResult {
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub edges_created: usize,
    pub edges_updated: usize,
    pub unchanged: usize,
    pub placeholders_created: usize,
    pub groups_committed: usize,
    pub skipped: Vec<SkippedIntent>,
    pub failed_groups: Vec<GroupFailure>,
    /// Intents left unsubmitted after cancellation
    pub not_attempted: Vec<MergeIntent>,
    pub cancelled: bool,
}

/// Serializable counters of a [`MergeResult`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub edges_created: usize,
    pub edges_updated: usize,
    pub unchanged: usize,
    pub placeholders_created: usize,
    pub groups_committed: usize,
    pub skipped: usize,
    pub failed_groups: usize,
    pub not_attempted: usize,
    pub cancelled: bool,
    pub errors: BTreeMap<ErrorKind, usize>,
}

impl MergeResult {
    /// Intents that reached the graph, whether or not they changed it.
    pub fn applied(&self) -> usize {
        self.nodes_created + self.nodes_updated + self.edges_created + self.edges_updated + self.unchanged
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.failed_groups.is_empty() && self.not_attempted.is_empty()
    }

    /// Intents worth resubmitting: failed groups and unattempted work.
    pub fn retry_batch(&self) -> Vec<MergeIntent> {
        self.failed_groups
            .iter()
            .flat_map(|f| f.intents.iter().cloned())
            .chain(self.not_attempted.iter().cloned())
            .collect()
    }

    /// Fold a later pass into this one. Skip indices keep their own batch numbering.
    pub fn merge(&mut self, other: MergeResult) {
        self.nodes_created += other.nodes_created;
        self.nodes_updated += other.nodes_updated;
        self.edges_created += other.edges_created;
        self.edges_updated += other.edges_updated;
        self.unchanged += other.unchanged;
        self.placeholders_created += other.placeholders_created;
        self.groups_committed += other.groups_committed;
        self.skipped.extend(other.skipped);
        self.failed_groups.extend(other.failed_groups);
        self.not_attempted.extend(other.not_attempted);
        self.cancelled |= other.cancelled;
    }

    pub fn summary(&self) -> MergeSummary {
        let mut errors = BTreeMap::new();
        for kind in self
            .skipped
            .iter()
            .map(|s| s.error.kind())
            .chain(self.failed_groups.iter().map(|f| f.error.kind()))
        {
            *errors.entry(kind).or_insert(0) += 1;
        }
        MergeSummary {
            nodes_created: self.nodes_created,
            nodes_updated: self.nodes_updated,
            edges_created: self.edges_created,
            edges_updated: self.edges_updated,
            unchanged: self.unchanged,
            placeholders_created: self.placeholders_created,
            groups_committed: self.groups_committed,
            skipped: self.skipped.len(),
            failed_groups: self.failed_groups.len(),
            not_attempted: self.not_attempted.len(),
            cancelled: self.cancelled,
            errors,
        }
    }

    fn record(&mut self, intents: &[MergeIntent], outcomes: &[WriteOutcome]) {
        for (intent, outcome) in intents.iter().zip(outcomes) {
            match (intent.is_edge(), outcome) {
                (false, WriteOutcome::Created) => self.nodes_created += 1,
                (false, WriteOutcome::Updated) => self.nodes_updated += 1,
                (true, WriteOutcome::Created) => self.edges_created += 1,
                (true, WriteOutcome::Updated) => self.edges_updated += 1,
                (_, WriteOutcome::Unchanged) => self.unchanged += 1,
            }
        }
    }
}

/// Applies merge intents to a [`GraphStore`].
#[derive(Clone)]
pub struct MergeEngine {
    store: Arc<dyn GraphStore>,
    config: EngineConfig,
    permits: Arc<Semaphore>,
}

impl MergeEngine {
    pub fn new(store: Arc<dyn GraphStore>, config: EngineConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.pool_size.max(1)));
        Self {
            store,
            config,
            permits,
        }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn apply(&self, batch: Vec<MergeIntent>) -> MergeResult {
        self.apply_until(batch, &CancellationToken::new()).await
    }

    /// Apply a batch, stopping between groups once `cancel` fires.
    pub async fn apply_until(
        &self,
        batch: Vec<MergeIntent>,
        cancel: &CancellationToken,
    ) -> MergeResult {
        let mut result = MergeResult::default();
        let mut valid = Vec::with_capacity(batch.len());

        for (index, intent) in batch.into_iter().enumerate() {
            match intent.to_write_op() {
                Ok(op) => valid.push((intent, op)),
                Err(error) => {
                    tracing::warn!("Skipping intent {}: {}", index, error);
                    result.skipped.push(SkippedIntent {
                        index,
                        intent,
                        error,
                    });
                }
            }
        }

        let batch_size = self.config.batch_size.max(1);
        let mut pending = valid.into_iter().peekable();
        let mut group = 0;

        while pending.peek().is_some() {
            if cancel.is_cancelled() {
                result.cancelled = true;
                result.not_attempted.extend(pending.map(|(intent, _)| intent));
                tracing::info!(
                    "Merge cancelled before group {}, {} intents not attempted",
                    group,
                    result.not_attempted.len()
                );
                break;
            }

            let (intents, ops): (Vec<MergeIntent>, Vec<WriteOp>) =
                pending.by_ref().take(batch_size).unzip();

            match self.commit_group(group, ops).await {
                Ok(report) => {
                    result.record(&intents, &report.outcomes);
                    result.placeholders_created += report.placeholders_created;
                    result.groups_committed += 1;
                    tracing::debug!("Committed group {} ({} intents)", group, intents.len());
                }
                Err(source) => {
                    tracing::error!("Group {} failed: {}", group, source);
                    result.failed_groups.push(GroupFailure {
                        group,
                        intents,
                        error: IngestError::MergeGroupFailed { group, source },
                    });
                }
            }
            group += 1;
        }

        result
    }

    async fn commit_group(
        &self,
        group: usize,
        ops: Vec<WriteOp>,
    ) -> Result<repograph_store::CommitReport, StoreError> {
        let ops: Arc<[WriteOp]> = ops.into();
        let mut attempt = 0;
        loop {
            match self.commit_once(Arc::clone(&ops)).await {
                Ok(report) => return Ok(report),
                Err(e) if attempt < self.config.retry_attempts => {
                    attempt += 1;
                    tracing::warn!(
                        "Group {} commit failed ({}), retry {}/{}",
                        group,
                        e,
                        attempt,
                        self.config.retry_attempts
                    );
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn commit_once(
        &self,
        ops: Arc<[WriteOp]>,
    ) -> Result<repograph_store::CommitReport, StoreError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| StoreError::unavailable("commit permit pool closed"))?;
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            store.commit(&ops)
        })
        .await
        .map_err(|e| StoreError::other(format!("commit task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::path_hashes;
    use crate::intent::{attrs, EdgeType, MergeKey, NodeLabel};
    use repograph_store::{
        CommitReport, EdgeKey, GraphStats, InMemoryGraphStore, NodeKey, Properties,
        PropertyValue, RocksGraphStore, StoredEdge, StoredNode,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the commit calls whose 0-based sequence number is listed.
    struct FlakyStore {
        inner: InMemoryGraphStore,
        calls: AtomicUsize,
        fail_on: Vec<usize>,
        cancel_after_first: Option<CancellationToken>,
    }

    impl FlakyStore {
        fn failing(fail_on: Vec<usize>) -> Self {
            Self {
                inner: InMemoryGraphStore::new(),
                calls: AtomicUsize::new(0),
                fail_on,
                cancel_after_first: None,
            }
        }
    }

    impl GraphStore for FlakyStore {
        fn commit(&self, ops: &[WriteOp]) -> repograph_store::error::Result<CommitReport> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = &self.cancel_after_first {
                token.cancel();
            }
            if self.fail_on.contains(&call) {
                return Err(StoreError::unavailable("injected failure"));
            }
            self.inner.commit(ops)
        }
        fn node(&self, key: &NodeKey) -> repograph_store::error::Result<Option<StoredNode>> {
            self.inner.node(key)
        }
        fn edge(&self, key: &EdgeKey) -> repograph_store::error::Result<Option<StoredEdge>> {
            self.inner.edge(key)
        }
        fn nodes_with_label(
            &self,
            label: &str,
            scope: &str,
        ) -> repograph_store::error::Result<Vec<StoredNode>> {
            self.inner.nodes_with_label(label, scope)
        }
        fn edges_of_type(&self, rel_type: &str) -> repograph_store::error::Result<Vec<StoredEdge>> {
            self.inner.edges_of_type(rel_type)
        }
        fn stats(&self) -> repograph_store::error::Result<GraphStats> {
            self.inner.stats()
        }
    }

    fn config(batch_size: usize, retry_attempts: u32) -> EngineConfig {
        EngineConfig {
            batch_size,
            pool_size: 2,
            retry_attempts,
            retry_backoff: Duration::from_millis(1),
        }
    }

    fn file_intent(path: &str) -> MergeIntent {
        path_hashes("p", path).node_intent("p")
    }

    fn file(path: &str) -> MergeKey {
        crate::identity::file_key("p", &path_hashes("p", path).merge_hash)
    }

    fn imports(from: &str, to: &str) -> MergeIntent {
        MergeIntent::edge(EdgeType::Imports, file(from), file(to), Properties::new())
    }

    fn files(n: usize) -> Vec<MergeIntent> {
        (0..n).map(|i| file_intent(&format!("src/f{i}.ts"))).collect()
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let store = Arc::new(InMemoryGraphStore::new());
        let engine = MergeEngine::new(store.clone(), config(3, 0));
        let mut batch = files(4);
        batch.push(imports("src/f0.ts", "src/f1.ts"));
        batch.push(imports("src/f1.ts", "src/f2.ts"));

        let first = engine.apply(batch.clone()).await;
        assert_eq!(first.nodes_created, 4);
        assert_eq!(first.edges_created, 2);
        assert_eq!(first.groups_committed, 2);
        let after_first = store.stats().unwrap();

        for _ in 0..3 {
            let again = engine.apply(batch.clone()).await;
            assert_eq!(again.unchanged, 6);
            assert_eq!(again.nodes_created + again.edges_created, 0);
        }
        assert_eq!(store.stats().unwrap(), after_first);
    }

    #[tokio::test]
    async fn test_latest_attributes_win() {
        let store = Arc::new(InMemoryGraphStore::new());
        let engine = MergeEngine::new(store.clone(), config(10, 0));
        let key = file("src/a.ts");
        let with_keywords = |words: &[&str]| {
            MergeIntent::node(
                key.clone(),
                attrs([(
                    "keywords",
                    PropertyValue::from(words.iter().map(|w| w.to_string()).collect::<Vec<_>>()),
                )]),
            )
        };

        engine.apply(vec![with_keywords(&["old"])]).await;
        let result = engine.apply(vec![with_keywords(&["new"])]).await;
        assert_eq!(result.nodes_updated, 1);

        let node = store.node(&key.to_node_key()).unwrap().unwrap();
        assert_eq!(
            node.property("keywords").and_then(|v| v.as_list()),
            Some(&["new".to_string()][..])
        );
    }

    #[tokio::test]
    async fn test_invalid_intent_is_skipped_rest_applied() {
        let store = Arc::new(InMemoryGraphStore::new());
        let engine = MergeEngine::new(store.clone(), config(4, 0));
        let mut batch = files(9);
        batch.insert(
            5,
            MergeIntent::node(MergeKey::new(NodeLabel::File, "p", ""), Properties::new()),
        );

        let result = engine.apply(batch).await;
        assert_eq!(result.applied(), 9);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].index, 5);
        assert!(matches!(
            result.skipped[0].error,
            IngestError::InvalidIntent(_)
        ));
        assert_eq!(store.stats().unwrap().nodes, 9);
        assert_eq!(result.summary().errors[&ErrorKind::InvalidIntent], 1);
    }

    #[tokio::test]
    async fn test_placeholder_converges_in_any_order() {
        let node = file_intent("src/a.ts");
        let edge = imports("src/b.ts", "src/a.ts");

        let edge_first = Arc::new(InMemoryGraphStore::new());
        let engine = MergeEngine::new(edge_first.clone(), config(10, 0));
        let result = engine.apply(vec![edge.clone()]).await;
        assert_eq!(result.placeholders_created, 2);
        engine.apply(vec![node.clone()]).await;

        let node_first = Arc::new(InMemoryGraphStore::new());
        let engine = MergeEngine::new(node_first.clone(), config(10, 0));
        engine.apply(vec![node, edge]).await;

        let key = file("src/a.ts").to_node_key();
        let a = edge_first.node(&key).unwrap().unwrap();
        let b = node_first.node(&key).unwrap().unwrap();
        assert!(!a.placeholder);
        assert_eq!(a, b);
        assert_eq!(edge_first.stats().unwrap(), node_first.stats().unwrap());
        assert_eq!(edge_first.stats().unwrap().placeholders, 1);
    }

    #[tokio::test]
    async fn test_failed_group_keeps_earlier_groups() {
        let store = Arc::new(FlakyStore::failing(vec![1]));
        let engine = MergeEngine::new(store.clone(), config(3, 0));

        let result = engine.apply(files(9)).await;
        assert_eq!(result.groups_committed, 2);
        assert_eq!(result.failed_groups.len(), 1);
        let failure = &result.failed_groups[0];
        assert_eq!(failure.group, 1);
        assert_eq!(failure.intents.len(), 3);
        assert!(matches!(
            failure.error,
            IngestError::MergeGroupFailed { group: 1, .. }
        ));
        assert_eq!(store.stats().unwrap().nodes, 6);

        // Resubmitting the failed group completes the graph.
        let retry = engine.apply(result.retry_batch()).await;
        assert!(retry.is_complete());
        assert_eq!(store.stats().unwrap().nodes, 9);
    }

    #[tokio::test]
    async fn test_group_is_retried() {
        let store = Arc::new(FlakyStore::failing(vec![0, 1]));
        let engine = MergeEngine::new(store.clone(), config(10, 2));

        let result = engine.apply(files(3)).await;
        assert!(result.is_complete());
        assert_eq!(result.nodes_created, 3);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permit_released_after_exhausted_retries() {
        let store = Arc::new(FlakyStore::failing(vec![0, 1, 2]));
        let engine = MergeEngine::new(
            store.clone(),
            EngineConfig {
                pool_size: 1,
                ..config(1, 2)
            },
        );

        let result = tokio::time::timeout(Duration::from_secs(10), engine.apply(files(3)))
            .await
            .expect("later groups must still get a commit permit");
        assert_eq!(result.failed_groups.len(), 1);
        assert_eq!(result.failed_groups[0].group, 0);
        assert_eq!(result.groups_committed, 2);
        assert_eq!(store.calls.load(Ordering::SeqCst), 5);
        assert_eq!(store.stats().unwrap().nodes, 2);
        assert_eq!(engine.permits.available_permits(), 1);

        let again = tokio::time::timeout(Duration::from_secs(10), engine.apply(files(1)))
            .await
            .expect("pool must not leak permits across calls");
        assert!(again.is_complete());
    }

    async fn assert_concurrent_merges_keep_every_property(store: Arc<dyn GraphStore>) {
        let engine = MergeEngine::new(Arc::clone(&store), config(1, 0));
        let key = file("src/shared.ts");
        let writes = |prefix: &str| -> Vec<MergeIntent> {
            (0..25)
                .map(|i| {
                    let name = format!("{prefix}{i}");
                    MergeIntent::node(
                        key.clone(),
                        attrs([(name.as_str(), PropertyValue::from(i as i64))]),
                    )
                })
                .collect()
        };

        let left = engine.clone();
        let right = engine.clone();
        let (a, b) = tokio::join!(
            tokio::spawn({
                let batch = writes("a");
                async move { left.apply(batch).await }
            }),
            tokio::spawn({
                let batch = writes("b");
                async move { right.apply(batch).await }
            }),
        );
        assert!(a.unwrap().is_complete());
        assert!(b.unwrap().is_complete());

        let node = store.node(&key.to_node_key()).unwrap().unwrap();
        assert_eq!(node.properties.len(), 50);
        for i in 0..25i64 {
            assert_eq!(node.property(&format!("a{i}")), Some(&PropertyValue::from(i)));
            assert_eq!(node.property(&format!("b{i}")), Some(&PropertyValue::from(i)));
        }
        assert_eq!(store.stats().unwrap().nodes, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_applies_in_memory() {
        assert_concurrent_merges_keep_every_property(Arc::new(InMemoryGraphStore::new())).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_applies_rocksdb() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksGraphStore::open(dir.path().join("graph")).unwrap();
        assert_concurrent_merges_keep_every_property(Arc::new(store)).await;
    }

    #[tokio::test]
    async fn test_cancel_between_groups() {
        let token = CancellationToken::new();
        let store = Arc::new(FlakyStore {
            cancel_after_first: Some(token.clone()),
            ..FlakyStore::failing(vec![])
        });
        let engine = MergeEngine::new(store.clone(), config(2, 0));

        let result = engine.apply_until(files(7), &token).await;
        assert!(result.cancelled);
        assert_eq!(result.groups_committed, 1);
        assert_eq!(result.not_attempted.len(), 5);
        assert_eq!(store.stats().unwrap().nodes, 2);
        assert_eq!(result.retry_batch().len(), 5);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let engine = MergeEngine::new(Arc::new(InMemoryGraphStore::new()), config(2, 0));
        let result = engine.apply_until(files(3), &token).await;
        assert_eq!(result.groups_committed, 0);
        assert_eq!(result.not_attempted.len(), 3);
    }

    #[tokio::test]
    async fn test_merge_results() {
        let engine = MergeEngine::new(Arc::new(InMemoryGraphStore::new()), config(5, 0));
        let mut total = engine.apply(files(2)).await;
        total.merge(engine.apply(vec![imports("src/f0.ts", "src/f1.ts")]).await);
        let summary = total.summary();
        assert_eq!(summary.nodes_created, 2);
        assert_eq!(summary.edges_created, 1);
        assert_eq!(summary.groups_committed, 2);
        assert!(summary.errors.is_empty());
    }
}
