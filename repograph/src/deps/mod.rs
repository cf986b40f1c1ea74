//! Static dependency and keyword extraction for the working tree.
//!
//! Files are read by a bounded pool of tasks. Each task extracts keywords and
//! import specifiers, resolves them against the working tree and produces
//! merge intents; only files already present as File nodes participate.

pub mod imports;
pub mod resolve;
pub mod walker;

use crate::config::{ConfigError, IngestConfig};
use crate::engine::{MergeEngine, MergeSummary};
use crate::error::IngestResult;
use crate::identity::{file_key, path_hashes, FileIndex};
use crate::intent::{EdgeType, MergeIntent};
use crate::keywords::{extract_keywords, keyword_intent, top_level_identifiers};
use dashmap::DashSet;
use repograph_store::Properties;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub use imports::{extract_imports, ImportSpec};
pub use resolve::ImportResolver;
pub use walker::{IgnoreRules, WorkingFile};

/// Counters reported by a dependency pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DepsSummary {
    pub files_scanned: usize,
    pub keyworded_files: usize,
    pub imports: usize,
    pub unresolved_imports: usize,
    pub unreadable_files: usize,
    pub merge: MergeSummary,
}

struct FileOutcome {
    rel_path: String,
    intents: Vec<MergeIntent>,
    keyworded: bool,
    imports: usize,
    unresolved: usize,
}

/// Shared, read-only state of one pass.
struct PassContext {
    project_id: String,
    index: FileIndex,
    working_paths: HashSet<String>,
    extensions: Vec<String>,
    keyword_limit: usize,
    seen_imports: DashSet<(String, String)>,
}

impl PassContext {
    fn process(&self, file: &WorkingFile, source: &str) -> Option<FileOutcome> {
        let source_id = path_hashes(&self.project_id, &file.rel_path);
        if !self.index.contains_merge_hash(&source_id.merge_hash) {
            tracing::debug!("Skipping {}: no File node", file.rel_path);
            return None;
        }

        let identifiers = top_level_identifiers(file.language, source);
        let keywords = extract_keywords(&file.rel_path, &identifiers, self.keyword_limit);
        let mut intents = vec![keyword_intent(&self.project_id, &file.rel_path, keywords)];

        let resolver = ImportResolver::new(&self.working_paths, &self.extensions);
        let mut imports = 0;
        let mut unresolved = 0;
        for spec in extract_imports(file.language, source) {
            let Some(target) = resolver.resolve(&file.rel_path, file.language, &spec) else {
                tracing::trace!("Unresolved import {} in {}", spec.specifier(), file.rel_path);
                unresolved += 1;
                continue;
            };
            let target_id = path_hashes(&self.project_id, &target);
            if target_id.merge_hash == source_id.merge_hash
                || !self.index.contains_merge_hash(&target_id.merge_hash)
            {
                unresolved += 1;
                continue;
            }
            let pair = (source_id.merge_hash.clone(), target_id.merge_hash.clone());
            if !self.seen_imports.insert(pair) {
                continue;
            }
            imports += 1;
            intents.push(MergeIntent::edge(
                EdgeType::Imports,
                file_key(&self.project_id, &source_id.merge_hash),
                file_key(&self.project_id, &target_id.merge_hash),
                Properties::new(),
            ));
        }

        Some(FileOutcome {
            rel_path: file.rel_path.clone(),
            intents,
            keyworded: true,
            imports,
            unresolved,
        })
    }
}

/// Extracts IMPORTS edges and keywords for one project's working tree.
pub struct DependencyDriller {
    engine: MergeEngine,
    project_id: String,
    repo_root: PathBuf,
    ingest: IngestConfig,
    ignore_file: Option<PathBuf>,
}

impl DependencyDriller {
    pub fn new(
        engine: MergeEngine,
        project_id: impl Into<String>,
        repo_root: impl Into<PathBuf>,
        ingest: IngestConfig,
    ) -> Self {
        Self {
            engine,
            project_id: project_id.into(),
            repo_root: repo_root.into(),
            ingest,
            ignore_file: None,
        }
    }

    pub fn with_ignore_file(mut self, path: Option<PathBuf>) -> Self {
        self.ignore_file = path;
        self
    }

    pub async fn run(&self, cancel: &CancellationToken) -> IngestResult<DepsSummary> {
        let index = FileIndex::load(self.engine.store().as_ref(), &self.project_id)?;
        if index.is_empty() {
            tracing::warn!("No File nodes found for project {}", self.project_id);
            return Ok(DepsSummary::default());
        }

        let rules = IgnoreRules::load(
            &self.repo_root,
            self.ignore_file.as_deref(),
            &self.ingest.ignore,
        )
        .map_err(|e| ConfigError::invalid(format!("ignore pattern: {e}")))?;
        let files = walker::walk(&self.repo_root, &rules);
        if files.is_empty() {
            tracing::warn!("No working tree files found under {:?}", self.repo_root);
            return Ok(DepsSummary::default());
        }
        tracing::info!(
            "Scanning {} files ({} ignore patterns)",
            files.len(),
            rules.len()
        );

        let context = Arc::new(PassContext {
            project_id: self.project_id.clone(),
            index,
            working_paths: files.iter().map(|f| f.rel_path.clone()).collect(),
            extensions: self.ingest.candidate_extensions.clone(),
            keyword_limit: self.ingest.keyword_limit,
            seen_imports: DashSet::new(),
        });

        let mut summary = DepsSummary {
            files_scanned: files.len(),
            ..Default::default()
        };
        let outcomes = self.scan(files, &context, cancel, &mut summary).await;

        let mut intents = Vec::new();
        for outcome in outcomes {
            summary.keyworded_files += usize::from(outcome.keyworded);
            summary.imports += outcome.imports;
            summary.unresolved_imports += outcome.unresolved;
            intents.extend(outcome.intents);
        }

        let result = self.engine.apply_until(intents, cancel).await;
        summary.merge = result.summary();
        tracing::info!(
            "Deps run complete: IMPORTS added={}, files keyworded={}",
            summary.imports,
            summary.keyworded_files
        );
        Ok(summary)
    }

    async fn scan(
        &self,
        files: Vec<WorkingFile>,
        context: &Arc<PassContext>,
        cancel: &CancellationToken,
        summary: &mut DepsSummary,
    ) -> Vec<FileOutcome> {
        let permits = Arc::new(Semaphore::new(self.ingest.workers.max(1)));
        let mut tasks = JoinSet::new();

        for file in files {
            if cancel.is_cancelled() {
                tracing::info!("Dependency scan cancelled");
                break;
            }
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let context = Arc::clone(context);
            tasks.spawn(async move {
                let _permit = permit;
                match tokio::fs::read(&file.abs_path).await {
                    Ok(bytes) => Ok(context.process(&file, &String::from_utf8_lossy(&bytes))),
                    Err(e) => Err((file.rel_path, e)),
                }
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(Some(outcome))) => outcomes.push(outcome),
                Ok(Ok(None)) => {}
                Ok(Err((path, e))) => {
                    tracing::warn!("Failed to read {}: {}", path, e);
                    summary.unreadable_files += 1;
                }
                Err(e) => {
                    tracing::warn!("Extraction task failed: {}", e);
                    summary.unreadable_files += 1;
                }
            }
        }
        // Completion order is arbitrary; keep intents deterministic.
        outcomes.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        outcomes
    }
}
