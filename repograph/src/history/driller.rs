//! Maps commit history onto graph intents.

use super::executor::GitExecutor;
use super::parser::{parse_log, CommitRecord};
use super::GitError;
use crate::engine::{MergeEngine, MergeResult, MergeSummary};
use crate::error::IngestResult;
use crate::identity::{branch_key, commit_key, developer_key, file_key, path_hashes};
use crate::intent::{attrs, EdgeType, MergeIntent};
use repograph_store::Properties;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistorySummary {
    pub branch: String,
    pub commits: usize,
    pub developers: usize,
    pub files_touched: usize,
    pub pages: usize,
    pub cancelled: bool,
    pub merge: MergeSummary,
}

/// Walks a branch page by page and applies each page through the engine.
pub struct HistoryDriller {
    engine: MergeEngine,
    project_id: String,
    executor: GitExecutor,
    branch: Option<String>,
    max_commits: Option<usize>,
}

impl HistoryDriller {
    pub fn new(engine: MergeEngine, project_id: impl Into<String>, repo: &Path) -> IngestResult<Self> {
        Ok(Self {
            engine,
            project_id: project_id.into(),
            executor: GitExecutor::new(repo)?,
            branch: None,
            max_commits: None,
        })
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch.filter(|b| !b.trim().is_empty());
        self
    }

    pub fn with_max_commits(mut self, max_commits: Option<usize>) -> Self {
        self.max_commits = max_commits;
        self
    }

    async fn blocking<T, F>(&self, f: F) -> IngestResult<T>
    where
        T: Send + 'static,
        F: FnOnce(GitExecutor) -> Result<T, GitError> + Send + 'static,
    {
        let executor = self.executor.clone();
        let value = tokio::task::spawn_blocking(move || f(executor))
            .await
            .map_err(|e| GitError::CommandFailed(format!("git task failed: {e}")))??;
        Ok(value)
    }

    pub async fn run(&self, cancel: &CancellationToken) -> IngestResult<HistorySummary> {
        let mut summary = HistorySummary::default();
        if !self.blocking(|git| Ok(git.has_commits())).await? {
            tracing::warn!("{:?} has no commits", self.executor.repo_path());
            return Ok(summary);
        }

        let branch = match &self.branch {
            Some(b) => b.clone(),
            None => self.blocking(|git| git.current_branch()).await?,
        };
        summary.branch = branch.clone();
        tracing::info!("Drilling history of {} on {}", self.project_id, branch);

        let page_size = self.engine.config().batch_size.max(1);
        let mut result = MergeResult::default();
        let mut developers = HashSet::new();
        let mut files = HashSet::new();
        let mut skip = 0;

        loop {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let limit = match self.max_commits {
                Some(max) => page_size.min(max.saturating_sub(skip)),
                None => page_size,
            };
            if limit == 0 {
                break;
            }

            let rev = branch.clone();
            let output = self
                .blocking(move |git| git.log_page(&rev, skip, limit))
                .await?;
            let commits = parse_log(&output)?;
            if commits.is_empty() {
                break;
            }

            let mut intents = Vec::new();
            for commit in &commits {
                developers.insert(commit.author_email.trim().to_lowercase());
                files.extend(commit.changes.iter().map(|c| c.path.clone()));
                intents.extend(commit_intents(&self.project_id, &branch, commit));
            }
            tracing::debug!("Page at {}: {} commits, {} intents", skip, commits.len(), intents.len());

            result.merge(self.engine.apply_until(intents, cancel).await);
            summary.pages += 1;
            summary.commits += commits.len();
            skip += commits.len();
            if commits.len() < limit || result.cancelled {
                break;
            }
        }

        summary.cancelled |= result.cancelled;
        summary.developers = developers.len();
        summary.files_touched = files.len();
        summary.merge = result.summary();
        tracing::info!(
            "History drilled for {}: commits={}, developers={}, files={}",
            self.project_id,
            summary.commits,
            summary.developers,
            summary.files_touched
        );
        Ok(summary)
    }
}

/// Nodes and edges describing one commit on `branch`.
fn commit_intents(project: &str, branch: &str, commit: &CommitRecord) -> Vec<MergeIntent> {
    let commit_node = commit_key(project, &commit.hash);
    let developer = developer_key(project, &commit.author_email);
    let branch_node = branch_key(project, branch);

    let mut intents = vec![
        MergeIntent::node(
            commit_node.clone(),
            attrs([
                ("hash", commit.hash.as_str().into()),
                ("msg", commit.subject.as_str().into()),
                ("author_date", commit.author_date.as_str().into()),
                ("is_merge", (commit.parents.len() > 1).into()),
                ("project_id", project.into()),
            ]),
        ),
        MergeIntent::node(
            developer.clone(),
            attrs([
                ("name", commit.author_name.as_str().into()),
                ("email", developer.id.as_str().into()),
            ]),
        ),
        MergeIntent::node(
            branch_node.clone(),
            attrs([("name", branch.into()), ("project_id", project.into())]),
        ),
        MergeIntent::edge(EdgeType::Author, developer, commit_node.clone(), Properties::new()),
        MergeIntent::edge(
            EdgeType::BranchCommit,
            branch_node,
            commit_node.clone(),
            Properties::new(),
        ),
    ];

    for parent in &commit.parents {
        intents.push(MergeIntent::edge(
            EdgeType::Parent,
            commit_node.clone(),
            commit_key(project, parent),
            Properties::new(),
        ));
    }

    for change in &commit.changes {
        let file = path_hashes(project, &change.path);
        let file_node = file_key(project, &file.merge_hash);
        intents.push(file.node_intent(project));
        intents.push(MergeIntent::edge(
            EdgeType::UpdateFile,
            commit_node.clone(),
            file_node,
            attrs([
                ("added", change.added.into()),
                ("removed", change.removed.into()),
                ("change_type", change.change_type.as_str().into()),
            ]),
        ));
    }

    intents
}
