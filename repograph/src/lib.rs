//! RepoGraph
//!
//! Incremental ingestion of a repository's history and static structure into
//! an upsert-only property graph.
//!
//! Independent extractors (the history driller, the dependency pass and the
//! category manager) turn what they find into [`MergeIntent`]s keyed by
//! stable merge keys. The [`MergeEngine`] validates each batch and commits it
//! in atomic groups, so re-running any extractor converges on the same graph.

pub mod categories;
pub mod config;
pub mod deps;
pub mod engine;
pub mod error;
pub mod history;
pub mod identity;
pub mod intent;
pub mod keywords;
pub mod language;

pub use categories::{
    CategorizeRequest, CategoryGenerator, CategoryManager, CategorySpec, CategorySummary,
    CommandGenerator, FileCategoryAssignment,
};
pub use config::{Config, ConfigError};
pub use deps::{DependencyDriller, DepsSummary};
pub use engine::{EngineConfig, MergeEngine, MergeResult, MergeSummary};
pub use error::{ErrorKind, IngestError, IngestResult};
pub use history::{GitError, HistoryDriller, HistorySummary};
pub use identity::{FileRef, IdentityResolver};
pub use intent::{EdgeType, MergeIntent, MergeKey, NodeLabel};
pub use language::Language;
