//! Error types for RepoGraph ingestion.

use crate::config::ConfigError;
use crate::history::GitError;
use repograph_store::StoreError;
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while extracting or merging facts.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid intent: {0}")]
    InvalidIntent(String),

    #[error("Unresolved file reference: {0}")]
    UnresolvedFileReference(String),

    #[error("Unknown category '{category}' in project {project_id}")]
    UnknownCategory {
        project_id: String,
        category: String,
    },

    #[error("Missing project scope for category '{0}'")]
    MissingProjectScope(String),

    #[error("Merge group {group} failed: {source}")]
    MergeGroupFailed {
        group: usize,
        #[source]
        source: StoreError,
    },

    #[error("No category generator available")]
    GeneratorUnavailable,

    #[error("Category generator failed: {0}")]
    Generator(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure classes reported in run summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidIntent,
    UnresolvedFileReference,
    UnknownCategory,
    MissingProjectScope,
    MergeGroupFailed,
    GeneratorUnavailable,
    Other,
}

impl IngestError {
    pub fn invalid_intent(msg: impl Into<String>) -> Self {
        Self::InvalidIntent(msg.into())
    }

    pub fn unresolved(reference: impl Into<String>) -> Self {
        Self::UnresolvedFileReference(reference.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIntent(_) => ErrorKind::InvalidIntent,
            Self::UnresolvedFileReference(_) => ErrorKind::UnresolvedFileReference,
            Self::UnknownCategory { .. } => ErrorKind::UnknownCategory,
            Self::MissingProjectScope(_) => ErrorKind::MissingProjectScope,
            Self::MergeGroupFailed { .. } => ErrorKind::MergeGroupFailed,
            Self::GeneratorUnavailable => ErrorKind::GeneratorUnavailable,
            _ => ErrorKind::Other,
        }
    }
}

/// Result type alias for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_category_display() {
        let err = IngestError::UnknownCategory {
            project_id: "shop".to_string(),
            category: "Nope".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown category 'Nope' in project shop");
        assert_eq!(err.kind(), ErrorKind::UnknownCategory);
    }

    #[test]
    fn test_merge_group_failed_display() {
        let err = IngestError::MergeGroupFailed {
            group: 3,
            source: StoreError::unavailable("connection reset"),
        };
        assert_eq!(err.kind(), ErrorKind::MergeGroupFailed);
        assert_eq!(
            err.to_string(),
            "Merge group 3 failed: Store unavailable: connection reset"
        );
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            IngestError::invalid_intent("x").kind(),
            ErrorKind::InvalidIntent
        );
        assert_eq!(
            IngestError::unresolved("abc").kind(),
            ErrorKind::UnresolvedFileReference
        );
        assert_eq!(
            IngestError::MissingProjectScope("Core".into()).kind(),
            ErrorKind::MissingProjectScope
        );
        let config: IngestError = ConfigError::invalid("batch_size must be positive").into();
        assert_eq!(config.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: IngestError = io_err.into();
        assert!(matches!(err, IngestError::Io(_)));
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UnresolvedFileReference).unwrap();
        assert_eq!(json, "\"unresolved_file_reference\"");
    }
}
