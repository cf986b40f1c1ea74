//! Configuration for ingestion runs.
//!
//! Loaded from a YAML file with three sections:
//!
//! ```yaml
//! store:
//!   path: .repograph/db
//!   batch_size: 500
//!   pool_size: 4
//!   retry_attempts: 2
//! project:
//!   repo: /path/to/repo
//!   project_id: my-project
//!   branch: main
//!   max_commits: 10000
//! ingest:
//!   workers: 8
//!   candidate_extensions: [".ts", ".tsx", ".js"]
//!   keyword_limit: 20
//!   ignore: ["vendor/**"]
//! ```

use crate::engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub project: ProjectConfig,
    pub ingest: IngestConfig,
}

/// Graph store and merge engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// RocksDB directory
    pub path: PathBuf,
    /// Max intents per transaction
    pub batch_size: usize,
    /// Concurrent commit permits
    pub pool_size: usize,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    /// fsync every commit
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".repograph/db"),
            batch_size: 500,
            pool_size: 4,
            retry_attempts: 2,
            retry_backoff_ms: 200,
            sync_writes: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Repository working tree
    pub repo: PathBuf,
    pub project_id: String,
    /// Branch to drill; the checked-out branch when unset
    pub branch: Option<String>,
    pub max_commits: Option<usize>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            repo: PathBuf::from("."),
            project_id: String::new(),
            branch: None,
            max_commits: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Files read concurrently by the dependency extractor
    pub workers: usize,
    /// Suffixes tried when an import omits its extension
    pub candidate_extensions: Vec<String>,
    pub keyword_limit: usize,
    /// Extra glob patterns excluded from the working tree walk
    pub ignore: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            candidate_extensions: [".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".php"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            keyword_limit: 20,
            ignore: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Override the configured project id (CLI flag wins).
    pub fn with_project_id(mut self, project_id: Option<String>) -> Self {
        if let Some(id) = project_id {
            self.project.project_id = id;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.project_id.trim().is_empty() {
            return Err(ConfigError::invalid("project.project_id must not be empty"));
        }
        if self.store.batch_size == 0 {
            return Err(ConfigError::invalid("store.batch_size must be positive"));
        }
        if self.store.pool_size == 0 {
            return Err(ConfigError::invalid("store.pool_size must be positive"));
        }
        if self.ingest.workers == 0 {
            return Err(ConfigError::invalid("ingest.workers must be positive"));
        }
        if let Some(bad) = self
            .ingest
            .candidate_extensions
            .iter()
            .find(|ext| !ext.starts_with('.'))
        {
            return Err(ConfigError::invalid(format!(
                "candidate extension '{bad}' must start with '.'"
            )));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            batch_size: self.store.batch_size,
            pool_size: self.store.pool_size,
            retry_attempts: self.store.retry_attempts,
            retry_backoff: Duration::from_millis(self.store.retry_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.store.batch_size, 500);
        assert_eq!(config.store.pool_size, 4);
        assert_eq!(config.ingest.keyword_limit, 20);
        assert!(config
            .ingest
            .candidate_extensions
            .contains(&".tsx".to_string()));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml_str(
            "project:\n  project_id: shop\n  branch: main\nstore:\n  batch_size: 50\n",
        )
        .unwrap();
        assert_eq!(config.project.project_id, "shop");
        assert_eq!(config.project.branch.as_deref(), Some("main"));
        assert_eq!(config.store.batch_size, 50);
        assert_eq!(config.store.pool_size, 4);
        assert_eq!(config.ingest.workers, 8);
        config.validate().unwrap();
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "project:\n  project_id: docs\ningest:\n  keyword_limit: 5").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.project.project_id, "docs");
        assert_eq!(config.ingest.keyword_limit, 5);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = Config::from_file(Path::new("/nonexistent/repograph.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(Config::default().validate().is_err());

        let mut config = Config::default().with_project_id(Some("p".into()));
        config.validate().unwrap();

        config.store.batch_size = 0;
        assert!(config.validate().is_err());

        config.store.batch_size = 10;
        config.ingest.candidate_extensions = vec!["ts".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_project_id_overrides() {
        let config = Config::from_yaml_str("project:\n  project_id: from-file\n")
            .unwrap()
            .with_project_id(Some("from-cli".into()));
        assert_eq!(config.project.project_id, "from-cli");

        let unchanged = Config::from_yaml_str("project:\n  project_id: from-file\n")
            .unwrap()
            .with_project_id(None);
        assert_eq!(unchanged.project.project_id, "from-file");
    }

    #[test]
    fn test_engine_config() {
        let config = Config::default();
        let engine = config.engine_config();
        assert_eq!(engine.batch_size, 500);
        assert_eq!(engine.retry_backoff, Duration::from_millis(200));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            Config::from_yaml_str("store: [unclosed"),
            Err(ConfigError::Parse(_))
        ));
    }
}
