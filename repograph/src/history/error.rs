//! Error types for history drilling.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitError {
    #[error("Git is not available on this system")]
    GitNotAvailable,

    #[error("Path is not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("Git command failed: {0}")]
    CommandFailed(String),

    #[error("Failed to parse git output: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
