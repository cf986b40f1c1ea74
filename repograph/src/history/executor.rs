//! Git command execution wrapper.

use super::parser::LOG_FORMAT;
use super::GitError;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Runs `git` against one repository.
#[derive(Debug, Clone)]
pub struct GitExecutor {
    repo_path: PathBuf,
}

impl GitExecutor {
    /// Create an executor, checking that git runs and `repo_path` is a repository.
    pub fn new(repo_path: &Path) -> Result<Self, GitError> {
        let output = Command::new("git")
            .arg("--version")
            .output()
            .map_err(|_| GitError::GitNotAvailable)?;
        if !output.status.success() {
            return Err(GitError::GitNotAvailable);
        }

        let output = Command::new("git")
            .current_dir(repo_path)
            .args(["rev-parse", "--git-dir"])
            .output()?;
        if !output.status.success() {
            return Err(GitError::NotARepository(repo_path.to_path_buf()));
        }

        Ok(Self {
            repo_path: repo_path.to_path_buf(),
        })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    fn run_raw(&self, args: &[&str]) -> Result<Vec<u8>, GitError> {
        let output = Command::new("git")
            .current_dir(&self.repo_path)
            .args(args)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::CommandFailed(stderr.trim().to_string()));
        }
        Ok(output.stdout)
    }

    fn run(&self, args: &[&str]) -> Result<String, GitError> {
        Ok(String::from_utf8_lossy(&self.run_raw(args)?).into_owned())
    }

    /// Whether `HEAD` points at a commit.
    pub fn has_commits(&self) -> bool {
        self.run(&["rev-parse", "--verify", "--quiet", "HEAD"]).is_ok()
    }

    /// Checked-out branch name, `HEAD` when detached.
    pub fn current_branch(&self) -> Result<String, GitError> {
        Ok(self.run(&["rev-parse", "--abbrev-ref", "HEAD"])?.trim().to_string())
    }

    /// One page of history reachable from `rev`, newest first, with raw and
    /// numstat change records. Paths are NUL-terminated and unquoted.
    pub fn log_page(&self, rev: &str, skip: usize, limit: usize) -> Result<Vec<u8>, GitError> {
        let format = format!("--format={LOG_FORMAT}");
        let skip = format!("--skip={skip}");
        let limit = format!("-n{limit}");
        self.run_raw(&[
            "log",
            "-z",
            &format,
            "--raw",
            "--numstat",
            "--no-renames",
            "--no-abbrev",
            &skip,
            &limit,
            rev,
            "--",
        ])
    }
}
