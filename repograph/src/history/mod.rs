//! Commit history drilling through the `git` CLI.
//!
//! Commits, authors, the drilled branch and touched files become
//! Commit/Developer/Branch/File nodes joined by AUTHOR, PARENT,
//! BRANCH_COMMIT and UPDATE_FILE edges. File identity is shared with the
//! dependency pass through [`crate::identity`].

mod driller;
mod error;
mod executor;
mod parser;

pub use driller::{HistoryDriller, HistorySummary};
pub use error::GitError;
pub use executor::GitExecutor;
pub use parser::{parse_log, ChangeType, CommitRecord, FileChange, LOG_FORMAT};
