//! Parsing of `git log -z --raw --numstat` output.

use super::GitError;
use std::borrow::Cow;
use std::collections::HashMap;

/// Separator used in git log format output.
pub const FIELD_SEPARATOR: &str = "␞"; // ASCII Record Separator
pub const COMMIT_SEPARATOR: &str = "␝"; // ASCII Group Separator

/// Header of each commit; change lines follow it.
pub const LOG_FORMAT: &str = concat!(
    "␝", // commit separator
    "%H", "␞", // hash
    "%P", "␞", // parent hashes
    "%an", "␞", // author name
    "%ae", "␞", // author email
    "%aI", "␞", // author date, strict ISO 8601
    "%s"  // subject
);

/// How a commit touched a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Add,
    Delete,
    Modify,
    Copy,
    Rename,
    Unknown,
}

impl ChangeType {
    fn from_status(status: &str) -> Self {
        match status.chars().next() {
            Some('A') => Self::Add,
            Some('D') => Self::Delete,
            Some('M') | Some('T') => Self::Modify,
            Some('C') => Self::Copy,
            Some('R') => Self::Rename,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Delete => "DELETE",
            Self::Modify => "MODIFY",
            Self::Copy => "COPY",
            Self::Rename => "RENAME",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub change_type: ChangeType,
    pub added: i64,
    pub removed: i64,
    /// Line counts are zero for binary files.
    pub binary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub hash: String,
    pub parents: Vec<String>,
    pub author_name: String,
    pub author_email: String,
    pub author_date: String,
    pub subject: String,
    pub changes: Vec<FileChange>,
}

/// Parse `git log -z` output produced with [`LOG_FORMAT`].
///
/// Bytes that are not UTF-8 are decoded lossily, one warning per record.
pub fn parse_log(output: &[u8]) -> Result<Vec<CommitRecord>, GitError> {
    let mut commits = Vec::new();

    for record in split_on(output, COMMIT_SEPARATOR.as_bytes()) {
        let record = trim_newlines(record);
        if record.iter().all(|b| b.is_ascii_whitespace() || *b == 0) {
            continue;
        }
        let header_end = record
            .iter()
            .position(|b| *b == b'\n' || *b == 0)
            .unwrap_or(record.len());
        let header = decode(&record[..header_end], "commit header");
        let fields: Vec<&str> = header.splitn(6, FIELD_SEPARATOR).collect();
        let [hash, parents, author_name, author_email, author_date, subject] = fields[..] else {
            return Err(GitError::Parse(format!("malformed commit header: {header}")));
        };
        if hash.is_empty() {
            return Err(GitError::Parse("commit header without hash".to_string()));
        }

        let body = record.get(header_end + 1..).unwrap_or_default();
        commits.push(CommitRecord {
            changes: parse_changes(hash, body)?,
            hash: hash.to_string(),
            parents: parents.split_whitespace().map(str::to_string).collect(),
            author_name: author_name.to_string(),
            author_email: author_email.to_string(),
            author_date: author_date.to_string(),
            subject: subject.to_string(),
        });
    }

    Ok(commits)
}

fn split_on<'a>(bytes: &'a [u8], separator: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i + separator.len() <= bytes.len() {
        if &bytes[i..i + separator.len()] == separator {
            parts.push(&bytes[start..i]);
            i += separator.len();
            start = i;
        } else {
            i += 1;
        }
    }
    parts.push(&bytes[start..]);
    parts
}

fn trim_newlines(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != b'\n').unwrap_or(bytes.len());
    &bytes[start..]
}

fn decode(bytes: &[u8], what: &str) -> String {
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(text) => text.to_string(),
        Cow::Owned(text) => {
            tracing::warn!("Invalid UTF-8 in {}, decoded as {:?}", what, text);
            text
        }
    }
}

/// Raw records (`:meta\0path\0`) followed by numstat records
/// (`added\tremoved\tpath\0`).
fn parse_changes(hash: &str, body: &[u8]) -> Result<Vec<FileChange>, GitError> {
    let mut changes: Vec<FileChange> = Vec::new();
    let mut by_path: HashMap<String, usize> = HashMap::new();
    let what = format!("path of commit {hash}");

    let mut tokens = body
        .split(|b| *b == 0)
        .map(trim_newlines)
        .filter(|t| !t.is_empty());

    while let Some(token) = tokens.next() {
        if let Some(meta) = token.strip_prefix(b":") {
            let status = decode(meta, "raw status");
            let status = status.split_whitespace().last().unwrap_or_default();
            let path = tokens
                .next()
                .ok_or_else(|| GitError::Parse(format!("raw record without path in {hash}")))?;
            let path = decode(path, &what);
            by_path.insert(path.clone(), changes.len());
            changes.push(FileChange {
                path,
                change_type: ChangeType::from_status(status),
                added: 0,
                removed: 0,
                binary: false,
            });
            continue;
        }

        let mut parts = token.splitn(3, |b| *b == b'\t');
        let (Some(added), Some(removed), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(GitError::Parse(format!(
                "malformed numstat record in {hash}: {}",
                String::from_utf8_lossy(token)
            )));
        };
        let path = if path.is_empty() {
            // Rename form: counts, then old and new path records.
            tokens.next();
            tokens
                .next()
                .ok_or_else(|| GitError::Parse(format!("rename record without path in {hash}")))?
        } else {
            path
        };
        let path = decode(path, &what);

        let binary = added == b"-" && removed == b"-";
        let count = |value: &[u8]| -> Result<i64, GitError> {
            if binary {
                return Ok(0);
            }
            std::str::from_utf8(value)
                .ok()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| GitError::Parse(format!("bad line count for {path} in {hash}")))
        };
        let (added, removed) = (count(added)?, count(removed)?);

        match by_path.get(&path) {
            Some(&i) => {
                let change = &mut changes[i];
                change.added = added;
                change.removed = removed;
                change.binary = binary;
            }
            None => {
                by_path.insert(path.clone(), changes.len());
                changes.push(FileChange {
                    path,
                    change_type: ChangeType::Modify,
                    added,
                    removed,
                    binary,
                });
            }
        }
    }

    Ok(changes)
}
