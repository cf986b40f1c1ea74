//! Working tree walking with gitignore rules.

use crate::language::Language;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directories never descended into
pub const DEFAULT_IGNORES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".venv",
    "node_modules",
    "dist",
    "build",
    "__pycache__",
    ".cache",
];

/// A source file found in the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingFile {
    /// Repository-relative, `/`-separated
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub language: Language,
}

/// Compiled gitignore rules rooted at the working tree.
///
/// Later sources override earlier ones, so a `!pattern` in `.gitignore`
/// can re-include what a default excluded.
pub struct IgnoreRules {
    gitignore: Gitignore,
}

impl IgnoreRules {
    /// Defaults, the repository `.gitignore`, an optional extra ignore file
    /// and configured patterns, in that order.
    pub fn load(
        root: &Path,
        ignore_file: Option<&Path>,
        extra: &[String],
    ) -> Result<Self, ignore::Error> {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in DEFAULT_IGNORES {
            builder.add_line(None, pattern)?;
        }

        let gitignore = root.join(".gitignore");
        if gitignore.exists() {
            if let Some(e) = builder.add(&gitignore) {
                tracing::warn!("Problem reading {:?}: {}", gitignore, e);
            }
        }
        if let Some(path) = ignore_file {
            if let Some(e) = builder.add(path) {
                tracing::warn!("Problem reading ignore file {:?}: {}", path, e);
            }
        }
        for pattern in extra {
            builder.add_line(None, pattern)?;
        }

        Ok(Self {
            gitignore: builder.build()?,
        })
    }

    /// Build from gitignore-style lines only.
    pub fn from_lines<'a>(
        root: &Path,
        lines: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ignore::Error> {
        let mut builder = GitignoreBuilder::new(root);
        for line in lines {
            builder.add_line(None, line)?;
        }
        Ok(Self {
            gitignore: builder.build()?,
        })
    }

    /// `rel_path` is relative to the root the rules were built for.
    pub fn is_ignored(&self, rel_path: &Path, is_dir: bool) -> bool {
        self.gitignore.matched(rel_path, is_dir).is_ignore()
    }

    /// Number of ignore and whitelist globs.
    pub fn len(&self) -> usize {
        (self.gitignore.num_ignores() + self.gitignore.num_whitelists()) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.gitignore.is_empty()
    }
}

/// Collect supported source files under `root`, sorted by path.
pub fn walk(root: &Path, rules: &IgnoreRules) -> Vec<WorkingFile> {
    let relative = |path: &Path| path.strip_prefix(root).map(Path::to_path_buf).ok();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            match relative(entry.path()) {
                Some(rel) => !rules.is_ignored(&rel, entry.file_type().is_dir()),
                None => false,
            }
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Cannot walk {:?}: {}", e.path(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(language) = Language::from_path(entry.path()) else {
            continue;
        };
        let Some(rel) = relative(entry.path()) else {
            continue;
        };
        files.push(WorkingFile {
            rel_path: rel.to_string_lossy().replace('\\', "/"),
            abs_path: entry.into_path(),
            language,
        });
    }
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    files
}
