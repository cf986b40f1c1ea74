//! Merge-key derivation and file reference resolution.
//!
//! Every extractor derives node identity through this module so that the
//! history driller, the dependency extractor and category assignments agree
//! on which File node a path denotes.

use crate::error::{IngestError, IngestResult};
use crate::intent::{attrs, MergeIntent, MergeKey, NodeLabel};
use repograph_store::GraphStore;
use sha2::{Digest, Sha224};
use std::collections::HashMap;

/// Hex sha224 of `project_id/value`.
pub fn scoped_hash(project_id: &str, value: &str) -> String {
    let mut hasher = Sha224::new();
    hasher.update(project_id.as_bytes());
    hasher.update(b"/");
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Canonical repository-relative form of a path.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.trim().replace('\\', "/");
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest.to_string();
    }
    normalized.trim_start_matches('/').to_string()
}

/// Identity attributes of one file in one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    pub path: String,
    pub name: String,
    /// Rename-tolerant hash of the file name
    pub hash: String,
    /// Merge key id, hash of the full path
    pub merge_hash: String,
}

impl FileIdentity {
    pub fn node_intent(&self, project_id: &str) -> MergeIntent {
        MergeIntent::node(
            file_key(project_id, &self.merge_hash),
            attrs([
                ("path", self.path.clone().into()),
                ("name", self.name.clone().into()),
                ("hash", self.hash.clone().into()),
                ("merge_hash", self.merge_hash.clone().into()),
                ("project_id", project_id.into()),
            ]),
        )
    }
}

pub fn path_hashes(project_id: &str, path: &str) -> FileIdentity {
    let path = normalize_path(path);
    let name = path.rsplit('/').next().unwrap_or_default().to_string();
    FileIdentity {
        hash: scoped_hash(project_id, &name),
        merge_hash: scoped_hash(project_id, &path),
        name,
        path,
    }
}

pub fn file_key(project_id: &str, merge_hash: &str) -> MergeKey {
    MergeKey::new(NodeLabel::File, project_id, merge_hash)
}

/// Category identity; a name without a project scope is rejected.
pub fn category_key(project_id: Option<&str>, name: &str) -> IngestResult<MergeKey> {
    match project_id.map(str::trim) {
        Some(project) if !project.is_empty() => {
            Ok(MergeKey::new(NodeLabel::RepoCategory, project, name.trim()))
        }
        _ => Err(IngestError::MissingProjectScope(name.to_string())),
    }
}

pub fn commit_key(project_id: &str, hash: &str) -> MergeKey {
    MergeKey::new(NodeLabel::Commit, project_id, hash)
}

pub fn developer_key(project_id: &str, email: &str) -> MergeKey {
    MergeKey::new(NodeLabel::Developer, project_id, email.trim().to_lowercase())
}

pub fn branch_key(project_id: &str, name: &str) -> MergeKey {
    MergeKey::new(NodeLabel::Branch, project_id, name)
}

/// How an external payload names a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef {
    Path(String),
    Hash(String),
    MergeHash(String),
}

impl std::fmt::Display for FileRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(p) => write!(f, "path {p}"),
            Self::Hash(h) => write!(f, "hash {h}"),
            Self::MergeHash(h) => write!(f, "merge_hash {h}"),
        }
    }
}

/// Snapshot of the File nodes already ingested for a project.
#[derive(Debug, Default, Clone)]
pub struct FileIndex {
    by_merge_hash: HashMap<String, Option<String>>,
    by_hash: HashMap<String, Vec<String>>,
    by_path: HashMap<String, String>,
}

impl FileIndex {
    pub fn load(store: &dyn GraphStore, project_id: &str) -> IngestResult<Self> {
        let mut index = Self::default();
        for node in store.nodes_with_label(NodeLabel::File.as_str(), project_id)? {
            let merge_hash = node
                .property("merge_hash")
                .and_then(|v| v.as_str())
                .unwrap_or(node.key.id.as_str())
                .to_string();
            let path = node
                .property("path")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let hash = node.property("hash").and_then(|v| v.as_str());
            index.insert(merge_hash, hash, path);
        }
        tracing::debug!(
            "Loaded {} File nodes for project {}",
            index.len(),
            project_id
        );
        Ok(index)
    }

    pub fn insert(&mut self, merge_hash: String, hash: Option<&str>, path: Option<String>) {
        if let Some(hash) = hash {
            let entries = self.by_hash.entry(hash.to_string()).or_default();
            if !entries.contains(&merge_hash) {
                entries.push(merge_hash.clone());
            }
        }
        if let Some(path) = &path {
            self.by_path.insert(path.clone(), merge_hash.clone());
        }
        self.by_merge_hash.insert(merge_hash, path);
    }

    pub fn len(&self) -> usize {
        self.by_merge_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_merge_hash.is_empty()
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn contains_merge_hash(&self, merge_hash: &str) -> bool {
        self.by_merge_hash.contains_key(merge_hash)
    }

    /// Merge hashes of files sharing a name hash.
    pub fn merge_hashes_for(&self, hash: &str) -> &[String] {
        self.by_hash.get(hash).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Turns file references into File merge keys for one project.
pub struct IdentityResolver {
    project_id: String,
    index: FileIndex,
}

impl IdentityResolver {
    pub fn new(project_id: impl Into<String>, index: FileIndex) -> Self {
        Self {
            project_id: project_id.into(),
            index,
        }
    }

    /// Every reference must denote an ingested file; a name hash must match
    /// exactly one.
    pub fn resolve_file(&self, reference: &FileRef) -> IngestResult<MergeKey> {
        match reference {
            FileRef::Path(path) => {
                let identity = path_hashes(&self.project_id, path);
                if identity.path.is_empty() || !self.index.contains_path(&identity.path) {
                    return Err(IngestError::unresolved(reference.to_string()));
                }
                Ok(file_key(&self.project_id, &identity.merge_hash))
            }
            FileRef::MergeHash(merge_hash) => {
                if self.index.contains_merge_hash(merge_hash) {
                    Ok(file_key(&self.project_id, merge_hash))
                } else {
                    Err(IngestError::unresolved(reference.to_string()))
                }
            }
            FileRef::Hash(hash) => match self.index.merge_hashes_for(hash) {
                [only] => Ok(file_key(&self.project_id, only)),
                [] => Err(IngestError::unresolved(reference.to_string())),
                many => Err(IngestError::unresolved(format!(
                    "{reference} is ambiguous ({} files)",
                    many.len()
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repograph_store::InMemoryGraphStore;

    #[test]
    fn test_path_hashes_are_project_scoped() {
        let a = path_hashes("a", "src/app.ts");
        let b = path_hashes("b", "src/app.ts");
        assert_eq!(a.path, "src/app.ts");
        assert_eq!(a.name, "app.ts");
        assert_ne!(a.merge_hash, b.merge_hash);
        assert_eq!(a.merge_hash.len(), 56);
        assert_eq!(a.merge_hash, scoped_hash("a", "src/app.ts"));
        assert_eq!(a.hash, scoped_hash("a", "app.ts"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./src/a.ts"), "src/a.ts");
        assert_eq!(normalize_path("src\\lib\\b.php"), "src/lib/b.php");
        assert_eq!(
            path_hashes("p", "./src/a.ts").merge_hash,
            path_hashes("p", "src/a.ts").merge_hash
        );
    }

    #[test]
    fn test_category_key_requires_project() {
        assert!(matches!(
            category_key(None, "Core"),
            Err(IngestError::MissingProjectScope(name)) if name == "Core"
        ));
        assert!(matches!(
            category_key(Some(" "), "Core"),
            Err(IngestError::MissingProjectScope(_))
        ));
        let key = category_key(Some("shop"), "Core").unwrap();
        assert_eq!(key.label, NodeLabel::RepoCategory);
        assert_eq!(key.project_id, "shop");
    }

    #[test]
    fn test_developer_key_lowercases_email() {
        assert_eq!(developer_key("p", " Ada@Example.COM ").id, "ada@example.com");
    }

    fn resolver_with(paths: &[&str]) -> IdentityResolver {
        let mut index = FileIndex::default();
        for path in paths {
            let id = path_hashes("p", path);
            index.insert(id.merge_hash, Some(&id.hash), Some(id.path));
        }
        IdentityResolver::new("p", index)
    }

    #[test]
    fn test_resolve_path_of_ingested_file() {
        let resolver = resolver_with(&["x/y.ts"]);
        let key = resolver
            .resolve_file(&FileRef::Path("./x/y.ts".into()))
            .unwrap();
        assert_eq!(key, file_key("p", &path_hashes("p", "x/y.ts").merge_hash));
    }

    #[test]
    fn test_unknown_path_is_unresolved() {
        let resolver = resolver_with(&["x/y.ts"]);
        for path in ["typo/nowhere.ts", "", "./"] {
            assert!(matches!(
                resolver.resolve_file(&FileRef::Path(path.into())),
                Err(IngestError::UnresolvedFileReference(_))
            ));
        }
    }

    #[test]
    fn test_resolve_hash_and_merge_hash() {
        let resolver = resolver_with(&["src/a.ts", "src/b.ts"]);
        let a = path_hashes("p", "src/a.ts");

        let by_hash = resolver.resolve_file(&FileRef::Hash(a.hash.clone())).unwrap();
        assert_eq!(by_hash.id, a.merge_hash);

        let by_merge = resolver
            .resolve_file(&FileRef::MergeHash(a.merge_hash.clone()))
            .unwrap();
        assert_eq!(by_merge, by_hash);

        assert!(matches!(
            resolver.resolve_file(&FileRef::MergeHash("deadbeef".into())),
            Err(IngestError::UnresolvedFileReference(_))
        ));
    }

    #[test]
    fn test_ambiguous_hash_is_unresolved() {
        let resolver = resolver_with(&["web/index.ts", "api/index.ts"]);
        let hash = path_hashes("p", "web/index.ts").hash;
        assert!(matches!(
            resolver.resolve_file(&FileRef::Hash(hash)),
            Err(IngestError::UnresolvedFileReference(msg)) if msg.contains("ambiguous")
        ));
    }

    #[test]
    fn test_file_index_load_from_store() {
        let store = InMemoryGraphStore::new();
        let identity = path_hashes("p", "src/a.ts");
        let op = identity.node_intent("p").to_write_op().unwrap();
        store.commit(&[op]).unwrap();

        let index = FileIndex::load(&store, "p").unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.contains_path("src/a.ts"));
        assert_eq!(index.merge_hashes_for(&identity.hash), &[identity.merge_hash]);
        assert!(FileIndex::load(&store, "other").unwrap().is_empty());
    }
}
