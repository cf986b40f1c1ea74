//! Import specifier resolution against the working tree.
//!
//! A specifier resolves to a repository-relative path only when that path is
//! one of the known working files. Anything else (third-party packages, URLs,
//! system headers) is dropped.

use super::imports::ImportSpec;
use crate::language::Language;
use std::collections::HashSet;

/// Lexically normalize a relative path, folding `.` and `..`.
///
/// Returns `None` when the path climbs above the repository root.
pub fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn join(dir: &str, rel: &str) -> Option<String> {
    if dir.is_empty() {
        normalize(rel)
    } else {
        normalize(&format!("{dir}/{rel}"))
    }
}

fn has_extension(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .is_some_and(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
}

fn is_url(spec: &str) -> bool {
    spec.contains("://") || spec.starts_with("//") || spec.starts_with("data:")
}

fn is_relative(spec: &str) -> bool {
    spec == "." || spec == ".." || spec.starts_with("./") || spec.starts_with("../")
}

/// Resolves specifiers for one pass over a working tree.
pub struct ImportResolver<'a> {
    known: &'a HashSet<String>,
    extensions: &'a [String],
}

impl<'a> ImportResolver<'a> {
    pub fn new(known: &'a HashSet<String>, extensions: &'a [String]) -> Self {
        Self { known, extensions }
    }

    pub fn resolve(&self, importer: &str, language: Language, spec: &ImportSpec) -> Option<String> {
        let dir = parent_dir(importer);
        match spec {
            ImportSpec::Path(raw) => self.resolve_path(dir, language, raw),
            ImportSpec::Namespace(ns) => self.resolve_namespace(ns),
            ImportSpec::Module { level, path } => self.resolve_python(dir, *level, path),
            ImportSpec::LoadPath(raw) => self.resolve_load_path(dir, raw),
            ImportSpec::ChildModule(name) => self.resolve_child_module(importer, name),
            // Package paths name directories, never a single file.
            ImportSpec::Package(_) => None,
        }
    }

    fn resolve_path(&self, dir: &str, language: Language, raw: &str) -> Option<String> {
        let cleaned = raw.trim().trim_matches(|c: char| c == '"' || c == '\'');
        let cleaned = cleaned.split(['?', '#']).next().unwrap_or_default();
        if cleaned.is_empty() || is_url(cleaned) {
            return None;
        }
        let cleaned = cleaned.replace('\\', "/");

        let bases: Vec<String> = if let Some(rooted) = cleaned.strip_prefix('/') {
            normalize(rooted).into_iter().collect()
        } else if is_relative(&cleaned) {
            join(dir, &cleaned).into_iter().collect()
        } else {
            // Bare specifier: importer directory first, then repository root.
            join(dir, &cleaned)
                .into_iter()
                .chain(normalize(&cleaned))
                .collect()
        };

        bases
            .iter()
            .find_map(|base| self.first_known(self.candidates(base, language)))
    }

    fn resolve_namespace(&self, ns: &str) -> Option<String> {
        let path = ns.trim_start_matches('\\').replace('\\', "/");
        let mut candidates = vec![format!("{path}.php"), format!("{path}/index.php")];
        // PSR-4 style roots: App\Models\User -> app/Models/User.php, src/Models/User.php
        if let Some((root, rest)) = path.split_once('/') {
            candidates.push(format!("{}/{rest}.php", root.to_lowercase()));
            candidates.push(format!("src/{rest}.php"));
        }
        self.first_known(candidates)
    }

    fn resolve_python(&self, dir: &str, level: usize, module: &str) -> Option<String> {
        let rel = module
            .split('.')
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("/");

        let bases: Vec<String> = if level > 0 {
            let mut base = dir.to_string();
            for _ in 1..level {
                if base.is_empty() {
                    return None;
                }
                base = parent_dir(&base).to_string();
            }
            vec![base]
        } else {
            vec![String::new(), dir.to_string()]
        };

        bases.iter().find_map(|base| {
            let joined = if rel.is_empty() {
                normalize(base)?
            } else {
                join(base, &rel)?
            };
            let candidates = if joined.is_empty() {
                vec!["__init__.py".to_string()]
            } else if rel.is_empty() {
                vec![format!("{joined}/__init__.py")]
            } else {
                vec![format!("{joined}.py"), format!("{joined}/__init__.py")]
            };
            self.first_known(candidates)
        })
    }

    fn resolve_load_path(&self, dir: &str, raw: &str) -> Option<String> {
        if is_relative(raw) {
            return self.resolve_path(dir, Language::Ruby, raw);
        }
        let rel = normalize(raw)?;
        let file = if has_extension(&rel) {
            rel
        } else {
            format!("{rel}.rb")
        };
        self.first_known([file.clone(), format!("lib/{file}")])
    }

    fn resolve_child_module(&self, importer: &str, name: &str) -> Option<String> {
        let dir = parent_dir(importer);
        let file_name = importer.rsplit('/').next().unwrap_or(importer);
        let module_dir = match file_name {
            "mod.rs" | "lib.rs" | "main.rs" => dir.to_string(),
            other => {
                let stem = other.strip_suffix(".rs").unwrap_or(other);
                join(dir, stem)?
            }
        };
        let base = join(&module_dir, name)?;
        self.first_known([format!("{base}.rs"), format!("{base}/mod.rs")])
    }

    /// As written, then with each extension, then `index` files.
    fn candidates(&self, base: &str, language: Language) -> Vec<String> {
        let mut candidates = vec![base.to_string()];
        if language.is_c_family() {
            return candidates;
        }
        let native: &[&str] = match language {
            Language::Ruby => &[".rb"],
            Language::Python => &[".py"],
            _ => &[],
        };
        let extensions: Vec<&str> = self
            .extensions
            .iter()
            .map(String::as_str)
            .chain(native.iter().copied())
            .collect();
        candidates.extend(extensions.iter().map(|ext| format!("{base}{ext}")));
        candidates.extend(extensions.iter().map(|ext| {
            if base.is_empty() {
                format!("index{ext}")
            } else {
                format!("{base}/index{ext}")
            }
        }));
        candidates
    }

    fn first_known(&self, candidates: impl IntoIterator<Item = String>) -> Option<String> {
        candidates
            .into_iter()
            .find(|candidate| self.known.contains(candidate))
    }
}
