//! Keyword extraction from file paths and top-level identifiers.
//!
//! Keywords are lowercase tokens: path segments first, then the words of
//! identifiers declared at column zero. Each group is deduplicated in
//! first-seen order before the two are concatenated.

use crate::identity::path_hashes;
use crate::intent::{attrs, MergeIntent};
use crate::language::Language;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Source prefix scanned for declarations.
const SCAN_LIMIT: usize = 64 * 1024;

const JS_DECLS: &[&str] = &[
    r"(?m)^(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?(?:async\s+)?(?:function\*?|class|interface|type|enum|const|let|var)\s+([A-Za-z_$][\w$]*)",
];
const PHP_DECLS: &[&str] = &[
    r"(?m)^(?:(?:abstract|final|readonly)\s+)*(?:class|interface|trait|enum|function)\s+([A-Za-z_]\w*)",
];
const PYTHON_DECLS: &[&str] = &[
    r"(?m)^(?:async\s+)?(?:def|class)\s+([A-Za-z_]\w*)",
    r"(?m)^([A-Z_][A-Za-z0-9_]*)\s*(?::[^=\n]+)?=[^=]",
];
const C_DECLS: &[&str] = &[
    r"(?m)^(?:typedef\s+)?(?:struct|union|enum|class|namespace)\s+([A-Za-z_]\w*)",
    r"(?m)^(?:(?:static|inline|extern|const|unsigned|signed)\s+)*[A-Za-z_][\w:<>]*[ \t\*&]+\**([A-Za-z_]\w*)[ \t]*\([^;\n]*$",
];
const GO_DECLS: &[&str] = &[
    r"(?m)^func\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)",
    r"(?m)^(?:type|var|const)\s+([A-Za-z_]\w*)",
];
const RUBY_DECLS: &[&str] = &[r"(?m)^(?:class|module|def)\s+(?:self\.)?([A-Za-z_]\w*)"];
const RUST_DECLS: &[&str] = &[
    r"(?m)^(?:pub(?:\([^)]*\))?\s+)?(?:(?:async|unsafe|const|extern)\s+)*(?:fn|struct|enum|trait|type|mod|const|static|union)\s+([A-Za-z_]\w*)",
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

static JS_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(JS_DECLS));
static PHP_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(PHP_DECLS));
static PYTHON_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(PYTHON_DECLS));
static C_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(C_DECLS));
static GO_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(GO_DECLS));
static RUBY_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(RUBY_DECLS));
static RUST_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(RUST_DECLS));

fn declaration_patterns(language: Language) -> &'static [Regex] {
    match language {
        Language::JavaScript | Language::TypeScript => JS_RE.as_slice(),
        Language::Php => PHP_RE.as_slice(),
        Language::Python => PYTHON_RE.as_slice(),
        Language::C | Language::Cpp => C_RE.as_slice(),
        Language::Go => GO_RE.as_slice(),
        Language::Ruby => RUBY_RE.as_slice(),
        Language::Rust => RUST_RE.as_slice(),
    }
}

const C_NON_DECLS: &[&str] = &["if", "for", "while", "switch", "return", "sizeof"];

/// Identifiers declared at column zero, in source order, deduplicated.
pub fn top_level_identifiers(language: Language, source: &str) -> Vec<String> {
    let mut end = source.len().min(SCAN_LIMIT);
    while !source.is_char_boundary(end) {
        end -= 1;
    }
    let text = &source[..end];

    let mut found: Vec<(usize, &str)> = declaration_patterns(language)
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| caps.get(1))
        .map(|m| (m.start(), m.as_str()))
        .filter(|(_, name)| !(language.is_c_family() && C_NON_DECLS.contains(name)))
        .collect();
    found.sort_by_key(|(offset, _)| *offset);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|(_, name)| seen.insert(*name))
        .map(|(_, name)| name.to_string())
        .collect()
}

/// Lowercase path segments split on `/ \ . _ -`.
pub fn path_tokens(path: &str) -> Vec<String> {
    path.split(|c: char| matches!(c, '/' | '\\' | '.' | '_' | '-'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Split an identifier on case changes and non-alphanumerics.
///
/// Acronym runs stay together: `HTMLParser` gives `html`, `parser`.
pub fn identifier_tokens(ident: &str) -> Vec<String> {
    let chars: Vec<char> = ident.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();

    for (i, &ch) in chars.iter().enumerate() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                tokens.push(current.to_lowercase());
                current.clear();
            }
            continue;
        }
        if ch.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary {
                tokens.push(current.to_lowercase());
                current.clear();
            }
        }
        current.push(ch);
    }
    if !current.is_empty() {
        tokens.push(current.to_lowercase());
    }
    tokens
}

fn dedup_in_order(tokens: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Path tokens then identifier tokens, each group deduplicated, truncated to `limit`.
pub fn extract_keywords(path: &str, identifiers: &[String], limit: usize) -> Vec<String> {
    let mut keywords = dedup_in_order(path_tokens(path));
    keywords.extend(dedup_in_order(
        identifiers.iter().flat_map(|ident| identifier_tokens(ident)),
    ));
    keywords.truncate(limit);
    keywords
}

/// Attribute update carrying a file's keywords.
pub fn keyword_intent(project_id: &str, path: &str, keywords: Vec<String>) -> MergeIntent {
    let identity = path_hashes(project_id, path);
    MergeIntent::node(
        crate::identity::file_key(project_id, &identity.merge_hash),
        attrs([("keywords", keywords.into())]),
    )
}
