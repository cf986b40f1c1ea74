//! Lexical import extraction.
//!
//! Regex heuristics per language family. Specifiers are returned as written;
//! turning them into repository paths is the resolver's job.

use crate::language::Language;
use regex::Regex;
use std::sync::LazyLock;

/// An import as it appears in source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportSpec {
    /// File path, relative or root-anchored
    Path(String),
    /// PHP `use` namespace
    Namespace(String),
    /// Python module; `level` is the number of leading dots
    Module { level: usize, path: String },
    /// Ruby `require`, searched on the load path
    LoadPath(String),
    /// Rust `mod name;`
    ChildModule(String),
    /// Go package import path
    Package(String),
}

impl ImportSpec {
    pub fn specifier(&self) -> String {
        match self {
            Self::Path(s)
            | Self::Namespace(s)
            | Self::LoadPath(s)
            | Self::ChildModule(s)
            | Self::Package(s) => s.clone(),
            Self::Module { level, path } => format!("{}{}", ".".repeat(*level), path),
        }
    }
}

fn regex(pattern: &str) -> Option<Regex> {
    Regex::new(pattern).ok()
}

static JS_IMPORTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"\bimport\s+(?:type\s+)?[^'"();]*?\bfrom\s*['"]([^'"]+)['"]"#,
        r#"\bimport\s*['"]([^'"]+)['"]"#,
        r#"\bexport\s+[^'"();]*?\bfrom\s*['"]([^'"]+)['"]"#,
        r#"\brequire\s*\(\s*['"]([^'"]+)['"]\s*\)"#,
        r#"\bimport\s*\(\s*['"]([^'"]+)['"]\s*\)"#,
    ]
    .into_iter()
    .filter_map(regex)
    .collect()
});

static PHP_INCLUDE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    regex(
        r#"\b(?:require_once|require|include_once|include)\b\s*\(?\s*(__DIR__\s*\.\s*)?['"]([^'"]+)['"]"#,
    )
});
static PHP_USE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    regex(r"(?m)^\s*use\s+(?:function\s+|const\s+)?\\?([A-Za-z_][\w\\]*)(?:\s+as\s+\w+)?\s*;")
});

static PY_FROM: LazyLock<Option<Regex>> =
    LazyLock::new(|| regex(r"(?m)^[ \t]*from[ \t]+(\.*)([\w.]*)[ \t]+import[ \t]+(.+)$"));
static PY_IMPORT: LazyLock<Option<Regex>> =
    LazyLock::new(|| regex(r"(?m)^[ \t]*import[ \t]+([\w.]+(?:[ \t]+as[ \t]+\w+)?(?:[ \t]*,[ \t]*[\w.]+(?:[ \t]+as[ \t]+\w+)?)*)"));

static C_INCLUDE: LazyLock<Option<Regex>> =
    LazyLock::new(|| regex(r#"(?m)^[ \t]*#[ \t]*include[ \t]*"([^"]+)""#));

static GO_SINGLE: LazyLock<Option<Regex>> =
    LazyLock::new(|| regex(r#"(?m)^[ \t]*import[ \t]+(?:[\w.]+[ \t]+)?"([^"]+)""#));
static GO_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| regex(r"(?ms)^[ \t]*import[ \t]*\((.*?)\)"));
static GO_BLOCK_ENTRY: LazyLock<Option<Regex>> =
    LazyLock::new(|| regex(r#"(?m)^[ \t]*(?:[\w.]+[ \t]+)?"([^"]+)""#));

static RUBY_RELATIVE: LazyLock<Option<Regex>> =
    LazyLock::new(|| regex(r#"\brequire_relative\s*\(?\s*['"]([^'"]+)['"]"#));
static RUBY_REQUIRE: LazyLock<Option<Regex>> =
    LazyLock::new(|| regex(r#"\brequire\s*\(?\s*['"]([^'"]+)['"]"#));

static RUST_MOD: LazyLock<Option<Regex>> = LazyLock::new(|| {
    regex(r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?[ \t]+)?mod[ \t]+([A-Za-z_]\w*)[ \t]*;")
});

/// Extract import specifiers in source order, without duplicates.
pub fn extract_imports(language: Language, source: &str) -> Vec<ImportSpec> {
    let mut found: Vec<(usize, ImportSpec)> = match language {
        Language::JavaScript | Language::TypeScript => js_imports(source),
        Language::Php => php_imports(source),
        Language::Python => python_imports(source),
        Language::C | Language::Cpp => captures(&C_INCLUDE, source, ImportSpec::Path),
        Language::Go => go_imports(source),
        Language::Ruby => {
            let mut specs = captures(&RUBY_RELATIVE, source, ImportSpec::Path);
            specs.extend(captures(&RUBY_REQUIRE, source, ImportSpec::LoadPath));
            specs
        }
        Language::Rust => captures(&RUST_MOD, source, ImportSpec::ChildModule),
    };
    found.sort_by_key(|(offset, _)| *offset);

    let mut specs: Vec<ImportSpec> = Vec::with_capacity(found.len());
    for (_, spec) in found {
        if !specs.contains(&spec) {
            specs.push(spec);
        }
    }
    specs
}

fn captures(
    re: &Option<Regex>,
    source: &str,
    build: impl Fn(String) -> ImportSpec,
) -> Vec<(usize, ImportSpec)> {
    let Some(re) = re else {
        return Vec::new();
    };
    re.captures_iter(source)
        .filter_map(|caps| caps.get(1))
        .map(|m| (m.start(), build(m.as_str().trim().to_string())))
        .collect()
}

fn js_imports(source: &str) -> Vec<(usize, ImportSpec)> {
    JS_IMPORTS
        .iter()
        .flat_map(|re| re.captures_iter(source))
        .filter_map(|caps| caps.get(1))
        .map(|m| (m.start(), ImportSpec::Path(m.as_str().to_string())))
        .collect()
}

fn php_imports(source: &str) -> Vec<(usize, ImportSpec)> {
    let mut specs = Vec::new();
    if let Some(re) = PHP_INCLUDE.as_ref() {
        for caps in re.captures_iter(source) {
            let Some(target) = caps.get(2) else { continue };
            let path = if caps.get(1).is_some() {
                // __DIR__ . '/x.php' is relative to the including file
                format!("./{}", target.as_str().trim_start_matches('/'))
            } else {
                target.as_str().to_string()
            };
            specs.push((target.start(), ImportSpec::Path(path)));
        }
    }
    specs.extend(captures(&PHP_USE, source, ImportSpec::Namespace));
    specs
}

fn python_imports(source: &str) -> Vec<(usize, ImportSpec)> {
    let mut specs = Vec::new();
    if let Some(re) = PY_FROM.as_ref() {
        for caps in re.captures_iter(source) {
            let (Some(dots), Some(module)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let level = dots.as_str().len();
            if !module.as_str().is_empty() {
                specs.push((
                    dots.start(),
                    ImportSpec::Module {
                        level,
                        path: module.as_str().to_string(),
                    },
                ));
            } else if let Some(names) = caps.get(3) {
                // `from . import a, b` names sibling modules
                for name in import_names(names.as_str()) {
                    specs.push((names.start(), ImportSpec::Module { level, path: name }));
                }
            }
        }
    }
    if let Some(re) = PY_IMPORT.as_ref() {
        for caps in re.captures_iter(source) {
            let Some(list) = caps.get(1) else { continue };
            for name in import_names(list.as_str()) {
                specs.push((list.start(), ImportSpec::Module { level: 0, path: name }));
            }
        }
    }
    specs
}

/// Names from `a as b, c` or `(a, b)` import lists.
fn import_names(list: &str) -> Vec<String> {
    list.split('#')
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| c == '(' || c == ')' || c.is_whitespace())
        .split(',')
        .filter_map(|item| item.split_whitespace().next())
        .map(|name| name.trim_matches(|c: char| c == '(' || c == ')').to_string())
        .filter(|name| !name.is_empty() && name != "*")
        .collect()
}

fn go_imports(source: &str) -> Vec<(usize, ImportSpec)> {
    let mut specs = captures(&GO_SINGLE, source, ImportSpec::Package);
    if let (Some(block), Some(entry)) = (GO_BLOCK.as_ref(), GO_BLOCK_ENTRY.as_ref()) {
        for caps in block.captures_iter(source) {
            let Some(body) = caps.get(1) else { continue };
            for entry_caps in entry.captures_iter(body.as_str()) {
                if let Some(path) = entry_caps.get(1) {
                    specs.push((
                        body.start() + path.start(),
                        ImportSpec::Package(path.as_str().to_string()),
                    ));
                }
            }
        }
    }
    specs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> Vec<ImportSpec> {
        items.iter().map(|s| ImportSpec::Path(s.to_string())).collect()
    }

    #[test]
    fn test_js_imports() {
        let source = r#"
import React from "react";
import { a,
  b } from './utils';
import type { Props } from "../types";
import './styles.css';
export { helper } from "./helper";
export * from './all';
const fs = require('fs');
const lazy = () => import("./lazy");
import React2 from "react";
"#;
        assert_eq!(
            extract_imports(Language::TypeScript, source),
            paths(&[
                "react",
                "./utils",
                "../types",
                "./styles.css",
                "./helper",
                "./all",
                "fs",
                "./lazy",
            ])
        );
    }

    #[test]
    fn test_php_imports() {
        let source = r#"<?php
namespace App\Http;

use App\Models\User;
use Illuminate\Support\Facades\DB as Database;
require_once 'config/app.php';
include __DIR__ . '/partials/header.php';
require("lib/helpers.php");
"#;
        assert_eq!(
            extract_imports(Language::Php, source),
            vec![
                ImportSpec::Namespace("App\\Models\\User".into()),
                ImportSpec::Namespace("Illuminate\\Support\\Facades\\DB".into()),
                ImportSpec::Path("config/app.php".into()),
                ImportSpec::Path("./partials/header.php".into()),
                ImportSpec::Path("lib/helpers.php".into()),
            ]
        );
    }

    #[test]
    fn test_python_imports() {
        let source = "import os, sys as system\nimport pkg.mod\nfrom .sibling import thing\nfrom ..parent.mod import x\nfrom . import a, b\nfrom app.models import (User,\n    Group)\n";
        let module = |level: usize, path: &str| ImportSpec::Module {
            level,
            path: path.to_string(),
        };
        assert_eq!(
            extract_imports(Language::Python, source),
            vec![
                module(0, "os"),
                module(0, "sys"),
                module(0, "pkg.mod"),
                module(1, "sibling"),
                module(2, "parent.mod"),
                module(1, "a"),
                module(1, "b"),
                module(0, "app.models"),
            ]
        );
    }

    #[test]
    fn test_c_includes_skip_system_headers() {
        let source = "#include <stdio.h>\n#include \"util.h\"\n  #  include \"../common/defs.h\"\n";
        assert_eq!(
            extract_imports(Language::C, source),
            paths(&["util.h", "../common/defs.h"])
        );
    }

    #[test]
    fn test_go_imports() {
        let source = "package main\n\nimport \"fmt\"\n\nimport (\n\t\"os\"\n\tlog \"github.com/acme/app/internal/log\"\n)\n";
        assert_eq!(
            extract_imports(Language::Go, source),
            vec![
                ImportSpec::Package("fmt".into()),
                ImportSpec::Package("os".into()),
                ImportSpec::Package("github.com/acme/app/internal/log".into()),
            ]
        );
    }

    #[test]
    fn test_ruby_requires() {
        let source = "require 'json'\nrequire_relative '../lib/parser'\nrequire \"app/models/user\"\n";
        assert_eq!(
            extract_imports(Language::Ruby, source),
            vec![
                ImportSpec::LoadPath("json".into()),
                ImportSpec::Path("../lib/parser".into()),
                ImportSpec::LoadPath("app/models/user".into()),
            ]
        );
    }

    #[test]
    fn test_rust_child_modules() {
        let source = "mod config;\npub mod engine;\npub(crate) mod staging;\nmod tests {\n}\n";
        assert_eq!(
            extract_imports(Language::Rust, source),
            vec![
                ImportSpec::ChildModule("config".into()),
                ImportSpec::ChildModule("engine".into()),
                ImportSpec::ChildModule("staging".into()),
            ]
        );
    }

    #[test]
    fn test_specifier() {
        let spec = ImportSpec::Module {
            level: 2,
            path: "pkg.mod".into(),
        };
        assert_eq!(spec.specifier(), "..pkg.mod");
    }
}
