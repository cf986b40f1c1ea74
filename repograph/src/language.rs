//! Language detection by file extension.

use std::path::Path;

/// Language families understood by the static extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    JavaScript,
    TypeScript,
    Php,
    Python,
    C,
    Cpp,
    Go,
    Ruby,
    Rust,
}

impl Language {
    /// Get the language for a file path.
    ///
    /// Note: `.h` files return `C` by convention (C-compatible headers).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let language = match ext.as_str() {
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "php" => Self::Php,
            "py" => Self::Python,
            "c" | "h" => Self::C,
            "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => Self::Cpp,
            "go" => Self::Go,
            "rb" => Self::Ruby,
            "rs" => Self::Rust,
            _ => return None,
        };
        Some(language)
    }

    pub fn is_c_family(&self) -> bool {
        matches!(self, Self::C | Self::Cpp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_language_for_path() {
        let cases = [
            ("app.js", Language::JavaScript),
            ("view.jsx", Language::JavaScript),
            ("loader.mjs", Language::JavaScript),
            ("index.tsx", Language::TypeScript),
            ("index.ts", Language::TypeScript),
            ("Controller.php", Language::Php),
            ("setup.py", Language::Python),
            ("main.c", Language::C),
            ("util.h", Language::C),
            ("engine.cpp", Language::Cpp),
            ("engine.hh", Language::Cpp),
            ("server.go", Language::Go),
            ("Rakefile.rb", Language::Ruby),
            ("lib.rs", Language::Rust),
        ];
        for (path, expected) in cases {
            assert_eq!(
                Language::from_path(&PathBuf::from(path)),
                Some(expected),
                "{path}"
            );
        }
    }

    #[test]
    fn test_language_for_path_case_insensitive_extension() {
        assert_eq!(
            Language::from_path(&PathBuf::from("LEGACY.PHP")),
            Some(Language::Php)
        );
    }

    #[test]
    fn test_language_for_path_unknown() {
        assert_eq!(Language::from_path(&PathBuf::from("README.md")), None);
        assert_eq!(Language::from_path(&PathBuf::from("Makefile")), None);
    }

    #[test]
    fn test_families() {
        assert!(Language::Cpp.is_c_family());
        assert!(Language::C.is_c_family());
        assert!(!Language::TypeScript.is_c_family());
    }
}
