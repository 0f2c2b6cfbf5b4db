use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How to classify a language's files.
///
/// Test patterns are globs matched against both the full path and the file
/// name. Embedded-test markers are only set for languages whose tests may
/// live inside source files (Rust).
///
/// # Examples
///
/// ```
/// use benchsift_core::LanguageProfile;
///
/// let rust = LanguageProfile::builtin("Rust");
/// assert!(rust.embedded_test_markers.iter().any(|m| m == "#[cfg(test)]"));
///
/// let py = LanguageProfile::builtin("Python");
/// assert!(py.embedded_test_markers.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageProfile {
    /// Canonical language name.
    #[serde(default)]
    pub name: String,
    /// Globs identifying test files.
    #[serde(default)]
    pub test_patterns: Vec<String>,
    /// Extensions (with leading dot) of non-code asset files.
    #[serde(default)]
    pub asset_extensions: Vec<String>,
    /// Added-line markers that reveal tests embedded in source files.
    #[serde(default)]
    pub embedded_test_markers: Vec<String>,
}

const COMMON_ASSETS: &[&str] = &[
    ".md", ".rst", ".txt", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".pdf", ".csv",
    ".json", ".yaml", ".yml", ".toml", ".ini", ".cfg", ".lock", ".xml", ".html", ".css",
];

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl LanguageProfile {
    /// Built-in profile for a language name; unknown names get the generic profile.
    ///
    /// `Vue` and `React` repositories are classified as TypeScript.
    pub fn builtin(language: &str) -> Self {
        let canonical = canonical_name(language);
        let (tests, markers): (&[&str], &[&str]) = match canonical {
            "Python" => (
                &[
                    "test_*.py",
                    "*_test.py",
                    "conftest.py",
                    "tests/*",
                    "*/tests/*",
                    "test/*",
                    "*/test/*",
                ],
                &[],
            ),
            "Rust" => (
                &["tests/*", "*/tests/*", "benches/*", "*/benches/*", "*_test.rs", "*_tests.rs"],
                &["#[cfg(test)]", "#[test]", "#[tokio::test]"],
            ),
            "JavaScript" | "TypeScript" => (
                &[
                    "*.test.js",
                    "*.spec.js",
                    "*.test.jsx",
                    "*.test.ts",
                    "*.spec.ts",
                    "*.test.tsx",
                    "*.spec.tsx",
                    "*.test.mjs",
                    "__tests__/*",
                    "*/__tests__/*",
                    "test/*",
                    "*/test/*",
                    "tests/*",
                    "*/tests/*",
                ],
                &[],
            ),
            "Go" => (&["*_test.go", "testdata/*", "*/testdata/*"], &[]),
            "Java" => (
                &["*Test.java", "*Tests.java", "src/test/*", "*/src/test/*"],
                &[],
            ),
            _ => (
                &[
                    "test_*",
                    "*_test.*",
                    "*.test.*",
                    "*.spec.*",
                    "tests/*",
                    "*/tests/*",
                    "test/*",
                    "*/test/*",
                    "__tests__/*",
                    "*/__tests__/*",
                ],
                &[],
            ),
        };

        Self {
            name: canonical.to_string(),
            test_patterns: owned(tests),
            asset_extensions: owned(COMMON_ASSETS),
            embedded_test_markers: owned(markers),
        }
    }

    /// Resolve a profile, letting configured overrides replace built-in fields.
    ///
    /// An override only replaces the lists it sets; empty lists keep the
    /// built-in values.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use benchsift_core::LanguageProfile;
    ///
    /// let mut overrides = HashMap::new();
    /// overrides.insert("Go".to_string(), LanguageProfile {
    ///     name: String::new(),
    ///     test_patterns: vec!["*_integration_test.go".into()],
    ///     asset_extensions: vec![],
    ///     embedded_test_markers: vec![],
    /// });
    /// let go = LanguageProfile::resolve("Go", &overrides);
    /// assert_eq!(go.test_patterns, vec!["*_integration_test.go"]);
    /// assert!(!go.asset_extensions.is_empty());
    /// ```
    pub fn resolve(language: &str, overrides: &HashMap<String, LanguageProfile>) -> Self {
        let mut profile = Self::builtin(language);
        let custom = overrides
            .get(language)
            .or_else(|| overrides.get(&profile.name));
        if let Some(custom) = custom {
            if !custom.test_patterns.is_empty() {
                profile.test_patterns = custom.test_patterns.clone();
            }
            if !custom.asset_extensions.is_empty() {
                profile.asset_extensions = custom.asset_extensions.clone();
            }
            if !custom.embedded_test_markers.is_empty() {
                profile.embedded_test_markers = custom.embedded_test_markers.clone();
            }
        }
        profile
    }

    /// Whether this language can hide tests inside source files.
    pub fn detects_embedded_tests(&self) -> bool {
        !self.embedded_test_markers.is_empty()
    }
}

/// Map a forge-reported language name onto a built-in profile name.
///
/// # Examples
///
/// ```
/// use benchsift_core::language::canonical_name;
///
/// assert_eq!(canonical_name("python"), "Python");
/// assert_eq!(canonical_name("Vue"), "TypeScript");
/// assert_eq!(canonical_name("COBOL"), "Unknown");
/// ```
pub fn canonical_name(language: &str) -> &'static str {
    match language.trim().to_ascii_lowercase().as_str() {
        "python" => "Python",
        "rust" => "Rust",
        "javascript" | "js" => "JavaScript",
        "typescript" | "ts" | "vue" | "react" => "TypeScript",
        "go" | "golang" => "Go",
        "java" => "Java",
        _ => "Unknown",
    }
}
