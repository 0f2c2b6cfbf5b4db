//! Sorting changed paths into test, asset and data buckets.

use std::path::Path;

use benchsift_core::{ChangedFile, LanguageProfile};
use serde::Serialize;

/// Classifies file paths according to a [`LanguageProfile`].
///
/// Test patterns are globs matched against both the full path and the bare
/// file name, so `test_*.py` catches `pkg/test_io.py` and `tests/*` catches
/// anything below a top-level `tests/` directory.
///
/// # Examples
///
/// ```
/// use benchsift_core::LanguageProfile;
/// use benchsift_difflens::classify::FileClassifier;
///
/// let classifier = FileClassifier::new(&LanguageProfile::builtin("Python"), &[]);
/// assert!(classifier.is_test("pkg/tests/test_io.py"));
/// assert!(!classifier.is_test("pkg/io.py"));
/// assert!(classifier.is_asset("docs/index.md"));
/// ```
pub struct FileClassifier {
    test_patterns: Vec<glob::Pattern>,
    asset_extensions: Vec<String>,
    data_extensions: Vec<String>,
}

impl FileClassifier {
    /// Compile a classifier from a profile and the data-file extension list.
    ///
    /// Invalid glob patterns are ignored.
    pub fn new(profile: &LanguageProfile, data_extensions: &[String]) -> Self {
        let test_patterns = profile
            .test_patterns
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();

        Self {
            test_patterns,
            asset_extensions: lowercase(&profile.asset_extensions),
            data_extensions: lowercase(data_extensions),
        }
    }

    /// Whether `path` is a test file.
    pub fn is_test(&self, path: &str) -> bool {
        let file_name = Path::new(path)
            .file_name()
            .map(|f| f.to_string_lossy())
            .unwrap_or_default();
        self.test_patterns
            .iter()
            .any(|p| p.matches(path) || p.matches(&file_name))
    }

    /// Whether `path` is a non-code asset for this language.
    pub fn is_asset(&self, path: &str) -> bool {
        extension_in(path, &self.asset_extensions)
    }

    /// Whether `path` is a data file that does not count as a code change.
    pub fn is_data(&self, path: &str) -> bool {
        extension_in(path, &self.data_extensions)
    }

    /// Whether `path` is source code: neither a test nor an asset.
    pub fn is_source(&self, path: &str) -> bool {
        !self.is_test(path) && !self.is_asset(path)
    }

    /// Count a candidate's files by bucket.
    ///
    /// # Examples
    ///
    /// ```
    /// use benchsift_core::{ChangeKind, ChangedFile, LanguageProfile};
    /// use benchsift_difflens::classify::FileClassifier;
    ///
    /// let file = |path: &str| ChangedFile {
    ///     path: path.into(),
    ///     change: ChangeKind::Modified,
    ///     additions: 1,
    ///     deletions: 0,
    /// };
    /// let classifier = FileClassifier::new(&LanguageProfile::builtin("Python"), &[".md".into()]);
    /// let shape = classifier.shape(&[file("tests/test_a.py"), file("a.py"), file("README.md")]);
    /// assert_eq!((shape.test_files, shape.source_files, shape.code_files), (1, 1, 2));
    /// ```
    pub fn shape(&self, files: &[ChangedFile]) -> FileShape {
        let mut shape = FileShape::default();
        for file in files {
            let path = file.path.as_str();
            if !self.is_asset(path) {
                if self.is_test(path) {
                    shape.test_files += 1;
                } else {
                    shape.source_files += 1;
                }
            }
            if !self.is_data(path) {
                shape.code_files += 1;
            }
        }
        shape
    }
}

/// File counts used by the file-shape filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileShape {
    /// Test files, excluding assets.
    pub test_files: usize,
    /// Non-test files, excluding assets.
    pub source_files: usize,
    /// Files that are not data files.
    pub code_files: usize,
}

impl FileShape {
    /// Test plus non-test files.
    pub fn total(&self) -> usize {
        self.test_files + self.source_files
    }
}

fn lowercase(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_ascii_lowercase()).collect()
}

fn extension_in(path: &str, extensions: &[String]) -> bool {
    let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let dotted = format!(".{}", ext.to_ascii_lowercase());
    extensions.iter().any(|e| *e == dotted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchsift_core::ChangeKind;

    fn file(path: &str) -> ChangedFile {
        ChangedFile {
            path: path.into(),
            change: ChangeKind::Modified,
            additions: 3,
            deletions: 1,
        }
    }

    #[test]
    fn rust_integration_tests_are_tests() {
        let c = FileClassifier::new(&LanguageProfile::builtin("Rust"), &[]);
        assert!(c.is_test("tests/cli.rs"));
        assert!(c.is_test("crates/core/tests/api.rs"));
        assert!(!c.is_test("src/lib.rs"));
        assert!(c.is_source("src/lib.rs"));
    }

    #[test]
    fn go_test_suffix() {
        let c = FileClassifier::new(&LanguageProfile::builtin("Go"), &[]);
        assert!(c.is_test("pkg/server/handler_test.go"));
        assert!(!c.is_test("pkg/server/handler.go"));
    }

    #[test]
    fn extensions_are_case_insensitive() {
        let c = FileClassifier::new(&LanguageProfile::builtin("Python"), &[".png".into()]);
        assert!(c.is_asset("docs/Logo.PNG"));
        assert!(c.is_data("docs/Logo.PNG"));
        assert!(!c.is_asset("Makefile"));
    }

    #[test]
    fn shape_excludes_assets_from_test_and_source() {
        let c = FileClassifier::new(&LanguageProfile::builtin("Python"), &[".json".into()]);
        let shape = c.shape(&[
            file("tests/test_api.py"),
            file("tests/fixtures/data.json"),
            file("api.py"),
            file("setup.cfg"),
        ]);
        assert_eq!(shape.test_files, 1);
        assert_eq!(shape.source_files, 1);
        assert_eq!(shape.total(), 2);
        assert_eq!(shape.code_files, 3);
    }

    #[test]
    fn invalid_pattern_is_ignored() {
        let mut profile = LanguageProfile::builtin("Python");
        profile.test_patterns = vec!["[".into(), "check_*.py".into()];
        let c = FileClassifier::new(&profile, &[]);
        assert!(c.is_test("check_io.py"));
        assert!(!c.is_test("test_io.py"));
    }
}
