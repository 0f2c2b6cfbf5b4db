//! How much source code a patch touches, and whether it hides tests in source files.

use benchsift_core::LanguageProfile;
use serde::Serialize;

use crate::classify::FileClassifier;
use crate::parser::FileDiff;

/// Line counts for a parsed patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchVolume {
    /// Added plus removed lines in source (non-test, non-asset) files.
    pub source_lines: usize,
    /// Added plus removed lines in test files.
    pub test_lines: usize,
    /// Source files whose added lines carry an embedded-test marker.
    pub embedded_test_files: Vec<String>,
}

impl PatchVolume {
    /// Whether any source file gained embedded tests.
    pub fn has_embedded_tests(&self) -> bool {
        !self.embedded_test_files.is_empty()
    }
}

/// Measure a parsed patch.
///
/// Embedded tests are only looked for when the profile defines markers.
///
/// # Examples
///
/// ```
/// use benchsift_core::LanguageProfile;
/// use benchsift_difflens::classify::FileClassifier;
/// use benchsift_difflens::parser::parse_unified_diff;
/// use benchsift_difflens::volume::measure;
///
/// let diff = "diff --git a/src/lib.rs b/src/lib.rs\n\
///             --- a/src/lib.rs\n\
///             +++ b/src/lib.rs\n\
///             @@ -1,1 +1,4 @@\n\
///              pub fn one() -> u8 { 1 }\n\
///             +#[cfg(test)]\n\
///             +mod tests {\n\
///             +}\n";
/// let profile = LanguageProfile::builtin("Rust");
/// let classifier = FileClassifier::new(&profile, &[]);
/// let volume = measure(&parse_unified_diff(diff).unwrap(), &classifier, &profile);
/// assert_eq!(volume.source_lines, 3);
/// assert_eq!(volume.embedded_test_files, vec!["src/lib.rs"]);
/// ```
pub fn measure(
    files: &[FileDiff],
    classifier: &FileClassifier,
    profile: &LanguageProfile,
) -> PatchVolume {
    let mut volume = PatchVolume::default();
    for file in files {
        let path = file.path();
        if classifier.is_asset(path) {
            continue;
        }
        if classifier.is_test(path) {
            volume.test_lines += file.changed_lines();
            continue;
        }
        volume.source_lines += file.changed_lines();

        if profile.detects_embedded_tests() && has_marker(file, &profile.embedded_test_markers) {
            volume.embedded_test_files.push(path.to_string());
        }
    }
    volume
}

fn has_marker(file: &FileDiff, markers: &[String]) -> bool {
    file.added_lines()
        .any(|line| markers.iter().any(|m| line.trim_start().starts_with(m.as_str())))
}
