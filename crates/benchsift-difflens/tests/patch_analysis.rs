use benchsift_core::LanguageProfile;
use benchsift_difflens::classify::FileClassifier;
use benchsift_difflens::parser::parse_unified_diff;
use benchsift_difflens::volume::measure;

#[test]
fn parse_patch_without_git_header() {
    let diff = "\
--- /dev/null
+++ b/src/bad_code.rs
@@ -0,0 +1,3 @@
+fn main() {
+    println!(\"hello\");
+}
";
    let files = parse_unified_diff(diff).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path(), "src/bad_code.rs");
    assert!(files[0].is_new_file);
}

#[test]
fn real_world_fixture() {
    let diff = include_str!("fixtures/python_fix.diff");
    let files = parse_unified_diff(diff).unwrap();
    assert_eq!(files.len(), 3);
    assert!(files[1].is_new_file);
    assert!(files[2].is_binary);

    let profile = LanguageProfile::builtin("Python");
    let classifier = FileClassifier::new(&profile, &[]);
    let volume = measure(&files, &classifier, &profile);
    assert_eq!(volume.source_lines, 4);
    assert_eq!(volume.test_lines, 8);
    assert!(!volume.has_embedded_tests());
}
