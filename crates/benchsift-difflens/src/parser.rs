use std::fmt;

use benchsift_core::BenchsiftError;

/// One `@@` hunk of a file diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// First line in the old version.
    pub old_start: u32,
    /// Line count in the old version.
    pub old_lines: u32,
    /// First line in the new version.
    pub new_start: u32,
    /// Line count in the new version.
    pub new_lines: u32,
    /// Added lines, without the leading `+`.
    pub added: Vec<String>,
    /// Removed lines, without the leading `-`.
    pub removed: Vec<String>,
}

/// A complete diff for a single file, containing zero or more hunks.
///
/// # Examples
///
/// ```
/// use benchsift_difflens::parser::parse_unified_diff;
///
/// let diff = "diff --git a/hello.rs b/hello.rs\n\
///             --- a/hello.rs\n\
///             +++ b/hello.rs\n\
///             @@ -1,3 +1,4 @@\n\
///              fn main() {\n\
///             +    println!(\"hello\");\n\
///              }\n";
/// let files = parse_unified_diff(diff).unwrap();
/// assert_eq!(files.len(), 1);
/// assert_eq!(files[0].path(), "hello.rs");
/// assert_eq!(files[0].changed_lines(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FileDiff {
    /// Path in the old version (`/dev/null` for new files).
    pub old_path: String,
    /// Path in the new version (`/dev/null` for deleted files).
    pub new_path: String,
    /// Parsed hunks for this file.
    pub hunks: Vec<Hunk>,
    /// Whether this is a newly created file.
    pub is_new_file: bool,
    /// Whether this file was deleted.
    pub is_deleted_file: bool,
    /// Whether this file was renamed.
    pub is_rename: bool,
    /// Whether git reported the file as binary.
    pub is_binary: bool,
}

impl FileDiff {
    /// The path that identifies this file: the old path for deletions, else the new one.
    pub fn path(&self) -> &str {
        if self.is_deleted_file || self.new_path.is_empty() {
            &self.old_path
        } else {
            &self.new_path
        }
    }

    /// Every added line across all hunks.
    pub fn added_lines(&self) -> impl Iterator<Item = &str> {
        self.hunks
            .iter()
            .flat_map(|h| h.added.iter().map(String::as_str))
    }

    /// Added plus removed line count.
    pub fn changed_lines(&self) -> usize {
        self.hunks
            .iter()
            .map(|h| h.added.len() + h.removed.len())
            .sum()
    }
}

impl fmt::Display for FileDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} hunks)", self.path(), self.hunks.len())
    }
}

/// Parse a unified diff string (as produced by `git diff` or a forge API)
/// into structured [`FileDiff`] entries.
///
/// Handles new, deleted, renamed and binary files. Binary files are kept
/// with no hunks so callers still see the path.
///
/// # Errors
///
/// Returns [`BenchsiftError::Parse`] if a hunk header is malformed.
///
/// # Examples
///
/// ```
/// use benchsift_difflens::parser::parse_unified_diff;
///
/// let files = parse_unified_diff("").unwrap();
/// assert!(files.is_empty());
/// ```
pub fn parse_unified_diff(input: &str) -> Result<Vec<FileDiff>, BenchsiftError> {
    let mut files: Vec<FileDiff> = Vec::new();
    let mut current: Option<FileDiff> = None;
    // Lines still owed to the open hunk, (old, new).
    let mut pending = (0u32, 0u32);

    for line in input.lines() {
        if pending != (0, 0) {
            if let Some(hunk) = current.as_mut().and_then(|f| f.hunks.last_mut()) {
                if consume_hunk_line(hunk, line, &mut pending) {
                    continue;
                }
            }
            pending = (0, 0);
        }

        if let Some(rest) = line.strip_prefix("diff --git ") {
            files.extend(current.take());
            current = Some(file_from_git_header(rest));
            continue;
        }

        // Plain patches have no "diff --git" line.
        if line.starts_with("--- ") && current.as_ref().map_or(true, |f| !f.hunks.is_empty()) {
            files.extend(current.take());
            current = Some(FileDiff::default());
        }

        let Some(file) = current.as_mut() else {
            continue;
        };

        if line.starts_with("Binary files ") && line.ends_with(" differ") {
            file.is_binary = true;
            continue;
        }

        if line.starts_with("new file mode") {
            file.is_new_file = true;
            continue;
        }

        if line.starts_with("deleted file mode") {
            file.is_deleted_file = true;
            continue;
        }

        if let Some(path) = line.strip_prefix("rename from ") {
            file.is_rename = true;
            file.old_path = path.to_string();
            continue;
        }

        if let Some(path) = line.strip_prefix("rename to ") {
            file.is_rename = true;
            file.new_path = path.to_string();
            continue;
        }

        if let Some(path) = line.strip_prefix("--- ") {
            file.old_path = parse_path(path);
            if file.old_path == "/dev/null" {
                file.is_new_file = true;
            }
            continue;
        }

        if let Some(path) = line.strip_prefix("+++ ") {
            file.new_path = parse_path(path);
            if file.new_path == "/dev/null" {
                file.is_deleted_file = true;
            }
            continue;
        }

        if line.starts_with("@@ ") {
            let (old_start, old_lines, new_start, new_lines) = parse_hunk_header(line)?;
            file.hunks.push(Hunk {
                old_start,
                old_lines,
                new_start,
                new_lines,
                added: Vec::new(),
                removed: Vec::new(),
            });
            pending = (old_lines, new_lines);
            continue;
        }
    }

    files.extend(current.take());
    Ok(files)
}

/// Feed one body line to `hunk`. Returns `false` when the line cannot belong to it.
fn consume_hunk_line(hunk: &mut Hunk, line: &str, pending: &mut (u32, u32)) -> bool {
    let (old, new) = pending;
    if line.starts_with('\\') {
        return true;
    }
    if let Some(added) = line.strip_prefix('+') {
        if *new == 0 {
            return false;
        }
        hunk.added.push(added.to_string());
        *new -= 1;
    } else if let Some(removed) = line.strip_prefix('-') {
        if *old == 0 {
            return false;
        }
        hunk.removed.push(removed.to_string());
        *old -= 1;
    } else if line.is_empty() || line.starts_with(' ') {
        *old = old.saturating_sub(1);
        *new = new.saturating_sub(1);
    } else {
        return false;
    }
    true
}

fn file_from_git_header(rest: &str) -> FileDiff {
    // `a/<old> b/<new>`; good enough until the ---/+++ lines refine it.
    let (old_path, new_path) = match rest.split_once(" b/") {
        Some((old, new)) => (parse_path(old), new.trim_matches('"').to_string()),
        None => (String::new(), String::new()),
    };
    FileDiff {
        old_path,
        new_path,
        ..FileDiff::default()
    }
}

fn parse_path(raw: &str) -> String {
    // Some tools append a tab and a timestamp.
    let raw = raw.split('\t').next().unwrap_or(raw);
    let normalized = raw.trim_matches('"');

    if normalized == "/dev/null" {
        return normalized.to_string();
    }

    normalized
        .strip_prefix("a/")
        .or_else(|| normalized.strip_prefix("b/"))
        .unwrap_or(normalized)
        .to_string()
}

fn parse_hunk_header(line: &str) -> Result<(u32, u32, u32, u32), BenchsiftError> {
    let inner = line
        .strip_prefix("@@ ")
        .and_then(|s| {
            let end = s.find(" @@")?;
            Some(&s[..end])
        })
        .ok_or_else(|| BenchsiftError::Parse(format!("invalid hunk header: {line}")))?;

    let (old, new) = inner
        .split_once(' ')
        .ok_or_else(|| BenchsiftError::Parse(format!("invalid hunk header: {line}")))?;

    let old = old
        .strip_prefix('-')
        .ok_or_else(|| BenchsiftError::Parse(format!("invalid old range in hunk: {line}")))?;
    let new = new
        .strip_prefix('+')
        .ok_or_else(|| BenchsiftError::Parse(format!("invalid new range in hunk: {line}")))?;

    let (old_start, old_lines) = parse_range(old, line)?;
    let (new_start, new_lines) = parse_range(new, line)?;

    Ok((old_start, old_lines, new_start, new_lines))
}

fn parse_range(range: &str, context: &str) -> Result<(u32, u32), BenchsiftError> {
    let number = |s: &str| {
        s.parse::<u32>()
            .map_err(|_| BenchsiftError::Parse(format!("invalid range number in: {context}")))
    };
    match range.split_once(',') {
        Some((start, count)) => Ok((number(start)?, number(count)?)),
        None => Ok((number(range)?, 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_file_single_hunk() {
        let diff = "\
diff --git a/src/main.rs b/src/main.rs
index abc1234..def5678 100644
--- a/src/main.rs
+++ b/src/main.rs
@@ -1,3 +1,4 @@
 fn main() {
+    println!(\"hello\");
     let x = 1;
 }
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path(), "src/main.rs");
        let hunk = &files[0].hunks[0];
        assert_eq!((hunk.old_start, hunk.old_lines), (1, 3));
        assert_eq!((hunk.new_start, hunk.new_lines), (1, 4));
        assert_eq!(hunk.added, vec!["    println!(\"hello\");"]);
        assert!(hunk.removed.is_empty());
    }

    #[test]
    fn multiple_files_and_hunks() {
        let diff = "\
diff --git a/a.py b/a.py
--- a/a.py
+++ b/a.py
@@ -1 +1,2 @@
 line1
+line2
@@ -10,3 +11,3 @@
-old
+new
diff --git a/b.py b/b.py
--- a/b.py
+++ b/b.py
@@ -1 +1,2 @@
 line1
+line2
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].hunks.len(), 2);
        assert_eq!(files[0].changed_lines(), 3);
        assert_eq!(files[1].path(), "b.py");
    }

    #[test]
    fn new_file() {
        let diff = "\
diff --git a/new.rs b/new.rs
new file mode 100644
--- /dev/null
+++ b/new.rs
@@ -0,0 +1,3 @@
+fn hello() {
+    println!(\"new\");
+}
";
        let files = parse_unified_diff(diff).unwrap();
        assert!(files[0].is_new_file);
        assert_eq!(files[0].old_path, "/dev/null");
        assert_eq!(files[0].path(), "new.rs");
        assert_eq!(files[0].added_lines().count(), 3);
    }

    #[test]
    fn deleted_file_uses_old_path() {
        let diff = "\
diff --git a/old.rs b/old.rs
deleted file mode 100644
--- a/old.rs
+++ /dev/null
@@ -1,2 +0,0 @@
-fn goodbye() {
-}
";
        let files = parse_unified_diff(diff).unwrap();
        assert!(files[0].is_deleted_file);
        assert_eq!(files[0].path(), "old.rs");
        assert_eq!(files[0].changed_lines(), 2);
    }

    #[test]
    fn pure_rename_has_no_hunks() {
        let diff = "\
diff --git a/old_name.rs b/new_name.rs
similarity index 100%
rename from old_name.rs
rename to new_name.rs
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].is_rename);
        assert_eq!(files[0].path(), "new_name.rs");
        assert!(files[0].hunks.is_empty());
    }

    #[test]
    fn binary_files_are_kept_without_hunks() {
        let diff = "\
diff --git a/image.png b/image.png
Binary files a/image.png and b/image.png differ
diff --git a/code.rs b/code.rs
--- a/code.rs
+++ b/code.rs
@@ -1 +1,2 @@
 line1
+line2
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].is_binary);
        assert_eq!(files[0].path(), "image.png");
        assert_eq!(files[1].changed_lines(), 1);
    }

    #[test]
    fn no_newline_marker_is_not_a_change() {
        let diff = "\
diff --git a/f.rs b/f.rs
--- a/f.rs
+++ b/f.rs
@@ -1 +1 @@
-old
\\ No newline at end of file
+new
\\ No newline at end of file
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files[0].changed_lines(), 2);
    }

    #[test]
    fn removed_line_that_looks_like_a_header() {
        let diff = "\
diff --git a/schema.sql b/schema.sql
--- a/schema.sql
+++ b/schema.sql
@@ -1,2 +1,1 @@
--- legacy comment
 CREATE TABLE t (id int);
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].hunks[0].removed, vec!["-- legacy comment"]);
    }

    #[test]
    fn quoted_paths_are_unquoted() {
        assert_eq!(parse_path("\"a/src/my file.rs\""), "src/my file.rs");
        assert_eq!(parse_path("b/src/lib.rs\t2024-01-01"), "src/lib.rs");
    }

    #[test]
    fn malformed_hunk_header_is_a_parse_error() {
        let diff = "\
--- a/x.py
+++ b/x.py
@@ -a,b +1 @@
";
        let err = parse_unified_diff(diff).unwrap_err();
        assert!(matches!(err, BenchsiftError::Parse(_)));
    }
}
