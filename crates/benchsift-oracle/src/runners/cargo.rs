use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use benchsift_core::{BenchsiftError, Checkout, TestId, TestOutcome, TestStatus};

use crate::exec::{probe_command, run_process};
use crate::runner::{RunReport, TestRunner};

/// `cargo test`, one invocation per integration-test target.
#[derive(Debug, Clone, Default)]
pub struct CargoRunner;

/// An integration-test target: `<crate>/tests/<name>.rs`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TestTarget {
    file: String,
    crate_dir: String,
    name: String,
}

impl TestTarget {
    fn from_path(path: &str) -> Option<Self> {
        let path = path.trim_start_matches("./");
        let (dir, file) = path.rsplit_once('/')?;
        let name = file.strip_suffix(".rs")?;
        let crate_dir = match dir.rsplit_once('/') {
            Some((crate_dir, "tests")) => crate_dir,
            None if dir == "tests" => "",
            _ => return None,
        };
        Some(Self {
            file: path.to_string(),
            crate_dir: crate_dir.to_string(),
            name: name.to_string(),
        })
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec!["test".to_string(), "--no-fail-fast".to_string()];
        if !self.crate_dir.is_empty() {
            args.push("--manifest-path".into());
            args.push(format!("{}/Cargo.toml", self.crate_dir));
        }
        args.push("--test".into());
        args.push(self.name.clone());
        args
    }
}

#[async_trait]
impl TestRunner for CargoRunner {
    fn name(&self) -> &'static str {
        "cargo"
    }

    fn language(&self) -> &'static str {
        "Rust"
    }

    fn markers(&self) -> &'static [&'static str] {
        &["Cargo.toml"]
    }

    async fn probe(&self, dir: &Path) -> Result<(), BenchsiftError> {
        probe_command("cargo", &["--version"], dir).await
    }

    async fn run(
        &self,
        dir: &Path,
        targets: &[String],
        checkout: Checkout,
        timeout: Duration,
    ) -> Result<RunReport, BenchsiftError> {
        if targets.is_empty() {
            let args = vec!["test".to_string(), "--no-fail-fast".to_string()];
            let output = run_process("cargo", &args, dir, timeout).await?;
            let report = match parse_libtest("cargo", &output.stdout) {
                Some(outcomes) => RunReport::from_outcomes(outcomes, BTreeSet::new()),
                None => RunReport::crashed(output.tail(20)),
            };
            return Ok(report.at(checkout));
        }

        let targets: Vec<TestTarget> = targets
            .iter()
            .filter_map(|t| TestTarget::from_path(t))
            .collect();
        if targets.is_empty() {
            return Ok(RunReport::empty());
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let mut results = Vec::with_capacity(targets.len());
        for target in &targets {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let output = run_process("cargo", &target.args(), dir, remaining).await?;
            let parsed = parse_libtest(&target.file, &output.stdout);
            if parsed.is_none() {
                tracing::debug!(target = %target.file, tail = %output.tail(5), "test target failed to build");
            }
            results.push((target.file.clone(), parsed));
        }
        Ok(merge_targets(results).at(checkout))
    }
}

/// Combine per-target results. A target that never ran is a collection
/// error for its file, however many other targets there are.
fn merge_targets(results: Vec<(String, Option<Vec<TestOutcome>>)>) -> RunReport {
    let mut outcomes = Vec::new();
    let mut broken = BTreeSet::new();
    for (file, parsed) in results {
        match parsed {
            Some(found) => outcomes.extend(found),
            None => {
                broken.insert(file);
            }
        }
    }
    RunReport::from_outcomes(outcomes, broken)
}

/// Parse libtest's `test <name> ... <result>` lines.
///
/// Returns `None` when no `test result:` line appears, i.e. the target never ran.
fn parse_libtest(file: &str, stdout: &str) -> Option<Vec<TestOutcome>> {
    let mut ran = false;
    let mut outcomes = Vec::new();
    for line in stdout.lines() {
        if line.starts_with("test result:") {
            ran = true;
            continue;
        }
        let Some((name, result)) = line
            .strip_prefix("test ")
            .and_then(|rest| rest.rsplit_once(" ... "))
        else {
            continue;
        };
        let status = match result.split_whitespace().next() {
            Some("ok") => TestStatus::Pass,
            Some("FAILED") => TestStatus::Fail,
            Some("ignored") => TestStatus::Skip,
            _ => continue,
        };
        outcomes.push(TestOutcome {
            id: TestId::new(file, name),
            status,
            checkout: Checkout::Head,
        });
    }
    ran.then_some(outcomes)
}
