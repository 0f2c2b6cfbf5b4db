use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use benchsift_core::{BenchsiftError, Checkout, TestId, TestOutcome, TestStatus};

use crate::exec::{probe_command, run_process, ProcessOutput};
use crate::runner::{RunReport, TestRunner};

/// pytest, driven through `python -m pytest` with the `-rA` summary.
#[derive(Debug, Clone)]
pub struct PytestRunner {
    python: String,
}

impl Default for PytestRunner {
    fn default() -> Self {
        Self {
            python: "python3".into(),
        }
    }
}

impl PytestRunner {
    /// Use a specific interpreter, e.g. a virtualenv's `bin/python`.
    pub fn with_python(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

#[async_trait]
impl TestRunner for PytestRunner {
    fn name(&self) -> &'static str {
        "pytest"
    }

    fn language(&self) -> &'static str {
        "Python"
    }

    fn markers(&self) -> &'static [&'static str] {
        &[
            "pytest.ini",
            "conftest.py",
            "pyproject.toml",
            "setup.cfg",
            "tox.ini",
            "setup.py",
        ]
    }

    async fn probe(&self, dir: &Path) -> Result<(), BenchsiftError> {
        probe_command(&self.python, &["-m", "pytest", "--version"], dir).await
    }

    async fn run(
        &self,
        dir: &Path,
        targets: &[String],
        checkout: Checkout,
        timeout: Duration,
    ) -> Result<RunReport, BenchsiftError> {
        let mut args: Vec<String> = [
            "-m",
            "pytest",
            "-rA",
            "--tb=no",
            "-q",
            "-p",
            "no:cacheprovider",
            "--continue-on-collection-errors",
        ]
        .iter()
        .map(|a| (*a).to_string())
        .collect();
        args.extend(targets.iter().cloned());

        let output = run_process(&self.python, &args, dir, timeout).await?;
        Ok(report_from_exit(&output).at(checkout))
    }
}

fn report_from_exit(output: &ProcessOutput) -> RunReport {
    match output.code {
        // 5: no tests collected.
        Some(5) => RunReport::empty(),
        Some(0..=2) => {
            let report = parse_summary(&output.stdout);
            if output.code == Some(2)
                && report.outcomes.is_empty()
                && report.collection_errors.is_empty()
            {
                RunReport::crashed(output.tail(20))
            } else {
                report
            }
        }
        _ => RunReport::crashed(output.tail(20)),
    }
}

/// Parse the `-rA` short test summary.
///
/// `ERROR path.py` without a `::` node part is a collection error for the
/// whole file.
pub(crate) fn parse_summary(stdout: &str) -> RunReport {
    let mut outcomes = Vec::new();
    let mut collection_errors = BTreeSet::new();
    for line in stdout.lines() {
        let Some((word, rest)) = line.split_once(' ') else {
            continue;
        };
        let status = match word {
            "PASSED" => TestStatus::Pass,
            "FAILED" => TestStatus::Fail,
            "ERROR" => TestStatus::Error,
            "SKIPPED" | "XFAIL" | "XPASS" => TestStatus::Skip,
            _ => continue,
        };
        let Some(node) = rest.split_whitespace().next() else {
            continue;
        };
        match node.split_once("::") {
            Some((file, name)) => outcomes.push(TestOutcome {
                id: TestId::new(file, name),
                status,
                checkout: Checkout::Head,
            }),
            None if status == TestStatus::Error => {
                collection_errors.insert(node.to_string());
            }
            // `SKIPPED [1] file:line: reason` has no node id.
            None => {}
        }
    }
    RunReport::from_outcomes(outcomes, collection_errors)
}
