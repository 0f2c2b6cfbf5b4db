use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use benchsift_core::{BenchsiftError, Checkout, TestId, TestOutcome, TestStatus};
use serde::Deserialize;

use crate::exec::{probe_command, run_process};
use crate::runner::{RunReport, TestRunner};

/// Jest through `npx`, reading its `--json` report.
#[derive(Debug, Clone, Default)]
pub struct JestRunner;

#[async_trait]
impl TestRunner for JestRunner {
    fn name(&self) -> &'static str {
        "jest"
    }

    fn language(&self) -> &'static str {
        "JavaScript"
    }

    fn markers(&self) -> &'static [&'static str] {
        &[
            "jest.config.js",
            "jest.config.ts",
            "jest.config.mjs",
            "jest.config.cjs",
            "package.json",
        ]
    }

    async fn probe(&self, dir: &Path) -> Result<(), BenchsiftError> {
        probe_command("npx", &["--no-install", "jest", "--version"], dir).await
    }

    async fn run(
        &self,
        dir: &Path,
        targets: &[String],
        checkout: Checkout,
        timeout: Duration,
    ) -> Result<RunReport, BenchsiftError> {
        let mut args: Vec<String> = ["--no-install", "jest", "--ci", "--json", "--silent"]
            .iter()
            .map(|a| (*a).to_string())
            .collect();
        if !targets.is_empty() {
            args.push("--runTestsByPath".into());
            args.extend(targets.iter().cloned());
        }
        let output = run_process("npx", &args, dir, timeout).await?;
        let report = match parse_report(&output.stdout, dir) {
            Some(report) => report,
            None => RunReport::crashed(output.tail(20)),
        };
        Ok(report.at(checkout))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JestReport {
    #[serde(default)]
    test_results: Vec<JestFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JestFile {
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    assertion_results: Vec<JestAssertion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JestAssertion {
    full_name: String,
    status: String,
}

/// Parse Jest's `--json` output; `None` if stdout holds no report.
///
/// A failed file with no assertions never loaded and counts as a
/// collection error.
fn parse_report(stdout: &str, root: &Path) -> Option<RunReport> {
    let start = stdout.find('{')?;
    let report: JestReport = serde_json::from_str(stdout[start..].trim_end()).ok()?;
    let root = root.to_string_lossy();

    let mut outcomes = Vec::new();
    let mut collection_errors = BTreeSet::new();
    for file in report.test_results {
        let path = file
            .name
            .strip_prefix(root.as_ref())
            .map(|p| p.trim_start_matches('/'))
            .unwrap_or(&file.name)
            .to_string();
        if file.assertion_results.is_empty() && file.status == "failed" {
            collection_errors.insert(path);
            continue;
        }
        for assertion in file.assertion_results {
            let status = match assertion.status.as_str() {
                "passed" => TestStatus::Pass,
                "failed" => TestStatus::Fail,
                _ => TestStatus::Skip,
            };
            outcomes.push(TestOutcome {
                id: TestId::new(path.clone(), assertion.full_name),
                status,
                checkout: Checkout::Head,
            });
        }
    }
    Some(RunReport::from_outcomes(outcomes, collection_errors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_report() {
        let stdout = r#"{"numTotalTests": 3, "testResults": [
            {"name": "/repo/src/cart.test.js", "status": "failed", "message": "",
             "assertionResults": [
                {"fullName": "cart totals empty", "status": "failed"},
                {"fullName": "cart totals sum", "status": "passed"},
                {"fullName": "cart later", "status": "todo"}
             ]},
            {"name": "/repo/src/api.test.js", "status": "failed",
             "message": "Cannot find module './api'", "assertionResults": []}
        ]}"#;
        let report = parse_report(stdout, Path::new("/repo")).unwrap();
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(
            report.outcomes[0].id,
            TestId::new("src/cart.test.js", "cart totals empty")
        );
        assert_eq!(report.outcomes[2].status, TestStatus::Skip);
        assert!(report.collection_errors.contains("src/api.test.js"));
    }

    #[test]
    fn garbage_is_not_a_report() {
        assert!(parse_report("npm ERR! could not determine executable", Path::new("/r")).is_none());
    }
}
