use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use benchsift_core::{BenchsiftError, Checkout, TestId, TestOutcome, TestStatus};
use serde::Deserialize;

use crate::exec::{probe_command, run_process};
use crate::runner::{RunReport, TestRunner};

/// `go test -json` over the packages holding the target files.
#[derive(Debug, Clone, Default)]
pub struct GoRunner;

#[async_trait]
impl TestRunner for GoRunner {
    fn name(&self) -> &'static str {
        "go"
    }

    fn language(&self) -> &'static str {
        "Go"
    }

    fn markers(&self) -> &'static [&'static str] {
        &["go.mod"]
    }

    async fn probe(&self, dir: &Path) -> Result<(), BenchsiftError> {
        probe_command("go", &["version"], dir).await
    }

    async fn run(
        &self,
        dir: &Path,
        targets: &[String],
        checkout: Checkout,
        timeout: Duration,
    ) -> Result<RunReport, BenchsiftError> {
        let mut args = vec!["test".to_string(), "-json".to_string()];
        if targets.is_empty() {
            args.push("./...".into());
        } else {
            args.extend(packages(targets));
        }
        let output = run_process("go", &args, dir, timeout).await?;
        let report = match parse_events(&output.stdout) {
            Some(report) => report,
            None => RunReport::crashed(output.tail(20)),
        };
        Ok(report.at(checkout))
    }
}

/// `./dir` package patterns for the directories of `_test.go` targets.
fn packages(targets: &[String]) -> BTreeSet<String> {
    targets
        .iter()
        .filter(|t| t.ends_with("_test.go"))
        .map(|t| match t.rsplit_once('/') {
            Some((dir, _)) => format!("./{}", dir.trim_start_matches("./")),
            None => ".".to_string(),
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TestEvent {
    action: String,
    #[serde(default)]
    package: String,
    test: Option<String>,
}

/// Fold `go test -json` events into a report; `None` if there were none.
///
/// A package that fails without any test events failed to build.
fn parse_events(stdout: &str) -> Option<RunReport> {
    let mut seen_event = false;
    let mut tests: BTreeMap<TestId, TestStatus> = BTreeMap::new();
    let mut packages_with_tests = BTreeSet::new();
    let mut failed_packages = BTreeSet::new();

    for line in stdout.lines() {
        let Ok(event) = serde_json::from_str::<TestEvent>(line) else {
            continue;
        };
        seen_event = true;
        let status = match event.action.as_str() {
            "pass" => TestStatus::Pass,
            "fail" => TestStatus::Fail,
            "skip" => TestStatus::Skip,
            _ => continue,
        };
        match event.test {
            Some(name) => {
                packages_with_tests.insert(event.package.clone());
                tests.insert(TestId::new(event.package, name), status);
            }
            None if status == TestStatus::Fail => {
                failed_packages.insert(event.package);
            }
            None => {}
        }
    }
    if !seen_event {
        return None;
    }

    let collection_errors = failed_packages
        .difference(&packages_with_tests)
        .cloned()
        .collect();
    let outcomes = tests
        .into_iter()
        .map(|(id, status)| TestOutcome {
            id,
            status,
            checkout: Checkout::Head,
        })
        .collect();
    Some(RunReport::from_outcomes(outcomes, collection_errors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_patterns() {
        let pkgs = packages(&[
            "pkg/cart/cart_test.go".into(),
            "pkg/cart/total_test.go".into(),
            "main_test.go".into(),
            "pkg/cart/cart.go".into(),
        ]);
        assert_eq!(pkgs.into_iter().collect::<Vec<_>>(), vec![".", "./pkg/cart"]);
    }

    #[test]
    fn folds_events() {
        let stdout = r#"{"Action":"run","Package":"example.com/shop/cart","Test":"TestEmpty"}
{"Action":"output","Package":"example.com/shop/cart","Test":"TestEmpty","Output":"--- FAIL"}
{"Action":"fail","Package":"example.com/shop/cart","Test":"TestEmpty","Elapsed":0}
{"Action":"pass","Package":"example.com/shop/cart","Test":"TestSum/two","Elapsed":0}
{"Action":"fail","Package":"example.com/shop/cart","Elapsed":0.01}
{"Action":"output","Package":"example.com/shop/api","Output":"FAIL\texample.com/shop/api [build failed]\n"}
{"Action":"fail","Package":"example.com/shop/api","Elapsed":0}"#;
        let report = parse_events(stdout).unwrap();
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(
            report.outcomes[0].id,
            TestId::new("example.com/shop/cart", "TestEmpty")
        );
        assert_eq!(report.outcomes[0].status, TestStatus::Fail);
        assert_eq!(report.outcomes[1].status, TestStatus::Pass);
        assert_eq!(
            report.collection_errors.into_iter().collect::<Vec<_>>(),
            vec!["example.com/shop/api"]
        );
    }

    #[test]
    fn no_events_means_crash() {
        assert!(parse_events("go: cannot find main module").is_none());
    }
}
