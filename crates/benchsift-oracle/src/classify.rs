//! F2P / P2P classification of two runs.

use std::collections::{BTreeMap, BTreeSet};

use benchsift_core::{TestId, TestStatus};
use serde::Serialize;

use crate::runner::{RunReport, SuiteStatus};

/// Test identities sorted into oracle buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Absent or failing at base, passing at head.
    pub f2p: BTreeSet<TestId>,
    /// Passing at both checkouts.
    pub p2p: BTreeSet<TestId>,
    /// Errored at either checkout; in neither set above.
    pub errored: BTreeSet<TestId>,
}

/// Name used for a file-level collection error at head.
pub const COLLECTION_ERROR: &str = "<collection>";

/// Compare identity-matched outcomes from the base and head runs.
///
/// Only tests present at head are classified, so tests deleted by the
/// change never count. A test that errored at either checkout, or whose
/// file failed to load at either checkout, goes to `errored` only. A base
/// run that crashed tells nothing about any test, so every test present at
/// head goes to `errored`.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeSet;
/// use benchsift_core::{Checkout, TestId, TestOutcome, TestStatus};
/// use benchsift_oracle::{classify, RunReport};
///
/// let outcome = |name: &str, status| TestOutcome {
///     id: TestId::new("tests/test_cart.py", name),
///     status,
///     checkout: Checkout::Base,
/// };
/// let base = RunReport::from_outcomes(
///     vec![outcome("test_sum", TestStatus::Pass), outcome("test_empty", TestStatus::Fail)],
///     BTreeSet::new(),
/// );
/// let head = RunReport::from_outcomes(
///     vec![outcome("test_sum", TestStatus::Pass), outcome("test_empty", TestStatus::Pass)],
///     BTreeSet::new(),
/// );
/// let c = classify(&base, &head);
/// assert!(c.f2p.contains(&TestId::new("tests/test_cart.py", "test_empty")));
/// assert!(c.p2p.contains(&TestId::new("tests/test_cart.py", "test_sum")));
/// ```
pub fn classify(base: &RunReport, head: &RunReport) -> Classification {
    let base_crashed = matches!(base.status, SuiteStatus::Crashed { .. });
    let before = statuses(base);
    let after = statuses(head);

    let mut result = Classification::default();
    for file in &head.collection_errors {
        result.errored.insert(TestId::new(file.as_str(), COLLECTION_ERROR));
    }

    for (id, status) in after {
        let broken_file = |report: &RunReport| report.collection_errors.contains(&id.file);
        let errored = status == TestStatus::Error
            || before.get(&id) == Some(&TestStatus::Error)
            || broken_file(head)
            || broken_file(base)
            || base_crashed;
        if errored {
            tracing::debug!(test = %id, "excluded: errored at base or head");
            result.errored.insert(id);
            continue;
        }
        if status != TestStatus::Pass {
            continue;
        }
        match before.get(&id) {
            None | Some(TestStatus::Fail) => {
                result.f2p.insert(id);
            }
            Some(TestStatus::Pass) => {
                result.p2p.insert(id);
            }
            Some(_) => {}
        }
    }
    result
}

/// One status per identity. Repeated identities keep the worst status.
fn statuses(report: &RunReport) -> BTreeMap<TestId, TestStatus> {
    let mut map = BTreeMap::new();
    for outcome in &report.outcomes {
        map.entry(outcome.id.clone())
            .and_modify(|s: &mut TestStatus| {
                if severity(outcome.status) > severity(*s) {
                    *s = outcome.status;
                }
            })
            .or_insert(outcome.status);
    }
    map
}

fn severity(status: TestStatus) -> u8 {
    match status {
        TestStatus::Skip => 0,
        TestStatus::Pass => 1,
        TestStatus::Fail => 2,
        TestStatus::Error => 3,
    }
}
