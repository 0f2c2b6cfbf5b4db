//! Scoring categories and prompt construction.

use std::fmt::Write as _;

use benchsift_core::PullRequestCandidate;

/// One scoring category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rubric {
    /// Stable snake_case key used in reports.
    pub key: &'static str,
    /// Human-readable category name.
    pub name: &'static str,
    /// Scale and analysis instructions.
    pub text: &'static str,
}

/// Shared preamble sent with every category.
pub const SYSTEM_PROMPT: &str = "\
You are a benchmark curator grading merged pull requests as task instances. \
Respond only with a single JSON object.

Rules:
- The score must agree with the analysis. A described problem cannot get a clean score.
- Code that exists but is untested is a gap, not a pass.
- Many shallow tests are worse than a few tests on real logic branches.
- A test that only fails because an import is missing at base is the minimum bar, not quality.
- The lowest score means no issue was found at all.
- Untested error and fallback paths count as untested code.";

/// Do the tests verify what the issue asks for?
pub const TEST_ISSUE_ALIGNMENT: Rubric = Rubric {
    key: "test_issue_alignment",
    name: "Test to Issue Alignment",
    text: "\
Would these tests confirm that a correct solution to the issue solved the right problem?

- 0: every requirement in the issue, including named options and parameters, has tests for valid and invalid input.
- 1: every headline feature has basic tests; gaps are limited to wiring between components or secondary edge cases.
- 2: core requirements are missed while peripheral code is tested, or tests target features the issue never mentions.
- 3: tests only check that things exist or are constructed, are unrelated to the issue, or delete existing tests.

Words in the PR title are headline claims. If a headline claim has no test exercising it, score at least 2.

Steps: list every claim in the issue; for each test, note what it asserts; map claims to asserting tests and mark the rest UNTESTED.",
};

/// Can the tests tell a wrong fix from a right one?
pub const TEST_DISCRIMINATIVE_POWER: Rubric = Rubric {
    key: "test_discriminative_power",
    name: "Test Discriminative Power",
    text: "\
Can the tests reject wrong solutions and accept correct ones?

- 0: no meaningfully wrong implementation you can construct passes the tests.
- 1: one or two minor wrong behaviors slip through, such as an untested parameter or edge case.
- 2: three or more wrong implementations pass, or a whole layer is unverified (mocked storage, existence-only assertions).
- 3: a stub returning hard-coded values passes.

Steps: for each key function in the diff, invent a concrete wrong implementation and trace it through the assertions. \
Watch for tautologies: asserting a mock's own return value, truthiness-only checks, inclusion checks with no exclusion check.",
};

/// Is the fix itself easy to read?
pub const GOLD_PATCH_CLARITY: Rubric = Rubric {
    key: "gold_patch_clarity",
    name: "Gold Patch Clarity",
    text: "\
How clear and well-structured is the non-test part of the diff?

- 0: focused and well-structured with clear separation of concerns.
- 1: mostly clear; a few small unrelated files are included.
- 2: mixed concerns or an unclear scope.
- 3: debug or deployment leftovers, abandoned work, or an intent that is hard to follow.",
};

/// Does the fix implement what the issue describes?
pub const GOLD_PATCH_ALIGNMENT: Rubric = Rubric {
    key: "gold_patch_alignment",
    name: "Gold Patch to Issue Alignment",
    text: "\
Does the diff implement what the issue describes, and only that?

- 0: every requested feature and rule is implemented with no unrelated changes and no functional bugs.
- 1: core functionality is complete; small unrequested changes such as a flipped config flag or an extra field.
- 2: an explicitly stated requirement is missing, or large unrelated additions make the change non-atomic.
- 3: requested behavior is largely missing or the patch is mostly unrelated to the issue.

Steps: list every requirement; check each against the diff; list unrelated changes; look for bugs in the implementation.",
};

/// Are the tests easy to understand?
pub const TEST_CLARITY: Rubric = Rubric {
    key: "test_clarity",
    name: "Test Clarity",
    text: "\
How clear and understandable are the tests?

- 0: self-documenting setup, action and assertion; intent is obvious even when the scope is small.
- 1: readable, but names promise more coverage than the bodies deliver, or mocking is unusual.
- 2: a mix of clear new tests and existing tests gutted into existence checks.
- 3: confusing tests whose intent is unclear.",
};

/// Every category, in report order.
pub const ALL: [Rubric; 5] = [
    TEST_ISSUE_ALIGNMENT,
    TEST_DISCRIMINATIVE_POWER,
    GOLD_PATCH_CLARITY,
    GOLD_PATCH_ALIGNMENT,
    TEST_CLARITY,
];

/// Look up a category by key.
///
/// # Examples
///
/// ```
/// use benchsift_judge::rubric;
///
/// assert_eq!(rubric::by_key("test_clarity").unwrap().name, "Test Clarity");
/// assert!(rubric::by_key("style").is_none());
/// ```
pub fn by_key(key: &str) -> Option<Rubric> {
    ALL.into_iter().find(|r| r.key == key)
}

/// Build the user prompt for one category.
///
/// The task statement is the PR title and body followed by any linked
/// issues; the diff is sent whole.
pub fn build_prompt(
    candidate: &PullRequestCandidate,
    diff: &str,
    rubric: &Rubric,
    min_score: i64,
    max_score: i64,
) -> String {
    let mut prompt = format!(
        "Score PR #{} on: {}\n\n## Task statement\n\n**{}**\n\n{}\n",
        candidate.number,
        rubric.name,
        candidate.title,
        candidate.body.trim()
    );
    for issue in &candidate.linked_issues {
        let _ = write!(
            prompt,
            "\n### Issue #{}: {}\n\n{}\n",
            issue.number,
            issue.title,
            issue.body.trim()
        );
    }

    prompt.push_str("\n## Files changed\n\n");
    for file in &candidate.files {
        let _ = writeln!(
            prompt,
            "- {} ({}, +{} -{})",
            file.path, file.change, file.additions, file.deletions
        );
    }

    let diff = match diff.trim() {
        "" => "(no changes)",
        d => d,
    };
    let _ = write!(
        prompt,
        "\n## Diff\n\n```diff\n{diff}\n```\n\n## Rubric: {} ({min_score}-{max_score}, lower is better)\n\n{}\n\n\
         Respond with a JSON object:\n\
         {{\"score\": <{min_score}-{max_score}>, \"reason\": \"<one sentence>\", \"analysis\": \"<full analysis>\"}}",
        rubric.name, rubric.text
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchsift_core::{Author, ChangeKind, ChangedFile, LinkedIssue};
    use chrono::Utc;

    fn candidate() -> PullRequestCandidate {
        PullRequestCandidate {
            number: 7,
            title: "Add coupon support".into(),
            body: "Carts accept coupons.".into(),
            author: Author {
                login: "alice".into(),
                is_bot: false,
            },
            created_at: Utc::now(),
            merged_at: Utc::now(),
            base_sha: "a".into(),
            head_sha: "b".into(),
            files: vec![ChangedFile {
                path: "cart.py".into(),
                change: ChangeKind::Modified,
                additions: 4,
                deletions: 1,
            }],
            linked_issues: vec![LinkedIssue {
                number: 3,
                title: "Coupons".into(),
                body: "Support percentage coupons.".into(),
                state: "closed".into(),
                is_pull_request: false,
            }],
        }
    }

    #[test]
    fn keys_are_unique() {
        let mut keys: Vec<_> = ALL.iter().map(|r| r.key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), 5);
    }

    #[test]
    fn prompt_carries_task_files_diff_and_scale() {
        let prompt = build_prompt(&candidate(), "+coupon", &TEST_CLARITY, 0, 3);
        assert!(prompt.contains("Score PR #7 on: Test Clarity"));
        assert!(prompt.contains("Carts accept coupons."));
        assert!(prompt.contains("Issue #3: Coupons"));
        assert!(prompt.contains("- cart.py (modified, +4 -1)"));
        assert!(prompt.contains("```diff\n+coupon\n```"));
        assert!(prompt.contains("\"score\": <0-3>"));
    }

    #[test]
    fn empty_diff_is_labelled() {
        let prompt = build_prompt(&candidate(), "  \n", &GOLD_PATCH_CLARITY, 0, 3);
        assert!(prompt.contains("(no changes)"));
    }
}
