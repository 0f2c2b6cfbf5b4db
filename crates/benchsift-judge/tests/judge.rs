use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use benchsift_core::{Author, BenchsiftError, JudgeConfig, PullRequestCandidate};
use benchsift_judge::llm::Role;
use benchsift_judge::{rubric, ChatBackend, ChatMessage, Judge};
use chrono::Utc;

/// Replays canned replies and records every prompt it was sent.
struct Scripted {
    replies: Mutex<VecDeque<Result<String, BenchsiftError>>>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl Scripted {
    fn new(replies: Vec<Result<&str, &str>>) -> Arc<Self> {
        let replies = replies
            .into_iter()
            .map(|r| r.map(String::from).map_err(|e| BenchsiftError::Llm(e.into())))
            .collect();
        Arc::new(Self {
            replies: Mutex::new(replies),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatBackend for Scripted {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, BenchsiftError> {
        self.seen.lock().unwrap().push(messages);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BenchsiftError::Llm("script exhausted".into())))
    }
}

fn candidate() -> PullRequestCandidate {
    PullRequestCandidate {
        number: 42,
        title: "Fix rounding in invoice totals".into(),
        body: "Totals were off by a cent.".into(),
        author: Author {
            login: "alice".into(),
            is_bot: false,
        },
        created_at: Utc::now(),
        merged_at: Utc::now(),
        base_sha: "a".into(),
        head_sha: "b".into(),
        files: vec![],
        linked_issues: vec![],
    }
}

fn judge(backend: Arc<Scripted>) -> Judge {
    Judge::new(backend, JudgeConfig::default())
}

#[tokio::test]
async fn fenced_reply_is_scored_first_time() {
    let backend = Scripted::new(vec![Ok(
        "```json\n{\"score\": 1, \"reason\": \"edge case untested\", \"analysis\": \"...\"}\n```",
    )]);
    let score = judge(backend.clone())
        .score(&candidate(), "+round(x, 2)", &rubric::TEST_DISCRIMINATIVE_POWER)
        .await
        .unwrap();
    assert_eq!(score.score, 1);
    assert_eq!(score.reason, "edge case untested");
    assert_eq!(backend.calls(), 1);

    let seen = backend.seen.lock().unwrap();
    assert_eq!(seen[0][0].role, Role::System);
    assert!(seen[0][1].content.contains("Test Discriminative Power"));
    assert!(seen[0][1].content.contains("+round(x, 2)"));
}

#[tokio::test]
async fn malformed_replies_are_retried() {
    let backend = Scripted::new(vec![
        Ok("I think this is fine."),
        Err("503 Service Unavailable"),
        Ok("{\"score\": 0, \"reason\": \"clean\", \"analysis\": \"\"}"),
    ]);
    let score = judge(backend.clone())
        .score(&candidate(), "+x", &rubric::GOLD_PATCH_CLARITY)
        .await;
    assert_eq!(score.map(|s| s.score), Some(0));
    assert_eq!(backend.calls(), 3);
}

#[tokio::test]
async fn exhausted_attempts_mean_absent() {
    let backend = Scripted::new(vec![
        Ok("{\"score\": 7}"),
        Ok("{\"score\": 9}"),
        Ok("{\"score\": 8}"),
        Ok("{\"score\": 1}"),
    ]);
    let score = judge(backend.clone())
        .score(&candidate(), "+x", &rubric::TEST_CLARITY)
        .await;
    assert!(score.is_none());
    assert_eq!(backend.calls(), 3);
}

#[tokio::test]
async fn score_all_covers_every_category() {
    let backend = Scripted::new(vec![
        Ok("{\"score\": 0}"),
        Ok("{\"score\": 1}"),
        Ok("nope"),
        Ok("nope"),
        Ok("nope"),
        Ok("{\"score\": 2}"),
        Ok("{\"score\": 3}"),
    ]);
    let scores = judge(backend).score_all(&candidate(), "+x").await;
    assert_eq!(scores.len(), 5);
    assert_eq!(scores["test_issue_alignment"].as_ref().map(|s| s.score), Some(0));
    assert_eq!(scores["test_discriminative_power"].as_ref().map(|s| s.score), Some(1));
    assert!(scores["gold_patch_clarity"].is_none());
    assert_eq!(scores["gold_patch_alignment"].as_ref().map(|s| s.score), Some(2));
    assert_eq!(scores["test_clarity"].as_ref().map(|s| s.score), Some(3));
}
