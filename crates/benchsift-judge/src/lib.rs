//! Optional LLM grading of validated candidates.
//!
//! A [`Judge`] asks a chat model to score a candidate's diff against each
//! [`rubric::Rubric`]. Replies that cannot be parsed into a bounded score are
//! retried a fixed number of times and then treated as absent.

pub mod llm;
mod response;
pub mod rubric;

use std::collections::BTreeMap;
use std::sync::Arc;

use benchsift_core::{BenchsiftError, JudgeConfig, PullRequestCandidate};

pub use llm::{ChatBackend, ChatMessage, LlmClient};
pub use response::{parse_response, JudgeScore};
pub use rubric::Rubric;

/// Scores candidates against rubric categories.
pub struct Judge {
    backend: Arc<dyn ChatBackend>,
    config: JudgeConfig,
}

impl Judge {
    /// A judge talking to `backend`.
    pub fn new(backend: Arc<dyn ChatBackend>, config: JudgeConfig) -> Self {
        Self { backend, config }
    }

    /// A judge using the OpenAI-compatible endpoint from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Llm`] if the HTTP client cannot be built.
    pub fn from_config(config: &JudgeConfig) -> Result<Self, BenchsiftError> {
        let client = LlmClient::new(config)?;
        Ok(Self::new(Arc::new(client), config.clone()))
    }

    /// Score one category.
    ///
    /// Request failures and malformed replies both use up an attempt.
    /// Returns `None` once `max_attempts` are spent.
    pub async fn score(
        &self,
        candidate: &PullRequestCandidate,
        diff: &str,
        rubric: &Rubric,
    ) -> Option<JudgeScore> {
        let (min, max) = (self.config.min_score, self.config.max_score);
        let prompt = rubric::build_prompt(candidate, diff, rubric, min, max);
        let attempts = self.config.max_attempts.max(1);

        for attempt in 1..=attempts {
            let messages = vec![
                ChatMessage::system(rubric::SYSTEM_PROMPT),
                ChatMessage::user(prompt.as_str()),
            ];
            let failure = match self.backend.chat(messages).await {
                Ok(reply) => match parse_response(&reply, min, max) {
                    Ok(score) => {
                        tracing::debug!(
                            pr = candidate.number,
                            category = rubric.key,
                            score = score.score,
                            "judge scored"
                        );
                        return Some(score);
                    }
                    Err(e) => e,
                },
                Err(e) => e,
            };
            tracing::warn!(
                pr = candidate.number,
                category = rubric.key,
                attempt,
                max_attempts = attempts,
                error = %failure,
                "judge reply unusable"
            );
        }
        None
    }

    /// Score every category in [`rubric::ALL`], keyed by category key.
    pub async fn score_all(
        &self,
        candidate: &PullRequestCandidate,
        diff: &str,
    ) -> BTreeMap<String, Option<JudgeScore>> {
        let mut scores = BTreeMap::new();
        for rubric in &rubric::ALL {
            let score = self.score(candidate, diff, rubric).await;
            scores.insert(rubric.key.to_string(), score);
        }
        scores
    }
}
