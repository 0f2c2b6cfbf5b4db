use std::time::Duration;

use async_trait::async_trait;
use benchsift_core::{BenchsiftError, JudgeConfig};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// A message in a chat conversation with the model.
///
/// # Examples
///
/// ```
/// use benchsift_judge::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("Score this PR");
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

impl ChatMessage {
    /// A system-role message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use benchsift_judge::llm::Role;
///
/// assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

/// Anything that answers a chat conversation with text.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send `messages` and return the reply text.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Llm`] when no reply could be obtained.
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, BenchsiftError>;
}

/// OpenAI-compatible chat completions client.
///
/// Works with any provider that exposes `/v1/chat/completions`.
///
/// # Examples
///
/// ```
/// use benchsift_core::JudgeConfig;
/// use benchsift_judge::llm::LlmClient;
///
/// let config = JudgeConfig {
///     api_key: Some("test-key".into()),
///     ..JudgeConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.model(), "gpt-4o");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: JudgeConfig,
}

impl LlmClient {
    /// Create a client from the judge configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Llm`] if the HTTP client cannot be built.
    pub fn new(config: &JudgeConfig) -> Result<Self, BenchsiftError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| BenchsiftError::Llm(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Return the model name from the configuration.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        // Accept base URLs given with or without the version segment.
        if base_url.ends_with("/v1") {
            format!("{base_url}/chat/completions")
        } else {
            format!("{base_url}/v1/chat/completions")
        }
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    /// Builds a request with temperature 0.1 and JSON response format.
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, BenchsiftError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": 0.1,
            "response_format": { "type": "json_object" },
        });

        let mut request = self.client.post(self.endpoint());
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| BenchsiftError::Llm(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(BenchsiftError::Llm(format!(
                "LLM API error {status}: {body_text}"
            )));
        }

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BenchsiftError::Llm(format!("failed to parse response: {e}")))?;

        let content = response_body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                BenchsiftError::Llm(format!("unexpected response structure: {response_body}"))
            })?;

        Ok(content.to_string())
    }
}
