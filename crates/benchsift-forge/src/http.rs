//! Retrying HTTP transport shared by the forge clients.

use std::fmt;
use std::time::Duration;

use benchsift_core::scope::{self, RetryAdvice, RetryPolicy, Retryable};
use benchsift_core::BenchsiftError;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;

/// One failed HTTP attempt.
#[derive(Debug)]
pub struct HttpFailure {
    /// HTTP status, when a response arrived.
    pub status: Option<u16>,
    /// What went wrong.
    pub message: String,
    /// Whether and when to retry.
    pub advice: RetryAdvice,
}

impl fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {status}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl Retryable for HttpFailure {
    fn advice(&self) -> RetryAdvice {
        self.advice
    }
}

impl From<HttpFailure> for BenchsiftError {
    fn from(failure: HttpFailure) -> Self {
        let transient = failure.advice != RetryAdvice::GiveUp;
        BenchsiftError::Network {
            message: failure.to_string(),
            transient,
        }
    }
}

/// Decide whether a failed response is worth retrying.
///
/// 410 is never retried. 429, and 403 whose body mentions a rate limit,
/// wait for `Retry-After` (seconds), else until `X-RateLimit-Reset` (unix
/// seconds, relative to `now_unix`), else the policy backoff. 5xx backs off.
/// Every other status is permanent.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use benchsift_core::scope::RetryAdvice;
/// use benchsift_forge::http::classify_status;
/// use reqwest::header::HeaderMap;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("retry-after", "7".parse().unwrap());
/// assert_eq!(
///     classify_status(429, &headers, "", 0),
///     RetryAdvice::Retry(Some(Duration::from_secs(7)))
/// );
/// assert_eq!(classify_status(410, &HeaderMap::new(), "", 0), RetryAdvice::GiveUp);
/// ```
pub fn classify_status(status: u16, headers: &HeaderMap, body: &str, now_unix: i64) -> RetryAdvice {
    if status == 410 {
        return RetryAdvice::GiveUp;
    }
    let rate_limited =
        status == 429 || (status == 403 && body.to_ascii_lowercase().contains("rate limit"));
    if rate_limited {
        return RetryAdvice::Retry(rate_limit_wait(headers, now_unix));
    }
    if (500..600).contains(&status) {
        return RetryAdvice::Retry(None);
    }
    RetryAdvice::GiveUp
}

fn rate_limit_wait(headers: &HeaderMap, now_unix: i64) -> Option<Duration> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };
    if let Some(secs) = header("retry-after") {
        return Some(Duration::from_secs(secs.max(0) as u64));
    }
    header("x-ratelimit-reset").map(|reset| Duration::from_secs((reset - now_unix).max(0) as u64))
}

/// A reqwest client with auth, a per-request timeout and bounded retries.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    token: Option<String>,
    policy: RetryPolicy,
}

impl HttpClient {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Config`] if the HTTP client cannot be built.
    pub fn new(
        token: Option<String>,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<Self, BenchsiftError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("benchsift/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BenchsiftError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            token,
            policy,
        })
    }

    /// GET `url` and decode JSON.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Network`] after retries run out, or
    /// [`BenchsiftError::Parse`] if the body is not the expected JSON.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        accept: &str,
    ) -> Result<T, BenchsiftError> {
        let body = self.send(url, || self.client.get(url).header("Accept", accept)).await?;
        serde_json::from_str(&body)
            .map_err(|e| BenchsiftError::Parse(format!("unexpected response from {url}: {e}")))
    }

    /// POST a JSON body to `url` and decode JSON.
    ///
    /// # Errors
    ///
    /// As [`HttpClient::get_json`].
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, BenchsiftError> {
        let text = self.send(url, || self.client.post(url).json(body)).await?;
        serde_json::from_str(&text)
            .map_err(|e| BenchsiftError::Parse(format!("unexpected response from {url}: {e}")))
    }

    /// GET `url` as text with the given `Accept` header.
    ///
    /// # Errors
    ///
    /// Returns [`BenchsiftError::Network`] after retries run out.
    pub async fn get_text(&self, url: &str, accept: &str) -> Result<String, BenchsiftError> {
        self.send(url, || self.client.get(url).header("Accept", accept))
            .await
    }

    async fn send<F>(&self, url: &str, build: F) -> Result<String, BenchsiftError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        scope::retry(&self.policy, url, || self.attempt(build()))
            .await
            .map_err(BenchsiftError::from)
    }

    async fn attempt(&self, request: reqwest::RequestBuilder) -> Result<String, HttpFailure> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(|e| HttpFailure {
            status: None,
            message: format!("request failed: {e}"),
            advice: RetryAdvice::Retry(None),
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(|e| HttpFailure {
            status: Some(status.as_u16()),
            message: format!("failed to read response: {e}"),
            advice: RetryAdvice::Retry(None),
        })?;

        if status.is_success() {
            return Ok(body);
        }
        let now = chrono::Utc::now().timestamp();
        Err(HttpFailure {
            status: Some(status.as_u16()),
            advice: classify_status(status.as_u16(), &headers, &body, now),
            message: truncate(&body, 300),
        })
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
