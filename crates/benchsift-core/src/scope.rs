//! Retry and cleanup scopes shared by the forge client and the oracle.
//!
//! [`retry`] re-runs a fallible async operation with exponential backoff,
//! honoring server wait hints. [`guarded`] runs a body and then a cleanup
//! step, even when the body panics.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;

use crate::error::BenchsiftError;

/// Backoff settings for [`retry`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use benchsift_core::scope::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.backoff(1), Duration::from_secs(1));
/// assert_eq!(policy.backoff(3), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each later retry.
    pub base_delay: Duration,
    /// Upper bound on any single wait, including server hints.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(900),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// What [`retry`] should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAdvice {
    /// Try again, waiting the given hint or the policy backoff when `None`.
    Retry(Option<Duration>),
    /// The failure is permanent.
    GiveUp,
}

/// Errors that know whether a retry could help.
pub trait Retryable {
    /// Advice for this failure.
    fn advice(&self) -> RetryAdvice;
}

impl Retryable for BenchsiftError {
    fn advice(&self) -> RetryAdvice {
        if self.is_transient() {
            RetryAdvice::Retry(None)
        } else {
            RetryAdvice::GiveUp
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or retries run out.
///
/// Attempts are bounded by `policy.max_retries + 1`. The last error is
/// returned unchanged.
///
/// # Errors
///
/// Returns the error of the final attempt.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                let wait = match err.advice() {
                    RetryAdvice::GiveUp => return Err(err),
                    _ if attempt > policy.max_retries => return Err(err),
                    RetryAdvice::Retry(Some(hint)) => hint.min(policy.max_delay),
                    RetryAdvice::Retry(None) => policy.backoff(attempt),
                };
                tracing::warn!(
                    operation = label,
                    attempt,
                    max_retries = policy.max_retries,
                    wait_ms = wait.as_millis() as u64,
                    error = %err,
                    "retrying after failure"
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}

/// Run `body`, then always run `cleanup`, returning both outputs.
///
/// A panic in `body` is caught, `cleanup` runs, and the panic resumes.
/// Dropping the returned future before completion skips `cleanup`, so
/// callers pair this with a drop-time fallback for cancellation.
///
/// # Examples
///
/// ```
/// use benchsift_core::scope::guarded;
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// let (body, cleanup) = rt.block_on(guarded(async { 1 + 1 }, async { "restored" }));
/// assert_eq!(body, 2);
/// assert_eq!(cleanup, "restored");
/// ```
pub async fn guarded<B, C, T, U>(body: B, cleanup: C) -> (T, U)
where
    B: Future<Output = T>,
    C: Future<Output = U>,
{
    let outcome = AssertUnwindSafe(body).catch_unwind().await;
    let cleaned = cleanup.await;
    match outcome {
        Ok(value) => (value, cleaned),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
