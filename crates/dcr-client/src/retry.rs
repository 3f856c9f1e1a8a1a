//! Retry with exponential backoff for repository HTTP calls.
//!
//! Only transport failures are retried, and only those the caller marks as
//! retryable. A response with any status code, including 5xx, is returned
//! to the caller as-is: writes inside a transaction must not be silently
//! replayed.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff schedule for transport failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retry attempts after the initial request.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each attempt.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(2u64.saturating_pow(attempt)))
    }
}

/// Call `f` up to `max_retries + 1` times, sleeping between failures.
/// An error for which `retryable` returns false is returned immediately.
pub async fn retry_send<R, F, Fut, T, E>(policy: &RetryPolicy, uri: &str, retryable: R, f: F) -> Result<T, E>
where
    R: Fn(&E) -> bool,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    for attempt in 0..policy.max_retries {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if !retryable(&e) => return Err(e),
            Err(e) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    uri,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    "repository request failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
    f().await
}
