//! Shared retry/backoff around calls to rate-limited external services.
//!
//! Every collaborator call returns a [`CallResult`], whose error side says
//! *why* the call failed. [`RetryPolicy::call`] is the single place that
//! turns those reasons into waits, retries or give-ups:
//!
//! | signal | behaviour |
//! |---|---|
//! | `RateLimited` | wait the server-suggested time, else `base_delay * attempt`; after `max_retries` retries return `T::default()` |
//! | `Timeout` | one retry after `timeout_wait`, then [`RetryError::Timeout`] |
//! | `Fatal` | no retry, [`RetryError::Fatal`] |
//!
//! Exhausting the rate-limit budget yields an *empty success*. Callers
//! cannot tell "the service returned nothing" from "we gave up waiting for
//! the service"; the discovery stage simply sees no links for that site and
//! the validation stage records the default invalid score. Both re-run
//! cleanly on the next pipeline run.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Failure classes a collaborator adapter can report.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CallError {
    /// The service asked us to slow down
    #[error("rate limited: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    /// The call did not finish in time
    #[error("timeout: {0}")]
    Timeout(String),

    /// Anything else; retrying will not help
    #[error("{0}")]
    Fatal(String),
}

impl CallError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited {
            retry_after: None,
            message: message.into(),
        }
    }
}

/// Result of a single collaborator call.
pub type CallResult<T> = std::result::Result<T, CallError>;

/// Terminal failure of a retried call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RetryError {
    #[error("timed out after retry: {0}")]
    Timeout(String),

    #[error("{0}")]
    Fatal(String),
}

impl RetryError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Backoff settings shared by every stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Rate-limit retries before giving up with an empty result
    pub max_retries: u32,
    /// Linear backoff unit when the server suggests no wait
    pub base_delay: Duration,
    /// Fixed wait before the single timeout retry
    pub timeout_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(15),
            timeout_wait: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, timeout_wait: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            timeout_wait,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or the budget is spent.
    ///
    /// `label` only feeds the logs.
    pub async fn call<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryError>
    where
        T: Default,
        F: FnMut() -> Fut,
        Fut: Future<Output = CallResult<T>>,
    {
        let mut rate_limited = 0u32;
        let mut timeout_retried = false;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(CallError::RateLimited {
                    retry_after,
                    message,
                }) => {
                    rate_limited += 1;
                    if rate_limited > self.max_retries {
                        warn!(
                            call = label,
                            retries = self.max_retries,
                            "Rate limit retries exhausted, returning empty result"
                        );
                        return Ok(T::default());
                    }

                    let wait = retry_after
                        .or_else(|| parse_retry_after(&message))
                        .unwrap_or_else(|| self.base_delay * rate_limited);
                    warn!(
                        call = label,
                        attempt = rate_limited,
                        wait_secs = wait.as_secs_f64(),
                        "Rate limited, backing off"
                    );
                    sleep(wait).await;
                }
                Err(CallError::Timeout(message)) => {
                    if timeout_retried {
                        return Err(RetryError::Timeout(message));
                    }
                    timeout_retried = true;
                    warn!(
                        call = label,
                        wait_secs = self.timeout_wait.as_secs_f64(),
                        error = %message,
                        "Request timed out, retrying once"
                    );
                    sleep(self.timeout_wait).await;
                }
                Err(CallError::Fatal(message)) => {
                    debug!(call = label, error = %message, "Non-retryable error");
                    return Err(RetryError::Fatal(message));
                }
            }
        }
    }
}

async fn sleep(wait: Duration) {
    if !wait.is_zero() {
        tokio::time::sleep(wait).await;
    }
}

/// Pull a server-suggested wait out of an error message.
///
/// Recognises the "... please retry after 25s, resets at ..." phrasing used
/// by Firecrawl and similar services. Fractional seconds are truncated.
pub fn parse_retry_after(message: &str) -> Option<Duration> {
    const MARKER: &str = "retry after ";

    let lower = message.to_lowercase();
    let start = lower.find(MARKER)? + MARKER.len();
    let number: String = lower[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let secs = number.parse::<f64>().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs(secs.trunc() as u64))
}
