//! Error types for the Firecrawl client.

use std::time::Duration;

use thiserror::Error;

/// Result type for Firecrawl client operations.
pub type Result<T> = std::result::Result<T, FirecrawlError>;

/// Firecrawl client errors.
///
/// Rate limiting and timeouts get their own variants so callers can decide
/// whether a request is worth retrying without string matching.
#[derive(Debug, Error)]
pub enum FirecrawlError {
    /// HTTP 429. `retry_after` is taken from the `Retry-After` header when present.
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    /// Request or upstream job timed out
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Non-2xx response or `success: false`
    #[error("Firecrawl API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Connection failures and other transport errors
    #[error("Network error: {0}")]
    Network(String),

    /// Unexpected response body
    #[error("Parse error: {0}")]
    Parse(String),
}

impl FirecrawlError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            // Firecrawl reports scrape timeouts as 408 or as a 5xx with "timeout" in the body
            Self::Api { status, message } => {
                *status == 408 || message.to_lowercase().contains("timeout")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for FirecrawlError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}
