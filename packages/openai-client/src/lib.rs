//! Chat-completion client for OpenAI-compatible APIs
//!
//! A clean, minimal client with no domain-specific logic. Any provider that
//! speaks the `/chat/completions` protocol works (OpenAI, DashScope's
//! compatible mode, OpenRouter) by pointing `with_base_url` at it.
//!
//! # Example
//!
//! ```rust,ignore
//! use openai_client::{OpenAIClient, ChatRequest, Message};
//!
//! let client = OpenAIClient::from_env()?;
//!
//! let response = client.chat_completion(
//!     ChatRequest::new("gpt-4o-mini")
//!         .message(Message::user("Hello!"))
//!         .temperature(0.1),
//! ).await?;
//! ```

pub mod error;
pub mod types;

pub use error::{OpenAIError, Result};
pub use types::*;

use std::time::Duration;

use reqwest::{header, Client};
use tracing::{debug, warn};

/// OpenAI-compatible API client.
#[derive(Clone)]
pub struct OpenAIClient {
    http_client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIClient {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    /// Create from environment variable `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| OpenAIError::Config("OPENAI_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    /// Set a custom base URL (for DashScope, Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set a client-side request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OpenAIError::Config(e.to_string()))?;
        Ok(self)
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Chat completion.
    ///
    /// Send messages to the chat completion API and get a response.
    pub async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
        let start = std::time::Instant::now();

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Chat completion request failed");
                OpenAIError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Chat completion API error");
            return Err(classify_error(status.as_u16(), retry_after, &error_text));
        }

        let chat_response: types::ChatResponseRaw = response
            .json()
            .await
            .map_err(|e| OpenAIError::Parse(e.to_string()))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| OpenAIError::Parse("No choices in chat completion response".into()))?;

        debug!(
            model = %request.model,
            duration_ms = start.elapsed().as_millis(),
            "Chat completion"
        );

        Ok(ChatResponse {
            content,
            usage: chat_response.usage,
        })
    }
}

/// Map a non-2xx response onto the error taxonomy.
///
/// Some providers throttle with a 400/403 and a `Throttling` code instead
/// of a 429, so the error code is inspected as well.
fn classify_error(status: u16, retry_after: Option<Duration>, body: &str) -> OpenAIError {
    let (message, code) = match serde_json::from_str::<types::ErrorEnvelope>(body) {
        Ok(env) => (
            env.error.message,
            env.error
                .code
                .map(|c| c.as_str().map(str::to_string).unwrap_or_else(|| c.to_string())),
        ),
        Err(_) => (body.to_string(), None),
    };

    let throttled = code
        .as_deref()
        .map(|c| {
            let c = c.to_lowercase();
            c.contains("throttling") || c.contains("rate_limit")
        })
        .unwrap_or(false);

    match status {
        429 => OpenAIError::RateLimited {
            retry_after,
            message,
        },
        _ if throttled => OpenAIError::RateLimited {
            retry_after,
            message,
        },
        408 | 504 => OpenAIError::Timeout(message),
        _ => OpenAIError::Api { status, message },
    }
}
