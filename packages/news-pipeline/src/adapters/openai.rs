//! Chat-completion model as the link scorer.

use async_trait::async_trait;
use openai_client::{ChatRequest, Message, OpenAIClient, OpenAIError};

use crate::retry::{CallError, CallResult};
use crate::traits::Scorer;

/// Sends each prompt as a single user message.
#[derive(Clone)]
pub struct OpenAIScorer {
    client: OpenAIClient,
    model: String,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

impl OpenAIScorer {
    pub fn new(client: OpenAIClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.1,
            top_p: 0.8,
            max_tokens: 1500,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl From<OpenAIError> for CallError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::RateLimited {
                retry_after,
                message,
            } => CallError::RateLimited {
                retry_after,
                message,
            },
            OpenAIError::Timeout(message) => CallError::Timeout(message),
            e => CallError::Fatal(e.to_string()),
        }
    }
}

#[async_trait]
impl Scorer for OpenAIScorer {
    async fn score(&self, prompt: &str) -> CallResult<String> {
        let request = ChatRequest::new(&self.model)
            .message(Message::user(prompt))
            .temperature(self.temperature)
            .top_p(self.top_p)
            .max_tokens(self.max_tokens);

        let response = self.client.chat_completion(request).await?;
        if let Some(usage) = &response.usage {
            tracing::debug!(
                model = %self.model,
                total_tokens = usage.total_tokens,
                "Scoring call completed"
            );
        }
        Ok(response.content)
    }
}
