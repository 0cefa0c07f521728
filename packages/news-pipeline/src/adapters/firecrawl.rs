//! Firecrawl as link mapper and page fetcher.

use async_trait::async_trait;
use firecrawl_client::{FirecrawlClient, FirecrawlError, MapOptions};
use serde_json::Value;

use crate::retry::{CallError, CallResult};
use crate::traits::{LinkMapper, MapConfig, PageFetcher};
use crate::types::extraction::RawPage;

/// Firecrawl behind both web-facing seams.
#[derive(Clone)]
pub struct FirecrawlAdapter {
    client: FirecrawlClient,
}

impl FirecrawlAdapter {
    pub fn new(client: FirecrawlClient) -> Self {
        Self { client }
    }
}

impl From<FirecrawlError> for CallError {
    fn from(err: FirecrawlError) -> Self {
        match err {
            FirecrawlError::RateLimited {
                retry_after,
                message,
            } => CallError::RateLimited {
                retry_after,
                message,
            },
            // Firecrawl sometimes reports throttling inside a 200 body
            FirecrawlError::Api { ref message, .. }
                if message.to_lowercase().contains("rate limit exceeded") =>
            {
                CallError::rate_limited(message.clone())
            }
            e if e.is_timeout() => CallError::Timeout(e.to_string()),
            e => CallError::Fatal(e.to_string()),
        }
    }
}

#[async_trait]
impl LinkMapper for FirecrawlAdapter {
    async fn map_links(&self, url: &str, config: &MapConfig) -> CallResult<Vec<String>> {
        let options = MapOptions {
            include_subdomains: config.include_subdomains,
            limit: config.limit,
            timeout_ms: config.timeout_ms,
        };
        Ok(self.client.map_url(url, &options).await?)
    }
}

#[async_trait]
impl PageFetcher for FirecrawlAdapter {
    async fn fetch_raw(&self, url: &str) -> CallResult<RawPage> {
        let data = self.client.scrape_markdown(url).await?;

        let mut metadata: Vec<(String, Value)> = data.metadata.into_iter().collect();
        metadata.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(RawPage {
            markdown: data.markdown.unwrap_or_default(),
            metadata: metadata.into_iter().collect(),
        })
    }

    async fn fetch_structured(&self, url: &str, schema: &Value, prompt: &str) -> CallResult<Value> {
        Ok(self
            .client
            .scrape_json(url, schema.clone(), Some(prompt.to_string()))
            .await?)
    }
}
