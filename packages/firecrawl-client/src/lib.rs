//! Pure Firecrawl REST API client.
//!
//! A minimal client for the two Firecrawl endpoints the news pipeline needs:
//! site mapping (link enumeration) and single-page scraping, either as
//! markdown or as schema-constrained JSON.
//!
//! # Example
//!
//! ```rust,ignore
//! use firecrawl_client::{FirecrawlClient, MapOptions};
//!
//! let client = FirecrawlClient::new("fc-...");
//!
//! let links = client.map_url("https://example.com", &MapOptions::default()).await?;
//! let page = client.scrape_markdown(&links[0]).await?;
//! println!("{}", page.markdown.unwrap_or_default());
//! ```

pub mod error;
pub mod types;

pub use error::{FirecrawlError, Result};
pub use types::{JsonOptions, MapOptions, MapRequest, ScrapeData, ScrapeRequest};

use std::time::Duration;

use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use types::{ErrorBody, MapResponse, ScrapeResponse};

const DEFAULT_BASE_URL: &str = "https://api.firecrawl.dev/v1";

/// Pure Firecrawl API client.
#[derive(Clone)]
pub struct FirecrawlClient {
    http_client: Client,
    api_key: String,
    base_url: String,
}

impl FirecrawlClient {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Set a custom base URL (self-hosted Firecrawl, proxies).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set a client-side request timeout.
    ///
    /// Falls back to the default client if the builder rejects the settings.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        match Client::builder().timeout(timeout).build() {
            Ok(client) => self.http_client = client,
            Err(e) => warn!(error = %e, "Failed to build Firecrawl HTTP client, keeping default"),
        }
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Enumerate the links reachable from `url`.
    pub async fn map_url(&self, url: &str, options: &MapOptions) -> Result<Vec<String>> {
        let request = MapRequest {
            url: url.to_string(),
            include_subdomains: options.include_subdomains,
            limit: options.limit,
            timeout: options.timeout_ms,
        };

        let response: MapResponse = self.post("/map", &request).await?;
        if !response.success {
            return Err(FirecrawlError::Api {
                status: 200,
                message: response
                    .error
                    .unwrap_or_else(|| "Firecrawl map failed".to_string()),
            });
        }

        debug!(url, links = response.links.len(), "Firecrawl map completed");
        Ok(response.links)
    }

    /// Scrape a page as markdown plus page metadata.
    pub async fn scrape_markdown(&self, url: &str) -> Result<ScrapeData> {
        let request = ScrapeRequest {
            url: url.to_string(),
            formats: vec!["markdown".to_string()],
            json_options: None,
        };
        self.scrape(request).await
    }

    /// Scrape a page into JSON matching `schema`, guided by `prompt`.
    ///
    /// Returns the extracted JSON object, or `Value::Null` if Firecrawl
    /// produced nothing for the schema.
    pub async fn scrape_json(
        &self,
        url: &str,
        schema: serde_json::Value,
        prompt: Option<String>,
    ) -> Result<serde_json::Value> {
        let request = ScrapeRequest {
            url: url.to_string(),
            formats: vec!["json".to_string()],
            json_options: Some(JsonOptions { schema, prompt }),
        };
        let data = self.scrape(request).await?;
        Ok(data.json.unwrap_or(serde_json::Value::Null))
    }

    async fn scrape(&self, request: ScrapeRequest) -> Result<ScrapeData> {
        let response: ScrapeResponse = self.post("/scrape", &request).await?;
        if !response.success {
            return Err(FirecrawlError::Api {
                status: 200,
                message: response
                    .error
                    .unwrap_or_else(|| "Firecrawl scrape failed".to_string()),
            });
        }

        response
            .data
            .ok_or_else(|| FirecrawlError::Parse("No data returned from Firecrawl".into()))
    }

    async fn post<T: Serialize, R: DeserializeOwned>(&self, endpoint: &str, body: &T) -> Result<R> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await?;

        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| FirecrawlError::Parse(e.to_string()))
    }
}

/// Turn a non-2xx response into a classified error.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after_header);

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or(text);

    warn!(status = %status, error = %message, "Firecrawl API error");

    match status.as_u16() {
        429 => Err(FirecrawlError::RateLimited {
            retry_after,
            message,
        }),
        408 | 504 => Err(FirecrawlError::Timeout(message)),
        code => Err(FirecrawlError::Api {
            status: code,
            message,
        }),
    }
}

/// `Retry-After` in its delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after_header(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}
