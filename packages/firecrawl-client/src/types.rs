use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Body for `POST /map`.
#[derive(Debug, Clone, Serialize)]
pub struct MapRequest {
    pub url: String,
    #[serde(rename = "includeSubdomains")]
    pub include_subdomains: bool,
    pub limit: u32,
    /// Milliseconds
    pub timeout: u64,
}

/// Options accepted by [`FirecrawlClient::map_url`](crate::FirecrawlClient::map_url).
#[derive(Debug, Clone)]
pub struct MapOptions {
    pub include_subdomains: bool,
    pub limit: u32,
    pub timeout_ms: u64,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            include_subdomains: false,
            limit: 500,
            timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MapResponse {
    pub success: bool,
    #[serde(default)]
    pub links: Vec<String>,
    pub error: Option<String>,
}

/// Body for `POST /scrape`.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeRequest {
    pub url: String,
    pub formats: Vec<String>,
    #[serde(rename = "jsonOptions", skip_serializing_if = "Option::is_none")]
    pub json_options: Option<JsonOptions>,
}

/// Schema-constrained extraction options for the `json` scrape format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOptions {
    pub schema: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ScrapeResponse {
    pub success: bool,
    pub data: Option<ScrapeData>,
    pub error: Option<String>,
}

/// Payload of a successful scrape.
///
/// Which fields are populated depends on the requested formats.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrapeData {
    pub markdown: Option<String>,
    pub json: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Error body Firecrawl returns alongside non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: Option<String>,
}
