//! Page fetching.

use async_trait::async_trait;
use serde_json::Value;

use crate::retry::CallResult;
use crate::types::extraction::RawPage;

/// Fetches article pages in the two formats extraction needs.
///
/// The two calls are independent on purpose: a structured fetch that times
/// out must not cost us the markdown.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Markdown plus page metadata.
    async fn fetch_raw(&self, url: &str) -> CallResult<RawPage>;

    /// JSON constrained to `schema`, guided by `prompt`.
    async fn fetch_structured(&self, url: &str, schema: &Value, prompt: &str) -> CallResult<Value>;
}
