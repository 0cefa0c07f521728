//! Link enumeration.

use async_trait::async_trait;

use crate::retry::CallResult;

/// Options for one enumeration call.
#[derive(Debug, Clone, PartialEq)]
pub struct MapConfig {
    pub include_subdomains: bool,
    pub limit: u32,
    pub timeout_ms: u64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            include_subdomains: false,
            limit: 500,
            timeout_ms: 60_000,
        }
    }
}

/// Lists the absolute URLs currently linked from a homepage.
#[async_trait]
pub trait LinkMapper: Send + Sync {
    async fn map_links(&self, url: &str, config: &MapConfig) -> CallResult<Vec<String>>;
}
