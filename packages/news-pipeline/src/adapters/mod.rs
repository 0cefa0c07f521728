//! Production implementations of the collaborator traits.

pub mod firecrawl;
pub mod openai;
pub mod rate_limited;
pub mod rows;
pub mod sites;

pub use firecrawl::FirecrawlAdapter;
pub use openai::OpenAIScorer;
pub use rate_limited::{per_minute_limiter, RateLimitExt, RateLimited, SharedLimiter};
pub use rows::JsonRowWriter;
pub use sites::JsonSiteSource;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use firecrawl_client::FirecrawlClient;
use openai_client::OpenAIClient;
use tracing::info;

use crate::config::Config;
use crate::pipeline::Collaborators;
use crate::traits::SystemClock;

const FIRECRAWL_TIMEOUT: Duration = Duration::from_secs(120);
const SCORER_TIMEOUT: Duration = Duration::from_secs(60);

/// Build the real collaborators from configuration.
///
/// Firecrawl and the scorer share one per-minute request budget.
pub fn create_collaborators(config: &Config) -> Result<Collaborators> {
    let mut firecrawl = FirecrawlClient::new(config.firecrawl.api_key.expose())
        .with_timeout(FIRECRAWL_TIMEOUT);
    if let Some(url) = &config.firecrawl.base_url {
        firecrawl = firecrawl.with_base_url(url);
    }

    let mut openai = OpenAIClient::new(config.scorer.api_key.expose())
        .with_timeout(SCORER_TIMEOUT)
        .context("Failed to build scorer HTTP client")?;
    if let Some(url) = &config.scorer.base_url {
        openai = openai.with_base_url(url);
    }

    info!(
        firecrawl = firecrawl.base_url(),
        scorer = openai.base_url(),
        model = %config.scorer_model,
        requests_per_minute = config.requests_per_minute.get(),
        "Collaborators configured"
    );

    let limiter = per_minute_limiter(config.requests_per_minute);
    let firecrawl = Arc::new(FirecrawlAdapter::new(firecrawl).rate_limited(&limiter));

    Ok(Collaborators {
        mapper: firecrawl.clone(),
        fetcher: firecrawl,
        scorer: Arc::new(OpenAIScorer::new(openai, &config.scorer_model).rate_limited(&limiter)),
        sites: Arc::new(JsonSiteSource::new(config.sites_file.clone())),
        rows: Arc::new(JsonRowWriter),
        clock: Arc::new(SystemClock),
    })
}
