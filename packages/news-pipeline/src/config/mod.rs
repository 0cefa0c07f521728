//! Configuration loaded from the environment (and `.env`).

pub mod credentials;
pub mod settings;

pub use credentials::{ApiCredentials, SecretString};
pub use settings::PipelineSettings;

use std::env;
use std::num::NonZeroU32;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;

use crate::retry::RetryPolicy;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub firecrawl: ApiCredentials,
    pub scorer: ApiCredentials,
    pub scorer_model: String,
    pub sites_file: PathBuf,
    pub data_dir: PathBuf,
    pub results_dir: PathBuf,
    /// Also write logs here, appending, when set
    pub log_file: Option<PathBuf>,
    pub requests_per_minute: NonZeroU32,
    pub settings: PipelineSettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable lookup.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        let mut firecrawl =
            ApiCredentials::new(get("FIRECRAWL_API_KEY").context("FIRECRAWL_API_KEY must be set")?);
        if let Some(url) = get("FIRECRAWL_API_URL") {
            firecrawl = firecrawl.with_base_url(url);
        }

        let scorer_key = get("SCORER_API_KEY")
            .or_else(|| get("OPENAI_API_KEY"))
            .context("SCORER_API_KEY or OPENAI_API_KEY must be set")?;
        let scorer = ApiCredentials::new(scorer_key).with_base_url(
            get("SCORER_BASE_URL").unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        );

        let defaults = PipelineSettings::default();
        let settings = PipelineSettings {
            retry: RetryPolicy::new(
                parse_or(&get, "MAX_RETRIES", defaults.retry.max_retries)?,
                secs_or(&get, "RETRY_DELAY_SECS", defaults.retry.base_delay)?,
                secs_or(&get, "TIMEOUT_RETRY_WAIT_SECS", defaults.retry.timeout_wait)?,
            ),
            map: defaults.map,
            batch_pause: secs_or(&get, "BATCH_PAUSE_SECS", defaults.batch_pause)?,
            site_pacing_jitter: match get("SITE_PACING_JITTER_SECS") {
                Some(raw) => parse_range(&raw)
                    .with_context(|| format!("SITE_PACING_JITTER_SECS must look like 5-15, got {raw}"))?,
                None => defaults.site_pacing_jitter,
            },
            batch_size: parse_or(&get, "BATCH_SIZE", defaults.batch_size)?.max(1),
            extraction_cooldown: secs_or(&get, "EXTRACTION_COOLDOWN_SECS", defaults.extraction_cooldown)?,
            min_valid_score: parse_or(&get, "MIN_VALID_SCORE", defaults.min_valid_score)?.min(100),
            topic: get("TOPIC").unwrap_or(defaults.topic),
        };

        Ok(Self {
            firecrawl,
            scorer,
            scorer_model: get("SCORER_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            sites_file: get("SITES_FILE")
                .unwrap_or_else(|| "homepages.json".to_string())
                .into(),
            data_dir: get("DATA_DIR").unwrap_or_else(|| "data".to_string()).into(),
            results_dir: get("RESULTS_DIR").unwrap_or_else(|| ".".to_string()).into(),
            log_file: get("LOG_FILE").map(PathBuf::from),
            requests_per_minute: NonZeroU32::new(parse_or(&get, "REQUESTS_PER_MINUTE", 60u32)?)
                .context("REQUESTS_PER_MINUTE must be above zero")?,
            settings,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a valid number, got {raw}")),
        None => Ok(default),
    }
}

fn secs_or(get: &impl Fn(&str) -> Option<String>, name: &str, default: Duration) -> Result<Duration> {
    Ok(match get(name) {
        Some(_) => Duration::from_secs(parse_or(get, name, 0u64)?),
        None => default,
    })
}

/// `"5-15"` → `5..=15`; a single number is a fixed value.
fn parse_range(raw: &str) -> Result<RangeInclusive<u64>> {
    let (lo, hi) = match raw.split_once('-') {
        Some((lo, hi)) => (lo.trim().parse::<u64>()?, hi.trim().parse::<u64>()?),
        None => {
            let n = raw.trim().parse::<u64>()?;
            (n, n)
        }
    };
    if lo > hi {
        return Err(anyhow!("range start {lo} is above end {hi}"));
    }
    Ok(lo..=hi)
}
