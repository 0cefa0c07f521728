//! Discovery and validation batches.
//!
//! The persisted shapes match the JSON stores exactly:
//!
//! ```text
//! discovery:  {ts: {homepage: {note, source, new_links, timestamp, batch_id}}}
//! validation: {ts: {batch_id, timestamp, results: {homepage: {note, source,
//!              validated_links: [{url, validation}], original_timestamp}}}}
//! ```

use std::fmt;

use chrono::{DateTime, TimeZone};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::stores::Correlated;

/// Identifier correlating one discovery run with its downstream runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `batch_<YYYYMMDDHHMMSS>` for the given instant.
    pub fn mint<Tz: TimeZone>(at: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self(format!("batch_{}", at.format("%Y%m%d%H%M%S")))
    }

    /// Disambiguated variant, `batch_..._<n>`.
    pub fn with_sequence(&self, n: u32) -> Self {
        Self(format!("{}_{}", self.0, n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BatchId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for BatchId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// New links found on one homepage during one discovery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteDiscovery {
    #[serde(default)]
    pub note: String,

    #[serde(default)]
    pub source: String,

    pub new_links: Vec<String>,

    /// When this site was checked
    pub timestamp: String,

    /// Stamped once the run's id is minted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<BatchId>,
}

/// One discovery run: homepage url → what was new there.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscoveryBatch {
    pub sites: IndexMap<String, SiteDiscovery>,
}

impl DiscoveryBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, homepage: impl Into<String>, entry: SiteDiscovery) {
        self.sites.insert(homepage.into(), entry);
    }

    /// Stamp `batch_id` into every per-site entry.
    pub fn stamp(&mut self, batch_id: &BatchId) {
        for entry in self.sites.values_mut() {
            entry.batch_id = Some(batch_id.clone());
        }
    }

    /// The id carried by the first entry that has one.
    pub fn batch_id(&self) -> Option<&BatchId> {
        self.sites.values().find_map(|e| e.batch_id.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn link_count(&self) -> usize {
        self.sites.values().map(|e| e.new_links.len()).sum()
    }
}

impl Correlated for DiscoveryBatch {
    fn carries(&self, batch_id: &BatchId) -> bool {
        self.sites
            .values()
            .any(|e| e.batch_id.as_ref() == Some(batch_id))
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Scoring verdict for one link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    #[serde(deserialize_with = "deserialize_score")]
    pub score: u8,
    pub is_valid: bool,
    pub reason: String,
}

impl ValidationRecord {
    pub fn new(score: u8, is_valid: bool, reason: impl Into<String>) -> Self {
        Self {
            score: score.min(100),
            is_valid,
            reason: reason.into(),
        }
    }

    /// Substitute for a scoring response that could not be parsed.
    pub fn unparseable() -> Self {
        Self::new(0, false, "unparseable")
    }

    pub fn passes(&self, min_score: u8) -> bool {
        self.is_valid && self.score >= min_score
    }
}

/// Accepts integers, floats and numeric strings; clamps to 0..=100.
///
/// Fractions are truncated so `score >= threshold` holds exactly as it did
/// for the raw number.
fn deserialize_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let score = match &value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|s| s.is_finite())
    .ok_or_else(|| serde::de::Error::custom(format!("score is not numeric: {}", value)))?;

    Ok(score.floor().clamp(0.0, 100.0) as u8)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedLink {
    pub url: String,
    pub validation: ValidationRecord,
}

/// Scored links for one homepage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteValidation {
    #[serde(default)]
    pub note: String,

    #[serde(default)]
    pub source: String,

    pub validated_links: Vec<ValidatedLink>,

    /// Store key of the discovery batch these links came from
    pub original_timestamp: String,
}

/// One validation run over one discovery batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationBatch {
    pub batch_id: BatchId,
    pub timestamp: String,
    pub results: IndexMap<String, SiteValidation>,
}

impl ValidationBatch {
    pub fn record_count(&self) -> usize {
        self.results
            .values()
            .map(|s| s.validated_links.len())
            .sum()
    }

    pub fn passing_count(&self, min_score: u8) -> usize {
        self.results
            .values()
            .flat_map(|s| &s.validated_links)
            .filter(|l| l.validation.passes(min_score))
            .count()
    }
}

impl Correlated for ValidationBatch {
    fn carries(&self, batch_id: &BatchId) -> bool {
        &self.batch_id == batch_id
    }
}
