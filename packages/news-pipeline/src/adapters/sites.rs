//! Monitored sites from a JSON file of `{link, note, source}` rows.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::traits::SiteSource;
use crate::types::site::MonitoredSite;

#[derive(Debug, Deserialize)]
struct SiteRow {
    #[serde(default, alias = "url")]
    link: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

pub struct JsonSiteSource {
    path: PathBuf,
}

impl JsonSiteSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SiteSource for JsonSiteSource {
    /// Rows without a link are skipped; a repeated link keeps its first row.
    fn load_sites(&self) -> Result<Vec<MonitoredSite>> {
        let text = fs::read_to_string(&self.path).map_err(|e| {
            PipelineError::Sites(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let rows: Vec<SiteRow> = serde_json::from_str(&text).map_err(|e| {
            PipelineError::Sites(format!("cannot parse {}: {}", self.path.display(), e))
        })?;

        let mut seen = HashSet::new();
        let mut sites = Vec::with_capacity(rows.len());
        for row in rows {
            let link = match row.link.as_deref().map(str::trim) {
                Some(link) if !link.is_empty() => link.to_string(),
                _ => {
                    warn!(note = ?row.note, "Skipping site row without a link");
                    continue;
                }
            };
            if !seen.insert(link.clone()) {
                continue;
            }
            sites.push(MonitoredSite {
                url: link,
                note: row.note.unwrap_or_default(),
                source: row.source.unwrap_or_default(),
            });
        }

        info!(count = sites.len(), path = %self.path.display(), "Loaded monitored sites");
        Ok(sites)
    }
}
