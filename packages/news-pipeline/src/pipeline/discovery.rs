//! Homepage link discovery.
//!
//! For each monitored homepage: enumerate its links, drop self-links and
//! non-article paths, diff against the link history and collect what is new.
//! One batch id is minted per run and stamped into every site entry.
//!
//! The batch is written before the history is updated. If the process dies
//! in between, the next run reports the same links again rather than losing
//! them.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{pause, run_key, Collaborators};
use crate::config::PipelineSettings;
use crate::error::{PipelineError, Result};
use crate::stores::Stores;
use crate::traits::{Clock, LinkMapper};
use crate::types::batch::{BatchId, DiscoveryBatch, SiteDiscovery};
use crate::types::site::MonitoredSite;

/// Substrings marking links that are never articles.
pub const EXCLUDED_PATTERNS: &[&str] = &[
    "/tag/",
    "/category/",
    "/author/",
    "/search/",
    "/page/",
    "/wp-content/",
    "/wp-admin/",
    "/wp-includes/",
    "/login",
    "/register",
    "/account",
    ".jpg",
    ".jpeg",
    ".png",
    ".gif",
    ".css",
    ".js",
    ".xml",
    ".pdf",
    "javascript:",
];

const LOGGED_NEW_LINKS: usize = 10;

/// A persisted discovery run.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryOutcome {
    /// Store key the batch was written under
    pub key: String,
    pub batch_id: BatchId,
    pub batch: DiscoveryBatch,
}

pub struct LinkDiscovery {
    mapper: Arc<dyn LinkMapper>,
    clock: Arc<dyn Clock>,
    stores: Arc<Stores>,
    settings: PipelineSettings,
}

impl LinkDiscovery {
    pub fn new(collaborators: &Collaborators, stores: Arc<Stores>, settings: PipelineSettings) -> Self {
        Self {
            mapper: Arc::clone(&collaborators.mapper),
            clock: Arc::clone(&collaborators.clock),
            stores,
            settings,
        }
    }

    /// Check every site once. `None` when no site had anything new.
    ///
    /// A site whose enumeration fails is logged and skipped.
    pub async fn discover(
        &self,
        sites: &[MonitoredSite],
        cancel: &CancellationToken,
    ) -> Result<Option<DiscoveryOutcome>> {
        let mut batch = DiscoveryBatch::new();
        let mut observations: Vec<(String, Vec<String>)> = Vec::new();

        for (i, site) in sites.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            info!(
                site = %site.url,
                note = %site.note,
                index = i + 1,
                total = sites.len(),
                "Checking homepage"
            );

            if let Some(current) = self.current_links(site).await {
                let new_links = self.stores.history.new_links(&site.url, &current);
                info!(
                    site = %site.url,
                    current = current.len(),
                    known = self.stores.history.known_count(&site.url),
                    new = new_links.len(),
                    "Diffed against history"
                );

                if !new_links.is_empty() {
                    for link in new_links.iter().take(LOGGED_NEW_LINKS) {
                        debug!(site = %site.url, link = %link, "New link");
                    }
                    if new_links.len() > LOGGED_NEW_LINKS {
                        debug!(
                            site = %site.url,
                            more = new_links.len() - LOGGED_NEW_LINKS,
                            "More new links not shown"
                        );
                    }

                    batch.insert(
                        site.url.clone(),
                        SiteDiscovery {
                            note: site.note.clone(),
                            source: site.source.clone(),
                            new_links,
                            timestamp: run_key(&self.clock.now()),
                            batch_id: None,
                        },
                    );
                    observations.push((site.url.clone(), current));
                }
            }

            if i + 1 < sites.len() {
                let wait = self.settings.site_pause();
                debug!(wait_secs = wait.as_secs(), "Pausing before next homepage");
                pause(wait, cancel).await?;
            }
        }

        if batch.is_empty() {
            info!(sites = sites.len(), "No new links found");
            return Ok(None);
        }

        let now = self.clock.now();
        let batch_id = self.unique_batch_id(BatchId::mint(&now))?;
        batch.stamp(&batch_id);

        let outcome = self.stores.discovery.put(&run_key(&now), batch.clone())?;
        if !outcome.was_written() {
            return Err(PipelineError::DuplicateKey {
                key: outcome.key().to_string(),
            });
        }

        self.stores.history.record(&observations)?;

        info!(
            batch_id = %batch_id,
            key = outcome.key(),
            sites = batch.sites.len(),
            links = batch.link_count(),
            "Discovery batch saved"
        );

        Ok(Some(DiscoveryOutcome {
            key: outcome.key().to_string(),
            batch_id,
            batch,
        }))
    }

    /// Filtered links currently on `site`, or `None` if enumeration failed.
    async fn current_links(&self, site: &MonitoredSite) -> Option<Vec<String>> {
        let config = &self.settings.map;
        let raw = self
            .settings
            .retry
            .call("map_links", || self.mapper.map_links(&site.url, config))
            .await;

        match raw {
            Ok(raw) => {
                let links = filter_links(&site.url, &raw);
                debug!(
                    site = %site.url,
                    raw = raw.len(),
                    kept = links.len(),
                    "Filtered homepage links"
                );
                Some(links)
            }
            Err(e) => {
                warn!(site = %site.url, error = %e, "Link enumeration failed");
                None
            }
        }
    }

    /// `base`, or `base_2`, `base_3`, ... if an earlier run already used it.
    fn unique_batch_id(&self, base: BatchId) -> Result<BatchId> {
        if !self.stores.discovery.contains_correlation_id(&base)? {
            return Ok(base);
        }
        for n in 2.. {
            let candidate = base.with_sequence(n);
            if !self.stores.discovery.contains_correlation_id(&candidate)? {
                return Ok(candidate);
            }
        }
        Ok(base)
    }
}

/// Drop self-links and excluded paths, de-duplicating in order.
pub fn filter_links(homepage: &str, links: &[String]) -> Vec<String> {
    let home = homepage.trim_end_matches('/');
    let mut seen = HashSet::new();

    links
        .iter()
        .filter(|link| link.trim_end_matches('/') != home)
        .filter(|link| !EXCLUDED_PATTERNS.iter().any(|p| link.contains(p)))
        .filter(|link| seen.insert(link.as_str()))
        .cloned()
        .collect()
}
