//! Per-site record of every link ever observed.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use super::atomic::{read_json, write_json_atomic};
use crate::error::StoreResult;

type HistoryMap = BTreeMap<String, BTreeSet<String>>;

/// Observed-link history, `{homepage: [url, ...]}` on disk.
///
/// History only grows: [`LinkHistory::record`] unions, nothing removes.
/// Diffing and recording are separate so that discovery can commit the
/// history only after its batch is safely stored.
pub struct LinkHistory {
    path: PathBuf,
    seen: Mutex<HistoryMap>,
}

impl LinkHistory {
    /// Load the history at `path`; a missing file is an empty history.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let seen: HistoryMap = read_json(&path)?.unwrap_or_default();
        debug!(path = %path.display(), sites = seen.len(), "Loaded link history");
        Ok(Self {
            path,
            seen: Mutex::new(seen),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Links in `current` not yet seen for `site`, in `current`'s order.
    pub fn new_links(&self, site: &str, current: &[String]) -> Vec<String> {
        let seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        match seen.get(site) {
            Some(known) => current
                .iter()
                .filter(|url| !known.contains(*url))
                .cloned()
                .collect(),
            None => current.to_vec(),
        }
    }

    pub fn known_count(&self, site: &str) -> usize {
        let seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.get(site).map_or(0, BTreeSet::len)
    }

    pub fn snapshot(&self, site: &str) -> BTreeSet<String> {
        let seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.get(site).cloned().unwrap_or_default()
    }

    /// Union each site's observed links into the history and persist.
    ///
    /// The file is written before the in-memory view changes, so a failed
    /// write leaves both untouched.
    pub fn record(&self, observations: &[(String, Vec<String>)]) -> StoreResult<()> {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);

        let mut next = seen.clone();
        let mut added = 0usize;
        for (site, links) in observations {
            let known = next.entry(site.clone()).or_default();
            for link in links {
                if known.insert(link.clone()) {
                    added += 1;
                }
            }
        }

        if added == 0 {
            return Ok(());
        }

        write_json_atomic(&self.path, &next)?;
        *seen = next;
        debug!(added, path = %self.path.display(), "Link history updated");
        Ok(())
    }
}
