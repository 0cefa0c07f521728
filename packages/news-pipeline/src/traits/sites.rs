//! Monitored site input.

use crate::error::Result;
use crate::types::site::MonitoredSite;

/// Source of the homepages to monitor.
pub trait SiteSource: Send + Sync {
    fn load_sites(&self) -> Result<Vec<MonitoredSite>>;
}
