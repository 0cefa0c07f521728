//! Tunables shared by the pipeline stages.

use std::ops::RangeInclusive;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::traits::MapConfig;

/// Stage behaviour that does not depend on where files live.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub retry: RetryPolicy,

    /// Options for every link enumeration call
    pub map: MapConfig,

    /// Fixed part of the pause between sites, and the extraction batch pause
    pub batch_pause: Duration,

    /// Random extra pause between sites, in whole seconds
    pub site_pacing_jitter: RangeInclusive<u64>,

    /// URLs extracted between batch pauses
    pub batch_size: usize,

    /// Wait before re-fetching markdown after a timeout
    pub extraction_cooldown: Duration,

    /// Lowest score a valid link needs to be extracted
    pub min_valid_score: u8,

    /// Subject the scoring prompt asks about
    pub topic: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            map: MapConfig::default(),
            batch_pause: Duration::from_secs(30),
            site_pacing_jitter: 5..=15,
            batch_size: 5,
            extraction_cooldown: Duration::from_secs(30),
            min_valid_score: 70,
            topic: "agricultural".to_string(),
        }
    }
}

impl PipelineSettings {
    /// Pause before the next site: the batch pause plus a random jitter.
    pub fn site_pause(&self) -> Duration {
        let (lo, hi) = (*self.site_pacing_jitter.start(), *self.site_pacing_jitter.end());
        let jitter = if hi > lo {
            rand::random_range(lo..=hi)
        } else {
            lo
        };
        self.batch_pause + Duration::from_secs(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_pause_within_bounds() {
        let settings = PipelineSettings::default();
        for _ in 0..50 {
            let pause = settings.site_pause();
            assert!(pause >= Duration::from_secs(35));
            assert!(pause <= Duration::from_secs(45));
        }
    }

    #[test]
    fn test_zero_pacing() {
        let settings = PipelineSettings {
            batch_pause: Duration::ZERO,
            site_pacing_jitter: 0..=0,
            ..Default::default()
        };
        assert_eq!(settings.site_pause(), Duration::ZERO);
    }
}
