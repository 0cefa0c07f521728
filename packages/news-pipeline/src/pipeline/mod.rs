//! The three stages and the orchestrator that sequences them.

pub mod discovery;
pub mod extraction;
pub mod orchestrator;
pub mod prompts;
pub mod report;
pub mod validation;

pub use discovery::{DiscoveryOutcome, LinkDiscovery};
pub use extraction::{ContentExtraction, ExtractionSelection};
pub use orchestrator::{PipelineOrchestrator, PipelineState, RunOutput, RunPlan, Stage};
pub use validation::{parse_validation_response, LinkValidation, ValidationOutcome};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};
use crate::traits::{Clock, LinkMapper, PageFetcher, RowWriter, Scorer, SiteSource};
use crate::types::RUN_KEY_FORMAT;

/// Everything the stages need from the outside world.
#[derive(Clone)]
pub struct Collaborators {
    pub mapper: Arc<dyn LinkMapper>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub scorer: Arc<dyn Scorer>,
    pub sites: Arc<dyn SiteSource>,
    pub rows: Arc<dyn RowWriter>,
    pub clock: Arc<dyn Clock>,
}

pub(crate) fn run_key(at: &DateTime<Local>) -> String {
    at.format(RUN_KEY_FORMAT).to_string()
}

/// Sleep for `wait`, or stop early with `Cancelled`.
pub(crate) async fn pause(wait: Duration, cancel: &CancellationToken) -> Result<()> {
    if wait.is_zero() {
        return if cancel.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        };
    }

    tokio::select! {
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        _ = tokio::time::sleep(wait) => Ok(()),
    }
}
