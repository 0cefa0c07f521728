//! Sequences the stages and carries the batch id between them.
//!
//! ```text
//! Idle ─▶ Discovering ─▶ Validating ─▶ Extracting ─▶ Done
//!   │          │              │             │
//!   └──────────┴──────────────┴─────────────┴──────▶ Aborted
//! ```
//!
//! Single-stage plans enter the graph at their stage and finish in `Done`
//! right after it. Stage errors never escape: they become `Aborted`, and
//! whatever the earlier stages persisted stays on disk.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    pause, Collaborators, ContentExtraction, ExtractionSelection, LinkDiscovery, LinkValidation,
};
use crate::config::PipelineSettings;
use crate::error::PipelineError;
use crate::stores::Stores;
use crate::traits::{Clock, SiteSource};
use crate::types::batch::BatchId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Discovery,
    Validation,
    Extraction,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discovery => "discovery",
            Self::Validation => "validation",
            Self::Extraction => "extraction",
        })
    }
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutput {
    Discovered { key: String, batch_id: BatchId },
    Validated { key: String, batch_id: BatchId },
    Extracted { results_dir: PathBuf },
}

impl fmt::Display for RunOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovered { key, batch_id } => write!(f, "discovery batch {} at {}", batch_id, key),
            Self::Validated { key, batch_id } => write!(f, "validation batch {} at {}", batch_id, key),
            Self::Extracted { results_dir } => write!(f, "{}", results_dir.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Idle,
    Discovering,
    Validating { batch_id: Option<BatchId> },
    Extracting { selection: ExtractionSelection },
    Done { output: RunOutput },
    Aborted { stage: Stage, reason: String },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Aborted { .. })
    }

    pub fn can_transition_to(&self, next: &PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Idle, Discovering | Validating { .. } | Extracting { .. }) => true,
            (Discovering, Validating { .. }) => true,
            (Validating { .. }, Extracting { .. }) => true,
            (Discovering | Validating { .. } | Extracting { .. }, Done { .. }) => true,
            (from, Aborted { .. }) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Which stages to run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunPlan {
    /// All three stages; with a batch id, discovery is skipped
    Full { batch_id: Option<BatchId> },
    Discover,
    Validate { batch_id: Option<BatchId> },
    Extract(ExtractionSelection),
}

pub struct PipelineOrchestrator {
    sites: Arc<dyn SiteSource>,
    clock: Arc<dyn Clock>,
    discovery: LinkDiscovery,
    validation: LinkValidation,
    extraction: ContentExtraction,
    state: PipelineState,
    trail: Vec<PipelineState>,
}

impl PipelineOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        stores: Arc<Stores>,
        settings: PipelineSettings,
        results_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            discovery: LinkDiscovery::new(&collaborators, Arc::clone(&stores), settings.clone()),
            validation: LinkValidation::new(&collaborators, Arc::clone(&stores), settings.clone()),
            extraction: ContentExtraction::new(&collaborators, stores, settings, results_root),
            sites: collaborators.sites,
            clock: collaborators.clock,
            state: PipelineState::Idle,
            trail: vec![PipelineState::Idle],
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Every state visited so far, starting with `Idle`.
    pub fn trail(&self) -> &[PipelineState] {
        &self.trail
    }

    fn transition(&mut self, next: PipelineState) {
        if !self.state.can_transition_to(&next) {
            warn!(from = ?self.state, to = ?next, "Unexpected pipeline transition");
        }
        debug!(state = ?next, "Pipeline state");
        self.trail.push(next.clone());
        self.state = next;
    }

    fn abort(&mut self, stage: Stage, err: PipelineError) -> PipelineState {
        match &err {
            PipelineError::EmptyUpstreamResult(_) | PipelineError::MissingBatchReference { .. } => {
                warn!(%stage, reason = %err, "Stopping pipeline")
            }
            _ => warn!(%stage, error = %err, "Stage failed, stopping pipeline"),
        }
        self.finish(PipelineState::Aborted {
            stage,
            reason: err.to_string(),
        })
    }

    fn finish(&mut self, state: PipelineState) -> PipelineState {
        self.transition(state.clone());
        state
    }

    /// Execute `plan` to a terminal state and log a run summary.
    ///
    /// Every run starts from `Idle`; the trail only covers the latest run.
    pub async fn run(&mut self, plan: RunPlan, cancel: &CancellationToken) -> PipelineState {
        self.state = PipelineState::Idle;
        self.trail = vec![PipelineState::Idle];

        let started = self.clock.now();
        info!(plan = ?plan, started = %started.format("%Y-%m-%d %H:%M:%S"), "Pipeline run starting");

        let end = match plan {
            RunPlan::Full { batch_id } => self.run_full(batch_id, cancel).await,
            RunPlan::Discover => match self.discover(cancel).await {
                Ok((key, batch_id)) => self.finish(PipelineState::Done {
                    output: RunOutput::Discovered { key, batch_id },
                }),
                Err(state) => state,
            },
            RunPlan::Validate { batch_id } => match self.validate(batch_id, cancel).await {
                Ok((key, batch_id)) => self.finish(PipelineState::Done {
                    output: RunOutput::Validated { key, batch_id },
                }),
                Err(state) => state,
            },
            RunPlan::Extract(selection) => self.extract(selection, cancel).await,
        };

        let finished = self.clock.now();
        let elapsed = finished.signed_duration_since(started);
        match &end {
            PipelineState::Done { output } => info!(
                started = %started.format("%Y-%m-%d %H:%M:%S"),
                finished = %finished.format("%Y-%m-%d %H:%M:%S"),
                elapsed_secs = elapsed.num_seconds(),
                output = %output,
                "Pipeline run complete"
            ),
            PipelineState::Aborted { stage, reason } => info!(
                started = %started.format("%Y-%m-%d %H:%M:%S"),
                finished = %finished.format("%Y-%m-%d %H:%M:%S"),
                elapsed_secs = elapsed.num_seconds(),
                %stage,
                reason = %reason,
                "Pipeline run stopped early"
            ),
            _ => {}
        }
        end
    }

    /// Monitoring mode: execute `plan`, wait `interval`, and go again until
    /// `cancel` fires. Returns the terminal state of every run.
    pub async fn run_every(
        &mut self,
        plan: RunPlan,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Vec<PipelineState> {
        let mut ends = Vec::new();
        loop {
            ends.push(self.run(plan.clone(), cancel).await);
            if cancel.is_cancelled() {
                break;
            }

            info!(
                run = ends.len(),
                wait_mins = interval.as_secs() / 60,
                "Waiting for next run"
            );
            if pause(interval, cancel).await.is_err() {
                break;
            }
        }
        info!(runs = ends.len(), "Monitoring stopped");
        ends
    }

    /// Discovery (unless a batch id is given), validation, extraction.
    pub async fn run_full(
        &mut self,
        batch_id: Option<BatchId>,
        cancel: &CancellationToken,
    ) -> PipelineState {
        let batch_id = match batch_id {
            Some(id) => {
                info!(batch_id = %id, "Batch given, skipping discovery");
                id
            }
            None => match self.discover(cancel).await {
                Ok((_, id)) => id,
                Err(state) => return state,
            },
        };

        let (validation_key, batch_id) = match self.validate(Some(batch_id), cancel).await {
            Ok(found) => found,
            Err(state) => return state,
        };

        // The exact key pins extraction to this run's validation batch
        self.extract(
            ExtractionSelection {
                timestamp: Some(validation_key),
                batch_id: Some(batch_id),
                resume_dir: None,
            },
            cancel,
        )
        .await
    }

    async fn discover(&mut self, cancel: &CancellationToken) -> Result<(String, BatchId), PipelineState> {
        self.transition(PipelineState::Discovering);
        if cancel.is_cancelled() {
            return Err(self.abort(Stage::Discovery, PipelineError::Cancelled));
        }

        let sites = match self.sites.load_sites() {
            Ok(sites) if sites.is_empty() => {
                return Err(self.abort(
                    Stage::Discovery,
                    PipelineError::EmptyUpstreamResult("no monitored sites configured".into()),
                ))
            }
            Ok(sites) => sites,
            Err(e) => return Err(self.abort(Stage::Discovery, e)),
        };

        match self.discovery.discover(&sites, cancel).await {
            Ok(Some(outcome)) => Ok((outcome.key, outcome.batch_id)),
            Ok(None) => Err(self.abort(
                Stage::Discovery,
                PipelineError::EmptyUpstreamResult("no new links found".into()),
            )),
            Err(e) => Err(self.abort(Stage::Discovery, e)),
        }
    }

    async fn validate(
        &mut self,
        batch_id: Option<BatchId>,
        cancel: &CancellationToken,
    ) -> Result<(String, BatchId), PipelineState> {
        self.transition(PipelineState::Validating {
            batch_id: batch_id.clone(),
        });
        if cancel.is_cancelled() {
            return Err(self.abort(Stage::Validation, PipelineError::Cancelled));
        }

        match self.validation.validate(batch_id.as_ref(), cancel).await {
            Ok(outcome) if outcome.batch.record_count() == 0 => Err(self.abort(
                Stage::Validation,
                PipelineError::EmptyUpstreamResult(format!(
                    "no links could be scored for {}",
                    outcome.batch.batch_id
                )),
            )),
            Ok(outcome) => Ok((outcome.key, outcome.batch.batch_id)),
            Err(e) => Err(self.abort(Stage::Validation, e)),
        }
    }

    async fn extract(
        &mut self,
        selection: ExtractionSelection,
        cancel: &CancellationToken,
    ) -> PipelineState {
        self.transition(PipelineState::Extracting {
            selection: selection.clone(),
        });
        if cancel.is_cancelled() {
            return self.abort(Stage::Extraction, PipelineError::Cancelled);
        }

        match self.extraction.extract(&selection, cancel).await {
            Ok(batch) => self.finish(PipelineState::Done {
                output: RunOutput::Extracted {
                    results_dir: batch.results_dir,
                },
            }),
            Err(e) => self.abort(Stage::Extraction, e),
        }
    }
}
