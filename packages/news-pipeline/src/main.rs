//! News pipeline CLI
//!
//! Runs the whole pipeline, or one stage of it, against the configured
//! homepages. Stage outcomes are logged; only argument and configuration
//! errors exit non-zero. With `--interval` it keeps monitoring until
//! interrupted.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use news_pipeline::{
    create_collaborators, BatchId, Config, ExtractionSelection, PipelineOrchestrator,
    PipelineState, RunPlan, Stores,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "news-pipeline")]
#[command(about = "Discover, validate and extract new articles from monitored homepages")]
struct Cli {
    /// Run a single stage: 1 discovery, 2 validation, 3 extraction
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=3), conflicts_with = "all")]
    step: Option<u8>,

    /// Batch id to validate or extract; skips discovery in a full run
    #[arg(long)]
    batch: Option<String>,

    /// Exact validation timestamp to extract (step 3)
    #[arg(long)]
    timestamp: Option<String>,

    /// Continue an interrupted extraction in this results directory (step 3)
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Run every stage (the default without --step)
    #[arg(long)]
    all: bool,

    /// Repeat the run every MINUTES until interrupted (full run or step 1)
    #[arg(long, value_name = "MINUTES", value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,
}

impl Cli {
    fn plan(&self) -> RunPlan {
        let batch_id = self.batch.as_deref().map(BatchId::from);

        if self.step != Some(3) && (self.timestamp.is_some() || self.resume.is_some()) {
            tracing::warn!("--timestamp and --resume only apply to --step 3, ignoring");
        }

        match self.step {
            Some(1) => {
                if batch_id.is_some() {
                    tracing::warn!("--batch does not apply to discovery, ignoring");
                }
                RunPlan::Discover
            }
            Some(2) => RunPlan::Validate { batch_id },
            Some(3) => RunPlan::Extract(ExtractionSelection {
                timestamp: self.timestamp.clone(),
                batch_id,
                resume_dir: self.resume.clone(),
            }),
            _ => RunPlan::Full { batch_id },
        }
    }

    fn interval(&self) -> Result<Option<Duration>> {
        match (self.interval, self.step) {
            (Some(_), Some(step @ (2 | 3))) => {
                bail!("--interval only repeats a full run or --step 1, not --step {step}")
            }
            (Some(minutes), _) => Ok(Some(Duration::from_secs(minutes * 60))),
            (None, _) => Ok(None),
        }
    }
}

/// Open `path` for appending, creating missing parent directories.
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,news_pipeline=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let interval = cli.interval()?;

    let config = Config::from_env().context("Failed to load configuration")?;
    init_logging(config.log_file.as_deref())?;
    tracing::info!(
        sites = %config.sites_file.display(),
        data = %config.data_dir.display(),
        results = %config.results_dir.display(),
        "Starting news pipeline"
    );

    let stores = Arc::new(
        Stores::open(&config.data_dir)
            .with_context(|| format!("Failed to open stores in {}", config.data_dir.display()))?,
    );
    let collaborators = create_collaborators(&config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current item");
            on_signal.cancel();
        }
    });

    let mut orchestrator = PipelineOrchestrator::new(
        collaborators,
        stores,
        config.settings.clone(),
        config.results_dir.clone(),
    );

    let plan = cli.plan();
    if let Some(every) = interval {
        tracing::info!(interval_mins = every.as_secs() / 60, "Monitoring, Ctrl-C to stop");
        let ends = orchestrator.run_every(plan, every, &cancel).await;
        let done = ends
            .iter()
            .filter(|s| matches!(s, PipelineState::Done { .. }))
            .count();
        tracing::info!(runs = ends.len(), done, "Monitoring finished");
        return Ok(());
    }

    match orchestrator.run(plan, &cancel).await {
        PipelineState::Done { output } => tracing::info!(%output, "Done"),
        PipelineState::Aborted { stage, reason } => {
            tracing::warn!(%stage, %reason, "Pipeline stopped")
        }
        other => tracing::debug!(state = ?other, "Pipeline ended"),
    }

    Ok(())
}
