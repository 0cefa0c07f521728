//! News Pipeline
//!
//! Watches a list of news homepages and turns what appears on them into
//! extracted articles, in three stages:
//!
//! 1. **Discovery** - enumerate each homepage's links and keep the ones not
//!    seen before, as a discovery batch with a fresh batch id
//! 2. **Validation** - ask a language model whether each new link is an
//!    on-topic article, as a validation batch carrying the same batch id
//! 3. **Extraction** - fetch markdown and structured article fields for
//!    every link that passed, checkpointing after each URL
//!
//! Stages communicate only through JSON stores keyed by run timestamp, so
//! each one can run on its own against any earlier batch.
//!
//! # Usage
//!
//! ```rust,ignore
//! use news_pipeline::{PipelineOrchestrator, RunPlan, Stores};
//! use news_pipeline::testing::{collaborators, test_settings, MockClock, MockFetcher, MockMapper, MockScorer};
//!
//! let stores = Arc::new(Stores::open(data_dir)?);
//! let deps = collaborators(mapper, fetcher, scorer, sites, clock);
//! let mut pipeline = PipelineOrchestrator::new(deps, stores, test_settings(), results_dir);
//!
//! let state = pipeline.run(RunPlan::Full { batch_id: None }, &cancel).await;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Seams to the outside world (LinkMapper, PageFetcher, Scorer, ...)
//! - [`types`] - Batch records and their persisted shapes
//! - [`stores`] - JSON batch stores and the link history
//! - [`pipeline`] - The three stages and the orchestrator
//! - [`adapters`] - Firecrawl, OpenAI-compatible scorer, rate limiting
//! - [`retry`] - Shared retry and backoff policy
//! - [`testing`] - Mock implementations for testing

pub mod adapters;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod retry;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use config::{ApiCredentials, Config, PipelineSettings};
pub use error::{PipelineError, StoreError};
pub use retry::{CallError, CallResult, RetryError, RetryPolicy};
pub use traits::{
    Clock, LinkMapper, MapConfig, PageFetcher, Row, RowWriter, Scorer, SiteSource, SystemClock,
};
pub use types::{
    batch::{
        BatchId, DiscoveryBatch, SiteDiscovery, SiteValidation, ValidatedLink, ValidationBatch,
        ValidationRecord,
    },
    extraction::{
        ArticleFields, ExtractionBatch, ExtractionCandidate, ExtractionResult, ExtractionStatus,
        Provenance, RawPage,
    },
    site::MonitoredSite,
};

// Re-export pipeline components
pub use pipeline::{
    Collaborators, ContentExtraction, ExtractionSelection, LinkDiscovery, LinkValidation,
    PipelineOrchestrator, PipelineState, RunOutput, RunPlan, Stage,
};

// Re-export stores
pub use stores::{CollisionPolicy, JsonBatchStore, LinkHistory, Stores};

// Re-export adapters
pub use adapters::{create_collaborators, FirecrawlAdapter, OpenAIScorer};

// Re-export testing utilities
pub use testing::{MockClock, MockFetcher, MockMapper, MockScorer};
