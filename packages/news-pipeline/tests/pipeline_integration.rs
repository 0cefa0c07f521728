//! Integration tests for the full pipeline.
//!
//! These run every stage against mocks and real JSON stores in a temp dir:
//! 1. Discover new links on the monitored homepages
//! 2. Score them
//! 3. Extract the ones that passed

use std::sync::Arc;

use news_pipeline::{
    testing::{collaborators, test_settings, verdict},
    BatchId, CallError, ExtractionSelection, ExtractionStatus, MockClock, MockFetcher, MockMapper,
    MockScorer, MonitoredSite, PipelineOrchestrator, PipelineState, RunOutput, RunPlan, Stage,
    Stores,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const HOME: &str = "https://farm.example";
const OTHER: &str = "https://ranch.example";
const L1: &str = "https://farm.example/2024/05/01/wheat-harvest";
const L2: &str = "https://farm.example/about-us";
const L3: &str = "https://farm.example/2024/05/01/fertilizer-prices";

struct Harness {
    dir: TempDir,
    stores: Arc<Stores>,
    mapper: Arc<MockMapper>,
    fetcher: Arc<MockFetcher>,
    scorer: Arc<MockScorer>,
    clock: Arc<MockClock>,
    sites: Vec<MonitoredSite>,
}

impl Harness {
    fn new(mapper: MockMapper, scorer: MockScorer) -> Self {
        let dir = TempDir::new().unwrap();
        let stores = Arc::new(Stores::open(&dir.path().join("data")).unwrap());
        Self {
            dir,
            stores,
            mapper: Arc::new(mapper),
            fetcher: Arc::new(MockFetcher::new()),
            scorer: Arc::new(scorer),
            clock: Arc::new(MockClock::at(2024, 5, 1, 10, 0, 0)),
            sites: vec![MonitoredSite::new(HOME)
                .with_note("daily")
                .with_source("Farm News")],
        }
    }

    fn with_sites(mut self, sites: Vec<MonitoredSite>) -> Self {
        self.sites = sites;
        self
    }

    async fn run(&self, plan: RunPlan) -> PipelineState {
        let deps = collaborators(
            Arc::clone(&self.mapper),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.scorer),
            self.sites.clone(),
            Arc::clone(&self.clock),
        );
        let mut orchestrator = PipelineOrchestrator::new(
            deps,
            Arc::clone(&self.stores),
            test_settings(),
            self.dir.path().join("results"),
        );
        orchestrator.run(plan, &CancellationToken::new()).await
    }
}

fn standard_scorer() -> MockScorer {
    MockScorer::new()
        .with_response(L1, verdict(90, true, "dated harvest report"))
        .with_response(L2, verdict(30, false, "company page"))
        .with_response(L3, format!("Here you go: {}", verdict(75, true, "market news")))
}

fn discovered(state: &PipelineState) -> BatchId {
    match state {
        PipelineState::Done {
            output: RunOutput::Discovered { batch_id, .. },
        } => batch_id.clone(),
        other => panic!("expected a discovery batch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_full_run_extracts_only_valid_links() {
    let mapper = MockMapper::new().with_links(
        HOME,
        &[HOME, L1, L2, "https://farm.example/tag/wheat", L3, L1],
    );
    let h = Harness::new(mapper, standard_scorer());

    let state = h.run(RunPlan::Full { batch_id: None }).await;
    let results_dir = match state {
        PipelineState::Done {
            output: RunOutput::Extracted { results_dir },
        } => results_dir,
        other => panic!("expected extraction output, got {:?}", other),
    };

    // Discovery batch keeps order and drops self/excluded/duplicate links
    let discovery = h.stores.discovery.latest().unwrap().unwrap();
    assert_eq!(discovery.batch.sites[HOME].new_links, vec![L1, L2, L3]);
    let batch_id = discovery.batch.batch_id().cloned().unwrap();
    assert_eq!(batch_id, BatchId::new("batch_20240501100002"));

    // Validation carries the same batch id and points back at discovery
    let validation = h.stores.validation.latest().unwrap().unwrap();
    assert_eq!(validation.batch.batch_id, batch_id);
    let site = &validation.batch.results[HOME];
    assert_eq!(site.original_timestamp, discovery.key);
    let scores: Vec<_> = site
        .validated_links
        .iter()
        .map(|l| (l.url.as_str(), l.validation.score, l.validation.is_valid))
        .collect();
    assert_eq!(scores, vec![(L1, 90, true), (L2, 30, false), (L3, 75, true)]);

    // Only the valid links were fetched
    assert_eq!(h.fetcher.raw_calls(L1), 1);
    assert_eq!(h.fetcher.raw_calls(L2), 0);
    assert_eq!(h.fetcher.raw_calls(L3), 1);

    let full: indexmap::IndexMap<String, serde_json::Value> =
        news_pipeline::stores::read_json(&results_dir.join("checkpoint.json"))
            .unwrap()
            .unwrap();
    assert_eq!(full.keys().collect::<Vec<_>>(), vec![L1, L3]);

    // Every enumerated link is now history
    assert_eq!(h.stores.history.known_count(HOME), 3);
}

#[tokio::test]
async fn test_rerun_with_nothing_new_aborts_without_writing() {
    let mapper = MockMapper::new().with_links(HOME, &[L1, L3]);
    let h = Harness::new(mapper, standard_scorer());

    discovered(&h.run(RunPlan::Discover).await);
    let second = h.run(RunPlan::Discover).await;

    assert!(matches!(
        second,
        PipelineState::Aborted {
            stage: Stage::Discovery,
            ..
        }
    ));
    assert_eq!(h.stores.discovery.keys().unwrap().len(), 1);
    assert_eq!(h.mapper.calls().len(), 2);
}

#[tokio::test]
async fn test_history_only_grows() {
    let mapper = MockMapper::new().with_links(HOME, &[L1, L2]);
    let h = Harness::new(mapper, standard_scorer());

    discovered(&h.run(RunPlan::Discover).await);

    // L1 disappears from the homepage, L3 shows up
    h.mapper.set_links(HOME, &[L2, L3]);
    discovered(&h.run(RunPlan::Discover).await);

    let latest = h.stores.discovery.latest().unwrap().unwrap();
    assert_eq!(latest.batch.sites[HOME].new_links, vec![L3]);

    let known = h.stores.history.snapshot(HOME);
    assert!(known.contains(L1));
    assert!(known.contains(L2));
    assert!(known.contains(L3));
}

#[tokio::test]
async fn test_validation_follows_requested_batch() {
    let mapper = MockMapper::new().with_links(HOME, &[L1]);
    let h = Harness::new(mapper, standard_scorer());

    let first = discovered(&h.run(RunPlan::Discover).await);
    h.mapper.set_links(HOME, &[L1, L3]);
    let second = discovered(&h.run(RunPlan::Discover).await);
    assert_ne!(first, second);

    let state = h
        .run(RunPlan::Validate {
            batch_id: Some(first.clone()),
        })
        .await;
    assert!(matches!(
        state,
        PipelineState::Done {
            output: RunOutput::Validated { ref batch_id, .. }
        } if *batch_id == first
    ));

    let first_key = h
        .stores
        .discovery
        .scan_by_correlation_id(&first)
        .unwrap()
        .unwrap()
        .key;
    let validation = h.stores.validation.latest().unwrap().unwrap();
    assert_eq!(validation.batch.batch_id, first);
    assert_eq!(validation.batch.results[HOME].original_timestamp, first_key);
    assert_eq!(validation.batch.record_count(), 1);
}

#[tokio::test]
async fn test_extraction_by_batch_id_applies_threshold() {
    let a = "https://farm.example/news/a";
    let b = "https://farm.example/news/b";
    let c = "https://farm.example/news/c";
    let mapper = MockMapper::new().with_links(HOME, &[a, b, c]);
    let scorer = MockScorer::new()
        .with_response(a, verdict(85, true, "article"))
        .with_response(b, verdict(40, false, "listing"))
        .with_response(c, verdict(72, true, "article"));
    let h = Harness::new(mapper, scorer);

    let batch_id = discovered(&h.run(RunPlan::Discover).await);
    h.run(RunPlan::Validate { batch_id: None }).await;

    let state = h
        .run(RunPlan::Extract(ExtractionSelection {
            batch_id: Some(batch_id),
            ..Default::default()
        }))
        .await;
    assert!(matches!(state, PipelineState::Done { .. }));

    assert_eq!(h.fetcher.raw_calls(a), 1);
    assert_eq!(h.fetcher.raw_calls(b), 0);
    assert_eq!(h.fetcher.raw_calls(c), 1);
}

#[tokio::test]
async fn test_rate_limit_exhaustion_reads_as_no_links() {
    let mapper = MockMapper::new().with_links(HOME, &[L1]);
    for _ in 0..4 {
        mapper.push_response(HOME, Err(CallError::rate_limited("Rate limit exceeded")));
    }
    let h = Harness::new(mapper, standard_scorer());

    let state = h.run(RunPlan::Discover).await;

    assert!(matches!(state, PipelineState::Aborted { .. }));
    assert_eq!(h.mapper.calls().len(), 4);
    assert_eq!(h.stores.history.known_count(HOME), 0);
    assert!(h.stores.discovery.keys().unwrap().is_empty());
}

#[tokio::test]
async fn test_failing_site_does_not_stop_the_others() {
    let ranch = "https://ranch.example/2024/05/01/cattle";
    let mapper = MockMapper::new()
        .fail_url(HOME)
        .with_links(OTHER, &[ranch]);
    let h = Harness::new(mapper, standard_scorer()).with_sites(vec![
        MonitoredSite::new(HOME),
        MonitoredSite::new(OTHER).with_source("Ranch Daily"),
    ]);

    discovered(&h.run(RunPlan::Discover).await);

    let batch = h.stores.discovery.latest().unwrap().unwrap().batch;
    assert_eq!(batch.sites.keys().collect::<Vec<_>>(), vec![OTHER]);
    assert_eq!(batch.sites[OTHER].source, "Ranch Daily");
}

#[tokio::test]
async fn test_unparseable_scores_stop_before_extraction() {
    let mapper = MockMapper::new().with_links(HOME, &[L1, L3]);
    let scorer = MockScorer::new().with_default("Looks like news to me!");
    let h = Harness::new(mapper, scorer);

    let state = h.run(RunPlan::Full { batch_id: None }).await;

    assert!(matches!(
        state,
        PipelineState::Aborted {
            stage: Stage::Extraction,
            ..
        }
    ));
    let validation = h.stores.validation.latest().unwrap().unwrap().batch;
    for link in &validation.results[HOME].validated_links {
        assert_eq!(link.validation.score, 0);
        assert!(!link.validation.is_valid);
        assert_eq!(link.validation.reason, "unparseable");
    }
    assert!(h.fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_given_batch_skips_discovery() {
    let mapper = MockMapper::new().with_links(HOME, &[L1, L2]);
    let h = Harness::new(mapper, standard_scorer());

    let batch_id = discovered(&h.run(RunPlan::Discover).await);
    h.mapper.set_links(HOME, &[L3]);

    let state = h
        .run(RunPlan::Full {
            batch_id: Some(batch_id.clone()),
        })
        .await;

    assert!(matches!(state, PipelineState::Done { .. }));
    assert_eq!(h.mapper.calls().len(), 1);
    assert_eq!(h.stores.discovery.keys().unwrap().len(), 1);
    assert_eq!(h.fetcher.raw_calls(L1), 1);
    assert_eq!(h.fetcher.raw_calls(L3), 0);

    let validation = h.stores.validation.latest().unwrap().unwrap().batch;
    assert_eq!(validation.batch_id, batch_id);
}

#[tokio::test]
async fn test_unknown_batch_aborts_validation() {
    let h = Harness::new(MockMapper::new(), standard_scorer());

    let state = h
        .run(RunPlan::Validate {
            batch_id: Some(BatchId::new("batch_19990101000000")),
        })
        .await;

    match state {
        PipelineState::Aborted { stage, reason } => {
            assert_eq!(stage, Stage::Validation);
            assert!(reason.contains("batch_19990101000000"));
        }
        other => panic!("expected abort, got {:?}", other),
    }
    assert!(h.stores.validation.keys().unwrap().is_empty());
}

#[tokio::test]
async fn test_extraction_results_record_provenance() {
    let mapper = MockMapper::new().with_links(HOME, &[L1]);
    let h = Harness::new(mapper, standard_scorer());

    h.run(RunPlan::Discover).await;
    h.run(RunPlan::Validate { batch_id: None }).await;

    let deps = collaborators(
        Arc::clone(&h.mapper),
        Arc::clone(&h.fetcher),
        Arc::clone(&h.scorer),
        h.sites.clone(),
        Arc::clone(&h.clock),
    );
    let extraction = news_pipeline::ContentExtraction::new(
        &deps,
        Arc::clone(&h.stores),
        test_settings(),
        h.dir.path().join("results"),
    );
    let batch = extraction
        .extract(&ExtractionSelection::default(), &CancellationToken::new())
        .await
        .unwrap();

    let result = &batch.results[L1];
    assert_eq!(result.status, ExtractionStatus::Success);
    assert_eq!(result.provenance.source, "Farm News");
    assert_eq!(result.provenance.note, "daily");
    assert_eq!(result.provenance.validation_score, 90);
    assert_eq!(result.structured_fields.title.as_deref(), Some(L1));
}

#[tokio::test]
async fn test_monitoring_repeats_until_cancelled() {
    let cancel = CancellationToken::new();
    let mapper = MockMapper::new()
        .with_links(HOME, &[L1, L3])
        .cancel_after(2, cancel.clone());
    mapper.push_response(HOME, Ok(vec![L1.to_string()]));
    let h = Harness::new(mapper, standard_scorer());

    let deps = collaborators(
        Arc::clone(&h.mapper),
        Arc::clone(&h.fetcher),
        Arc::clone(&h.scorer),
        h.sites.clone(),
        Arc::clone(&h.clock),
    );
    let mut orchestrator = PipelineOrchestrator::new(
        deps,
        Arc::clone(&h.stores),
        test_settings(),
        h.dir.path().join("results"),
    );

    let ends = orchestrator
        .run_every(RunPlan::Discover, std::time::Duration::ZERO, &cancel)
        .await;

    // Stops after the run during which the interrupt arrived
    assert_eq!(ends.len(), 2);
    assert_eq!(h.mapper.calls().len(), 2);
    let first = discovered(&ends[0]);
    let second = discovered(&ends[1]);
    assert_ne!(first, second);

    // The second pass only reports what the first had not seen
    let latest = h.stores.discovery.latest().unwrap().unwrap();
    assert_eq!(latest.batch.sites[HOME].new_links, vec![L3]);
    assert_eq!(orchestrator.trail().first(), Some(&PipelineState::Idle));
    assert_eq!(orchestrator.trail().len(), 3);
}
