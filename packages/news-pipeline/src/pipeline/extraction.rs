//! Content extraction for validated links.
//!
//! Every URL gets two independent fetches: markdown plus metadata, then
//! schema-constrained fields. A timeout on either one costs only the fields:
//! after a cooldown the markdown is fetched again and the result is recorded
//! as a partial success.
//!
//! The accumulated result map is checkpointed atomically after every URL, so
//! an interrupted run keeps everything it finished and can be resumed from
//! its results directory.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::prompts::extraction_prompt;
use super::report::{extracted_only, table_rows};
use super::{pause, Collaborators};
use crate::config::PipelineSettings;
use crate::error::{PipelineError, Result, StoreError};
use crate::retry::RetryError;
use crate::stores::{read_json, write_json_atomic, StoredBatch, Stores};
use crate::traits::{Clock, PageFetcher, RowWriter};
use crate::types::batch::{BatchId, ValidationBatch};
use crate::types::extraction::{
    ArticleFields, ExtractionArtifacts, ExtractionBatch, ExtractionCandidate, ExtractionResult,
    ExtractionStatus, RawPage,
};

pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Which validation batch to extract, and where to write.
///
/// An explicit timestamp wins over a batch id; with neither, the most recent
/// validation batch is used.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionSelection {
    pub timestamp: Option<String>,
    pub batch_id: Option<BatchId>,
    /// Continue a previous run in this results directory
    pub resume_dir: Option<PathBuf>,
}

pub struct ContentExtraction {
    fetcher: Arc<dyn PageFetcher>,
    rows: Arc<dyn RowWriter>,
    clock: Arc<dyn Clock>,
    stores: Arc<Stores>,
    settings: PipelineSettings,
    results_root: PathBuf,
}

impl ContentExtraction {
    pub fn new(
        collaborators: &Collaborators,
        stores: Arc<Stores>,
        settings: PipelineSettings,
        results_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher: Arc::clone(&collaborators.fetcher),
            rows: Arc::clone(&collaborators.rows),
            clock: Arc::clone(&collaborators.clock),
            stores,
            settings,
            results_root: results_root.into(),
        }
    }

    /// Resolve the validation batch named by `selection`.
    pub fn resolve(&self, selection: &ExtractionSelection) -> Result<StoredBatch<ValidationBatch>> {
        let store = &self.stores.validation;

        if let Some(ts) = &selection.timestamp {
            if let Some(batch) = store.get(ts)? {
                return Ok(StoredBatch {
                    key: ts.clone(),
                    batch,
                });
            }
            warn!(timestamp = %ts, "No validation batch at timestamp, falling back");
        }

        let found = match &selection.batch_id {
            Some(id) => store.scan_by_correlation_id(id)?,
            None => store.latest()?,
        };

        found.ok_or_else(|| match (&selection.batch_id, &selection.timestamp) {
            (Some(id), _) => PipelineError::missing_batch(id.as_str()),
            (None, Some(ts)) => PipelineError::missing_batch(ts.as_str()),
            (None, None) => PipelineError::missing_batch("latest validation batch"),
        })
    }

    /// Validated links at or above the score threshold, first occurrence wins.
    pub fn load_candidates(&self, selection: &ExtractionSelection) -> Result<Vec<ExtractionCandidate>> {
        let StoredBatch { key, batch } = self.resolve(selection)?;
        let min_score = self.settings.min_valid_score;

        let mut seen = HashSet::new();
        let candidates: Vec<_> = batch
            .results
            .values()
            .flat_map(|site| {
                site.validated_links
                    .iter()
                    .filter(move |link| link.validation.passes(min_score))
                    .map(move |link| ExtractionCandidate {
                        url: link.url.clone(),
                        source: site.source.clone(),
                        note: site.note.clone(),
                        score: link.validation.score,
                        reason: link.validation.reason.clone(),
                    })
            })
            .filter(|c| seen.insert(c.url.clone()))
            .collect();

        info!(
            key = %key,
            batch_id = %batch.batch_id,
            candidates = candidates.len(),
            min_score,
            "Loaded validated links"
        );

        if candidates.is_empty() {
            return Err(PipelineError::EmptyUpstreamResult(format!(
                "no valid links scored {} or above in {}",
                min_score, key
            )));
        }
        Ok(candidates)
    }

    /// Extract every candidate of the selected batch.
    pub async fn extract(
        &self,
        selection: &ExtractionSelection,
        cancel: &CancellationToken,
    ) -> Result<ExtractionBatch> {
        let candidates = self.load_candidates(selection)?;

        let results_dir = match &selection.resume_dir {
            Some(dir) => dir.clone(),
            None => self.results_root.join(format!(
                "extracted_content_{}",
                self.clock.now().format("%Y%m%d_%H%M%S")
            )),
        };
        fs::create_dir_all(&results_dir).map_err(|e| StoreError::io(&results_dir, e))?;

        let checkpoint = results_dir.join(CHECKPOINT_FILE);
        let mut results: IndexMap<String, ExtractionResult> =
            read_json(&checkpoint)?.unwrap_or_default();

        let total = candidates.len();
        let pending: Vec<_> = candidates
            .into_iter()
            .filter(|c| !results.contains_key(&c.url))
            .collect();

        info!(
            dir = %results_dir.display(),
            total,
            already_done = total - pending.len(),
            pending = pending.len(),
            "Starting extraction"
        );

        for (i, candidate) in pending.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let result = self.extract_one(candidate, cancel).await?;
            info!(
                url = %candidate.url,
                status = result.status.label(),
                done = results.len() + 1,
                total,
                "Extracted"
            );
            results.insert(candidate.url.clone(), result);

            write_json_atomic(&checkpoint, &results)?;
            self.rows.write_rows(
                &results_dir.join(format!(
                    "content_interim_results_{}_of_{}",
                    results.len(),
                    total
                )),
                &table_rows(&results),
            )?;

            let processed = i + 1;
            if processed % self.settings.batch_size.max(1) == 0 && processed < pending.len() {
                info!(
                    processed,
                    wait_secs = self.settings.batch_pause.as_secs(),
                    "Batch pause"
                );
                pause(self.settings.batch_pause, cancel).await?;
            }
        }

        let artifacts = self.finalize(&results_dir, &results)?;
        let batch = ExtractionBatch {
            results_dir,
            results,
            artifacts,
        };
        info!(
            dir = %batch.results_dir.display(),
            success = batch.count(|s| *s == ExtractionStatus::Success),
            partial = batch.count(|s| *s == ExtractionStatus::PartialSuccess),
            failed = batch.count(ExtractionStatus::is_failed),
            "Extraction finished"
        );

        Ok(batch)
    }

    /// Only cancellation is an error; fetch failures become failed results.
    async fn extract_one(
        &self,
        candidate: &ExtractionCandidate,
        cancel: &CancellationToken,
    ) -> Result<ExtractionResult> {
        let url = candidate.url.as_str();
        let provenance = candidate.provenance();

        let raw = match self.fetch_raw(url).await {
            Ok(raw) => raw,
            Err(e) if e.is_timeout() => return self.markdown_only(candidate, cancel).await,
            Err(e) => {
                warn!(url, error = %e, "Markdown fetch failed");
                return Ok(ExtractionResult::failed(url, provenance, e.to_string()));
            }
        };

        let schema = ArticleFields::schema();
        let prompt = extraction_prompt(&self.settings.topic);
        let structured = self
            .settings
            .retry
            .call("fetch_structured", || {
                self.fetcher.fetch_structured(url, &schema, &prompt)
            })
            .await;

        match structured {
            Ok(fields) => Ok(ExtractionResult {
                url: url.to_string(),
                status: ExtractionStatus::Success,
                markdown: raw.markdown,
                structured_fields: ArticleFields::from_json(&fields),
                metadata: raw.metadata,
                provenance,
            }),
            Err(e) if e.is_timeout() => self.markdown_only(candidate, cancel).await,
            Err(e) => {
                warn!(url, error = %e, "Structured fetch failed");
                Ok(ExtractionResult::failed(url, provenance, e.to_string()))
            }
        }
    }

    /// Cool down, fetch markdown again and keep it without fields.
    async fn markdown_only(
        &self,
        candidate: &ExtractionCandidate,
        cancel: &CancellationToken,
    ) -> Result<ExtractionResult> {
        let url = candidate.url.as_str();
        warn!(
            url,
            cooldown_secs = self.settings.extraction_cooldown.as_secs(),
            "Fetch timed out, retrying markdown only"
        );
        pause(self.settings.extraction_cooldown, cancel).await?;

        Ok(match self.fetch_raw(url).await {
            Ok(raw) => ExtractionResult {
                url: url.to_string(),
                status: ExtractionStatus::PartialSuccess,
                markdown: raw.markdown,
                structured_fields: ArticleFields::default(),
                metadata: raw.metadata,
                provenance: candidate.provenance(),
            },
            Err(e) => {
                warn!(url, error = %e, "Markdown retry failed");
                ExtractionResult::failed(url, candidate.provenance(), e.to_string())
            }
        })
    }

    async fn fetch_raw(&self, url: &str) -> std::result::Result<RawPage, RetryError> {
        self.settings
            .retry
            .call("fetch_raw", || self.fetcher.fetch_raw(url))
            .await
    }

    fn finalize(
        &self,
        dir: &Path,
        results: &IndexMap<String, ExtractionResult>,
    ) -> Result<ExtractionArtifacts> {
        let ts = self.clock.now().format("%Y%m%d_%H%M%S").to_string();

        let full_results = dir.join(format!("content_full_results_{}.json", ts));
        write_json_atomic(&full_results, results)?;

        let extracted_data = dir.join(format!("content_extracted_data_{}.json", ts));
        write_json_atomic(&extracted_data, &extracted_only(results))?;

        let table = self.rows.write_rows(
            &dir.join(format!("content_final_results_{}", ts)),
            &table_rows(results),
        )?;

        debug!(
            full = %full_results.display(),
            extracted = %extracted_data.display(),
            table = %table.display(),
            "Wrote final artifacts"
        );

        Ok(ExtractionArtifacts {
            full_results,
            extracted_data,
            table,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::CallError;
    use crate::testing::{
        collaborators, test_settings, MockClock, MockFetchCall, MockFetcher, MockMapper,
        MockScorer,
    };
    use crate::types::batch::{SiteValidation, ValidatedLink, ValidationRecord};
    use tempfile::TempDir;

    const KEY: &str = "2024-05-01 10:05:00";
    const A: &str = "https://farm.example/2024/05/01/wheat";
    const B: &str = "https://farm.example/2024/05/01/corn";
    const C: &str = "https://farm.example/2024/05/01/soy";

    fn link(url: &str, score: u8, is_valid: bool) -> ValidatedLink {
        ValidatedLink {
            url: url.into(),
            validation: ValidationRecord::new(score, is_valid, "test"),
        }
    }

    fn seed(stores: &Stores, key: &str, batch_id: &str, links: Vec<ValidatedLink>) {
        let mut results = IndexMap::new();
        results.insert(
            "https://farm.example".to_string(),
            SiteValidation {
                note: "daily".into(),
                source: "Farm News".into(),
                validated_links: links,
                original_timestamp: "2024-05-01 10:00:00".into(),
            },
        );
        let batch = ValidationBatch {
            batch_id: BatchId::new(batch_id),
            timestamp: key.into(),
            results,
        };
        stores.validation.put(key, batch).unwrap();
    }

    fn stage(dir: &TempDir, fetcher: Arc<MockFetcher>) -> (ContentExtraction, Arc<Stores>) {
        stage_with(dir, fetcher, test_settings())
    }

    fn stage_with(
        dir: &TempDir,
        fetcher: Arc<MockFetcher>,
        settings: PipelineSettings,
    ) -> (ContentExtraction, Arc<Stores>) {
        let stores = Arc::new(Stores::open(&dir.path().join("data")).unwrap());
        let deps = collaborators(
            Arc::new(MockMapper::new()),
            fetcher,
            Arc::new(MockScorer::new()),
            Vec::new(),
            Arc::new(MockClock::at(2024, 5, 1, 10, 10, 0)),
        );
        let extraction = ContentExtraction::new(
            &deps,
            Arc::clone(&stores),
            settings,
            dir.path().join("results"),
        );
        (extraction, stores)
    }

    #[tokio::test]
    async fn test_only_passing_links_are_candidates() {
        let dir = TempDir::new().unwrap();
        let (extraction, stores) = stage(&dir, Arc::new(MockFetcher::new()));
        seed(
            &stores,
            KEY,
            "batch_20240501100000",
            vec![
                link(A, 85, true),
                link(B, 40, false),
                link(C, 72, true),
                link("https://farm.example/high-but-invalid", 95, false),
                link(A, 90, true),
            ],
        );

        let urls: Vec<_> = extraction
            .load_candidates(&ExtractionSelection::default())
            .unwrap()
            .into_iter()
            .map(|c| c.url)
            .collect();
        assert_eq!(urls, vec![A.to_string(), C.to_string()]);
    }

    #[tokio::test]
    async fn test_no_passing_links_is_empty_upstream() {
        let dir = TempDir::new().unwrap();
        let (extraction, stores) = stage(&dir, Arc::new(MockFetcher::new()));
        seed(&stores, KEY, "batch_1", vec![link(B, 40, false)]);

        let err = extraction
            .extract(&ExtractionSelection::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyUpstreamResult(_)));
    }

    #[tokio::test]
    async fn test_resolve_precedence() {
        let dir = TempDir::new().unwrap();
        let (extraction, stores) = stage(&dir, Arc::new(MockFetcher::new()));
        seed(&stores, "2024-05-01 09:00:00", "batch_early", vec![link(A, 90, true)]);
        seed(&stores, "2024-05-01 11:00:00", "batch_late", vec![link(C, 90, true)]);

        let by_ts = extraction
            .resolve(&ExtractionSelection {
                timestamp: Some("2024-05-01 09:00:00".into()),
                batch_id: Some(BatchId::new("batch_late")),
                resume_dir: None,
            })
            .unwrap();
        assert_eq!(by_ts.batch.batch_id, BatchId::new("batch_early"));

        let unknown_ts = extraction
            .resolve(&ExtractionSelection {
                timestamp: Some("1999-01-01 00:00:00".into()),
                batch_id: Some(BatchId::new("batch_early")),
                resume_dir: None,
            })
            .unwrap();
        assert_eq!(unknown_ts.key, "2024-05-01 09:00:00");

        let latest = extraction.resolve(&ExtractionSelection::default()).unwrap();
        assert_eq!(latest.key, "2024-05-01 11:00:00");

        let missing = extraction.resolve(&ExtractionSelection {
            batch_id: Some(BatchId::new("batch_nope")),
            ..Default::default()
        });
        assert!(matches!(
            missing,
            Err(PipelineError::MissingBatchReference { .. })
        ));
    }

    #[tokio::test]
    async fn test_structured_timeout_keeps_markdown() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_page(A, "# Wheat prices climb", &[("title", serde_json::json!("Wheat"))])
                .structured_error(A, CallError::Timeout("scrape timed out".into()))
                .structured_error(A, CallError::Timeout("scrape timed out".into())),
        );
        let (extraction, stores) = stage(&dir, Arc::clone(&fetcher));
        seed(&stores, KEY, "batch_1", vec![link(A, 90, true)]);

        let batch = extraction
            .extract(&ExtractionSelection::default(), &CancellationToken::new())
            .await
            .unwrap();

        let result = &batch.results[A];
        assert_eq!(result.status, ExtractionStatus::PartialSuccess);
        assert_eq!(result.markdown, "# Wheat prices climb");
        assert_eq!(result.structured_fields, ArticleFields::default());
        assert_eq!(fetcher.raw_calls(A), 2);
    }

    #[tokio::test]
    async fn test_interrupt_during_cooldown_stops_at_once() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let fetcher = Arc::new(
            MockFetcher::new()
                .structured_error(A, CallError::Timeout("scrape timed out".into()))
                .structured_error(A, CallError::Timeout("scrape timed out".into()))
                .cancel_after_raw(1, cancel.clone()),
        );
        let settings = PipelineSettings {
            extraction_cooldown: std::time::Duration::from_secs(3600),
            ..test_settings()
        };
        let (extraction, stores) = stage_with(&dir, Arc::clone(&fetcher), settings);
        seed(&stores, KEY, "batch_1", vec![link(A, 90, true), link(C, 90, true)]);

        let err = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            extraction.extract(&ExtractionSelection::default(), &cancel),
        )
        .await
        .expect("cooldown ignored the interrupt")
        .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));

        // The timed-out URL is left unrecorded so a resume retries it
        assert_eq!(fetcher.raw_calls(A), 1);
        assert_eq!(fetcher.raw_calls(C), 0);
        let checkpoint = dir
            .path()
            .join("results/extracted_content_20240501_101000")
            .join(CHECKPOINT_FILE);
        assert!(!checkpoint.exists());
    }

    #[tokio::test]
    async fn test_fatal_fetch_fails_only_that_url() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            MockFetcher::new()
                .raw_error(A, CallError::Fatal("404 not found".into()))
                .with_fields(C, serde_json::json!({"title": "Soy exports", "author": "J. Doe"})),
        );
        let (extraction, stores) = stage(&dir, Arc::clone(&fetcher));
        seed(&stores, KEY, "batch_1", vec![link(A, 90, true), link(C, 80, true)]);

        let batch = extraction
            .extract(&ExtractionSelection::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(batch.results[A].status.is_failed());
        assert_eq!(batch.results[C].status, ExtractionStatus::Success);
        assert_eq!(
            batch.results[C].structured_fields.author.as_deref(),
            Some("J. Doe")
        );
        assert_eq!(batch.results[C].provenance.validation_score, 80);
        assert!(!fetcher
            .calls()
            .contains(&MockFetchCall::Structured { url: A.into() }));

        let extracted: IndexMap<String, serde_json::Value> =
            read_json(&batch.artifacts.extracted_data).unwrap().unwrap();
        assert_eq!(extracted.keys().collect::<Vec<_>>(), vec![C]);
        assert!(batch.artifacts.table.exists());
        assert!(batch.artifacts.full_results.exists());
    }

    #[tokio::test]
    async fn test_interrupted_run_resumes_from_checkpoint() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let first = Arc::new(MockFetcher::new().cancel_after_raw(1, cancel.clone()));
        let (extraction, stores) = stage(&dir, first);
        seed(
            &stores,
            KEY,
            "batch_1",
            vec![link(A, 90, true), link(B, 90, true), link(C, 90, true)],
        );

        let err = extraction
            .extract(&ExtractionSelection::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));

        let results_dir = dir.path().join("results/extracted_content_20240501_101000");
        let saved: IndexMap<String, ExtractionResult> =
            read_json(&results_dir.join(CHECKPOINT_FILE)).unwrap().unwrap();
        assert_eq!(saved.keys().collect::<Vec<_>>(), vec![A]);
        assert!(results_dir
            .join("content_interim_results_1_of_3.json")
            .exists());

        let second = Arc::new(MockFetcher::new());
        let (extraction, _) = stage(&dir, Arc::clone(&second));
        let batch = extraction
            .extract(
                &ExtractionSelection {
                    resume_dir: Some(results_dir.clone()),
                    ..Default::default()
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(batch.results_dir, results_dir);
        assert_eq!(batch.results.keys().collect::<Vec<_>>(), vec![A, B, C]);
        assert_eq!(second.raw_calls(A), 0);
        assert_eq!(second.raw_calls(B), 1);
    }
}
