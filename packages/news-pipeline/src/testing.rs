//! Testing utilities including mock implementations.
//!
//! These let the stages run end to end without network calls, sleeps or a
//! real clock.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use indexmap::IndexMap;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::adapters::JsonRowWriter;
use crate::config::PipelineSettings;
use crate::error::Result;
use crate::pipeline::Collaborators;
use crate::retry::{CallError, CallResult, RetryPolicy};
use crate::traits::{Clock, LinkMapper, MapConfig, PageFetcher, Scorer, SiteSource};
use crate::types::extraction::RawPage;
use crate::types::site::MonitoredSite;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Settings with every wait set to zero.
pub fn test_settings() -> PipelineSettings {
    PipelineSettings {
        retry: RetryPolicy::new(3, Duration::ZERO, Duration::ZERO),
        batch_pause: Duration::ZERO,
        site_pacing_jitter: 0..=0,
        batch_size: 2,
        extraction_cooldown: Duration::ZERO,
        ..Default::default()
    }
}

/// A scoring response in the shape the scorer is asked for.
pub fn verdict(score: u8, is_valid: bool, reason: &str) -> String {
    json!({ "score": score, "is_valid": is_valid, "reason": reason }).to_string()
}

/// Wire mocks into a [`Collaborators`] set, writing tables as JSON.
pub fn collaborators(
    mapper: Arc<MockMapper>,
    fetcher: Arc<MockFetcher>,
    scorer: Arc<MockScorer>,
    sites: Vec<MonitoredSite>,
    clock: Arc<MockClock>,
) -> Collaborators {
    Collaborators {
        mapper,
        fetcher,
        scorer,
        sites: Arc::new(StaticSites::new(sites)),
        rows: Arc::new(JsonRowWriter),
        clock,
    }
}

// =============================================================================
// Link mapper
// =============================================================================

/// A mock link mapper.
///
/// Returns the configured links per homepage; queued responses are served
/// first, one per call.
#[derive(Default)]
pub struct MockMapper {
    links: Mutex<HashMap<String, Vec<String>>>,
    queued: Mutex<HashMap<String, VecDeque<CallResult<Vec<String>>>>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl MockMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_links(self, homepage: impl Into<String>, links: &[&str]) -> Self {
        self.set_links(homepage, links);
        self
    }

    /// Change what a homepage links to, e.g. between two runs.
    pub fn set_links(&self, homepage: impl Into<String>, links: &[&str]) {
        lock(&self.links).insert(
            homepage.into(),
            links.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Serve `response` on the next call for `homepage`.
    pub fn push_response(&self, homepage: impl Into<String>, response: CallResult<Vec<String>>) {
        lock(&self.queued)
            .entry(homepage.into())
            .or_default()
            .push_back(response);
    }

    /// Always answer `homepage` with a permanent error.
    pub fn fail_url(self, homepage: impl Into<String>) -> Self {
        lock(&self.failing).insert(homepage.into());
        self
    }

    /// Cancel `token` once `n` map calls have been served.
    pub fn cancel_after(self, n: usize, token: CancellationToken) -> Self {
        *lock(&self.cancel_after) = Some((n, token));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl LinkMapper for MockMapper {
    async fn map_links(&self, url: &str, _config: &MapConfig) -> CallResult<Vec<String>> {
        let served = {
            let mut calls = lock(&self.calls);
            calls.push(url.to_string());
            calls.len()
        };
        if let Some((n, token)) = lock(&self.cancel_after).as_ref() {
            if served >= *n {
                token.cancel();
            }
        }

        if let Some(response) = lock(&self.queued).get_mut(url).and_then(VecDeque::pop_front) {
            return response;
        }
        if lock(&self.failing).contains(url) {
            return Err(CallError::Fatal(format!("mock map failure for {}", url)));
        }
        Ok(lock(&self.links).get(url).cloned().unwrap_or_default())
    }
}

// =============================================================================
// Page fetcher
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFetchCall {
    Raw { url: String },
    Structured { url: String },
}

/// A mock page fetcher.
///
/// Unknown URLs get a generated page and `{"title": url}` as fields. Queued
/// errors are returned first, one per call.
#[derive(Default)]
pub struct MockFetcher {
    pages: Mutex<HashMap<String, RawPage>>,
    fields: Mutex<HashMap<String, Value>>,
    raw_errors: Mutex<HashMap<String, VecDeque<CallError>>>,
    structured_errors: Mutex<HashMap<String, VecDeque<CallError>>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
    calls: Mutex<Vec<MockFetchCall>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: impl Into<String>, markdown: &str, metadata: &[(&str, Value)]) -> Self {
        let metadata: IndexMap<String, Value> = metadata
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        lock(&self.pages).insert(
            url.into(),
            RawPage {
                markdown: markdown.to_string(),
                metadata,
            },
        );
        self
    }

    pub fn with_fields(self, url: impl Into<String>, fields: Value) -> Self {
        lock(&self.fields).insert(url.into(), fields);
        self
    }

    pub fn raw_error(self, url: impl Into<String>, error: CallError) -> Self {
        lock(&self.raw_errors)
            .entry(url.into())
            .or_default()
            .push_back(error);
        self
    }

    pub fn structured_error(self, url: impl Into<String>, error: CallError) -> Self {
        lock(&self.structured_errors)
            .entry(url.into())
            .or_default()
            .push_back(error);
        self
    }

    /// Cancel `token` once `n` raw fetches have been served.
    pub fn cancel_after_raw(self, n: usize, token: CancellationToken) -> Self {
        *lock(&self.cancel_after) = Some((n, token));
        self
    }

    pub fn calls(&self) -> Vec<MockFetchCall> {
        lock(&self.calls).clone()
    }

    pub fn raw_calls(&self, url: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, MockFetchCall::Raw { url: u } if u == url))
            .count()
    }

    fn pop_error(queue: &Mutex<HashMap<String, VecDeque<CallError>>>, url: &str) -> Option<CallError> {
        lock(queue).get_mut(url).and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch_raw(&self, url: &str) -> CallResult<RawPage> {
        let served = {
            let mut calls = lock(&self.calls);
            calls.push(MockFetchCall::Raw {
                url: url.to_string(),
            });
            calls
                .iter()
                .filter(|c| matches!(c, MockFetchCall::Raw { .. }))
                .count()
        };
        if let Some((n, token)) = lock(&self.cancel_after).as_ref() {
            if served >= *n {
                token.cancel();
            }
        }

        if let Some(err) = Self::pop_error(&self.raw_errors, url) {
            return Err(err);
        }
        Ok(lock(&self.pages).get(url).cloned().unwrap_or_else(|| RawPage {
            markdown: format!("# Article at {}", url),
            metadata: IndexMap::from([("sourceURL".to_string(), json!(url))]),
        }))
    }

    async fn fetch_structured(&self, url: &str, _schema: &Value, _prompt: &str) -> CallResult<Value> {
        lock(&self.calls).push(MockFetchCall::Structured {
            url: url.to_string(),
        });

        if let Some(err) = Self::pop_error(&self.structured_errors, url) {
            return Err(err);
        }
        Ok(lock(&self.fields)
            .get(url)
            .cloned()
            .unwrap_or_else(|| json!({ "title": url })))
    }
}

// =============================================================================
// Scorer
// =============================================================================

/// A mock scorer that answers by the URL named in the prompt.
pub struct MockScorer {
    responses: Mutex<Vec<(String, String)>>,
    errors: Mutex<HashMap<String, VecDeque<CallError>>>,
    default_response: Mutex<String>,
    prompts: Mutex<Vec<String>>,
}

impl Default for MockScorer {
    fn default() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            errors: Mutex::new(HashMap::new()),
            default_response: Mutex::new("I am not sure about this one.".to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl MockScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, url: impl Into<String>, response: impl Into<String>) -> Self {
        lock(&self.responses).push((url.into(), response.into()));
        self
    }

    /// Answer for URLs without their own response.
    pub fn with_default(self, response: impl Into<String>) -> Self {
        *lock(&self.default_response) = response.into();
        self
    }

    pub fn with_error(self, url: impl Into<String>, error: CallError) -> Self {
        lock(&self.errors)
            .entry(url.into())
            .or_default()
            .push_back(error);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

fn prompt_names(prompt: &str, url: &str) -> bool {
    prompt.contains(&format!("URL: {}\n", url))
}

#[async_trait]
impl Scorer for MockScorer {
    async fn score(&self, prompt: &str) -> CallResult<String> {
        lock(&self.prompts).push(prompt.to_string());

        let queued = lock(&self.errors)
            .iter_mut()
            .find(|(url, _)| prompt_names(prompt, url))
            .and_then(|(_, q)| q.pop_front());
        if let Some(err) = queued {
            return Err(err);
        }

        let response = lock(&self.responses)
            .iter()
            .find(|(url, _)| prompt_names(prompt, url))
            .map(|(_, r)| r.clone());
        Ok(response.unwrap_or_else(|| lock(&self.default_response).clone()))
    }
}

// =============================================================================
// Clock and sites
// =============================================================================

/// A clock that advances by a fixed step on every read.
pub struct MockClock {
    next: Mutex<DateTime<Local>>,
    step: chrono::Duration,
}

impl MockClock {
    pub fn starting_at(start: DateTime<Local>) -> Self {
        Self {
            next: Mutex::new(start),
            step: chrono::Duration::seconds(1),
        }
    }

    /// Start at a fixed local time.
    pub fn at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        let start = Local
            .with_ymd_and_hms(year, month, day, hour, min, sec)
            .earliest()
            .unwrap_or_else(Local::now);
        Self::starting_at(start)
    }

    pub fn with_step(mut self, step: chrono::Duration) -> Self {
        self.step = step;
        self
    }

    /// Move the clock forward without reading it.
    pub fn advance(&self, by: chrono::Duration) {
        let mut next = lock(&self.next);
        *next += by;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Local> {
        let mut next = lock(&self.next);
        let now = *next;
        *next += self.step;
        now
    }
}

/// A fixed list of monitored sites.
pub struct StaticSites {
    sites: Vec<MonitoredSite>,
}

impl StaticSites {
    pub fn new(sites: Vec<MonitoredSite>) -> Self {
        Self { sites }
    }
}

impl SiteSource for StaticSites {
    fn load_sites(&self) -> Result<Vec<MonitoredSite>> {
        Ok(self.sites.clone())
    }
}
