//! Shared token bucket in front of every external call.
//!
//! One limiter is created per process and handed to each adapter wrapper,
//! so mapping, fetching and scoring all draw from the same budget.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde_json::Value;

use crate::retry::CallResult;
use crate::traits::{LinkMapper, MapConfig, PageFetcher, Scorer};
use crate::types::extraction::RawPage;

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Handle to a limiter shared between wrappers.
pub type SharedLimiter = Arc<DefaultRateLimiter>;

/// Limiter allowing `requests_per_minute`, with no burst beyond that.
pub fn per_minute_limiter(requests_per_minute: NonZeroU32) -> SharedLimiter {
    Arc::new(RateLimiter::direct(Quota::per_minute(requests_per_minute)))
}

/// A collaborator that waits for a permit before each call.
pub struct RateLimited<T> {
    inner: T,
    limiter: SharedLimiter,
}

impl<T> RateLimited<T> {
    pub fn new(inner: T, limiter: SharedLimiter) -> Self {
        Self { inner, limiter }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    async fn wait_for_permit(&self) {
        self.limiter.until_ready().await;
    }
}

/// `adapter.rate_limited(&limiter)`
pub trait RateLimitExt: Sized {
    fn rate_limited(self, limiter: &SharedLimiter) -> RateLimited<Self> {
        RateLimited::new(self, Arc::clone(limiter))
    }
}

impl<T> RateLimitExt for T {}

#[async_trait]
impl<T: LinkMapper> LinkMapper for RateLimited<T> {
    async fn map_links(&self, url: &str, config: &MapConfig) -> CallResult<Vec<String>> {
        self.wait_for_permit().await;
        self.inner.map_links(url, config).await
    }
}

#[async_trait]
impl<T: PageFetcher> PageFetcher for RateLimited<T> {
    async fn fetch_raw(&self, url: &str) -> CallResult<RawPage> {
        self.wait_for_permit().await;
        self.inner.fetch_raw(url).await
    }

    async fn fetch_structured(&self, url: &str, schema: &Value, prompt: &str) -> CallResult<Value> {
        self.wait_for_permit().await;
        self.inner.fetch_structured(url, schema, prompt).await
    }
}

#[async_trait]
impl<T: Scorer> Scorer for RateLimited<T> {
    async fn score(&self, prompt: &str) -> CallResult<String> {
        self.wait_for_permit().await;
        self.inner.score(prompt).await
    }
}
