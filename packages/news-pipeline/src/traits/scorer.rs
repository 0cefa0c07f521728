//! Text scoring.

use async_trait::async_trait;

use crate::retry::CallResult;

/// Free text in, free text out.
///
/// The response is expected to loosely contain one JSON object; parsing is
/// the caller's job.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, prompt: &str) -> CallResult<String>;
}
