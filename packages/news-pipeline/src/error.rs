//! Typed errors for the news pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`); `anyhow` only appears
//! at the binary edge and in configuration loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors a pipeline stage reports to the orchestrator.
///
/// None of these are faults: each one tells the orchestrator to stop the
/// run and keep whatever has already been persisted.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No persisted batch matches the requested reference
    #[error("no batch found for {reference}")]
    MissingBatchReference { reference: String },

    /// The upstream stage produced nothing to work on
    #[error("nothing to process: {0}")]
    EmptyUpstreamResult(String),

    /// A run key collided and the store's policy rejected the write
    #[error("run key already exists: {key}")]
    DuplicateKey { key: String },

    /// Storage operation failed
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Monitored site list could not be loaded
    #[error("site source error: {0}")]
    Sites(String),

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn missing_batch(reference: impl Into<String>) -> Self {
        Self::MissingBatchReference {
            reference: reference.into(),
        }
    }
}

/// Errors from the JSON-file stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing file exists but does not hold the expected shape
    #[error("corrupt store {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be serialized
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for stage operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
