//! Append-only, timestamp-keyed stage stores.
//!
//! Each store is one JSON object on disk, `{run_key: batch}`. Run keys are
//! fixed-width `YYYY-MM-DD HH:MM:SS` strings, so lexicographic order is
//! chronological order and "latest" is simply the maximal key.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::atomic::{read_json, write_json_atomic};
use crate::error::StoreResult;
use crate::types::batch::BatchId;

/// A batch that can say whether it belongs to a given batch id.
pub trait Correlated {
    fn carries(&self, batch_id: &BatchId) -> bool;
}

/// Highest `.NNN` suffix; a fourth digit would sort `.1000` before `.999`.
const MAX_SEQUENCE: u32 = 999;

/// What to do when a run key is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// Keep the existing entry, drop the new one
    Reject,
    /// Replace the existing entry
    Overwrite,
    /// Store under `<key>.NNN`, the first free sequence number; once
    /// `.999` is taken the write is skipped as under `Reject`
    #[default]
    Disambiguate,
}

/// Outcome of [`JsonBatchStore::put`]; each variant carries the key used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Written(String),
    Disambiguated(String),
    Overwritten(String),
    SkippedDuplicate(String),
}

impl PutOutcome {
    pub fn key(&self) -> &str {
        match self {
            Self::Written(k)
            | Self::Disambiguated(k)
            | Self::Overwritten(k)
            | Self::SkippedDuplicate(k) => k,
        }
    }

    pub fn was_written(&self) -> bool {
        !matches!(self, Self::SkippedDuplicate(_))
    }
}

/// A batch together with the run key it is stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBatch<T> {
    pub key: String,
    pub batch: T,
}

/// JSON-file store of one stage's batches.
///
/// The file is re-read on every operation so that separate processes (one
/// CLI invocation per stage) see each other's writes. The mutex serialises
/// read-modify-write cycles within a process.
pub struct JsonBatchStore<T> {
    path: PathBuf,
    policy: CollisionPolicy,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonBatchStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            policy: CollisionPolicy::default(),
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn with_policy(mut self, policy: CollisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StoreResult<BTreeMap<String, T>> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }

    /// Store `value` under `key`, resolving collisions per the policy.
    pub fn put(&self, key: &str, value: T) -> StoreResult<PutOutcome> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;

        let outcome = if !entries.contains_key(key) {
            PutOutcome::Written(key.to_string())
        } else {
            match self.policy {
                CollisionPolicy::Reject => {
                    warn!(key, path = %self.path.display(), "Run key already stored, skipping write");
                    return Ok(PutOutcome::SkippedDuplicate(key.to_string()));
                }
                CollisionPolicy::Overwrite => PutOutcome::Overwritten(key.to_string()),
                CollisionPolicy::Disambiguate => {
                    match (1..=MAX_SEQUENCE)
                        .map(|n| format!("{}.{:03}", key, n))
                        .find(|k| !entries.contains_key(k))
                    {
                        Some(free) => PutOutcome::Disambiguated(free),
                        None => {
                            warn!(key, path = %self.path.display(), "No free sequence number for run key, skipping write");
                            return Ok(PutOutcome::SkippedDuplicate(key.to_string()));
                        }
                    }
                }
            }
        };

        entries.insert(outcome.key().to_string(), value);
        write_json_atomic(&self.path, &entries)?;

        debug!(key = outcome.key(), path = %self.path.display(), "Stored batch");
        Ok(outcome)
    }

    pub fn get(&self, key: &str) -> StoreResult<Option<T>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(key))
    }

    /// The batch under the lexicographically maximal key.
    pub fn latest(&self) -> StoreResult<Option<StoredBatch<T>>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self
            .load()?
            .pop_last()
            .map(|(key, batch)| StoredBatch { key, batch }))
    }

    /// All run keys, oldest first.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.into_keys().collect())
    }
}

impl<T> JsonBatchStore<T>
where
    T: Serialize + DeserializeOwned + Correlated,
{
    /// The oldest batch carrying `batch_id`.
    pub fn scan_by_correlation_id(&self, batch_id: &BatchId) -> StoreResult<Option<StoredBatch<T>>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self
            .load()?
            .into_iter()
            .find(|(_, batch)| batch.carries(batch_id))
            .map(|(key, batch)| StoredBatch { key, batch }))
    }

    pub fn contains_correlation_id(&self, batch_id: &BatchId) -> StoreResult<bool> {
        Ok(self.scan_by_correlation_id(batch_id)?.is_some())
    }
}
