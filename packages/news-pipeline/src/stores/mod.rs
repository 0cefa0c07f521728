//! On-disk state shared across pipeline runs.

pub mod atomic;
pub mod batch;
pub mod history;

pub use atomic::{read_json, write_json_atomic};
pub use batch::{CollisionPolicy, Correlated, JsonBatchStore, PutOutcome, StoredBatch};
pub use history::LinkHistory;

use std::fs;
use std::path::Path;

use crate::error::{StoreError, StoreResult};
use crate::types::batch::{DiscoveryBatch, ValidationBatch};

pub const DISCOVERY_FILE: &str = "new_links.json";
pub const VALIDATION_FILE: &str = "valid_links.json";
pub const HISTORY_FILE: &str = "link_cache.json";

/// The three stores living under the data directory.
pub struct Stores {
    pub discovery: JsonBatchStore<DiscoveryBatch>,
    pub validation: JsonBatchStore<ValidationBatch>,
    pub history: LinkHistory,
}

impl Stores {
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        fs::create_dir_all(data_dir).map_err(|e| StoreError::io(data_dir, e))?;
        Ok(Self {
            discovery: JsonBatchStore::open(data_dir.join(DISCOVERY_FILE)),
            validation: JsonBatchStore::open(data_dir.join(VALIDATION_FILE)),
            history: LinkHistory::open(data_dir.join(HISTORY_FILE))?,
        })
    }

    pub fn with_policy(mut self, policy: CollisionPolicy) -> Self {
        self.discovery = self.discovery.with_policy(policy);
        self.validation = self.validation.with_policy(policy);
        self
    }
}
