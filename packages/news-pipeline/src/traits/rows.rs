//! Tabular report output.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::StoreResult;

/// One table row, column name → cell, in column order.
pub type Row = IndexMap<String, Value>;

/// Renders row tables.
pub trait RowWriter: Send + Sync {
    /// Write `rows` next to `base` (the writer picks the extension) and
    /// return the path written.
    fn write_rows(&self, base: &Path, rows: &[Row]) -> StoreResult<PathBuf>;
}
