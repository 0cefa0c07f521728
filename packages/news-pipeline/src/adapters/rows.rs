//! Row tables as JSON arrays of objects.

use std::path::{Path, PathBuf};

use crate::error::StoreResult;
use crate::stores::write_json_atomic;
use crate::traits::{Row, RowWriter};

/// Writes `<base>.json` holding one object per row, keys in column order.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRowWriter;

impl RowWriter for JsonRowWriter {
    fn write_rows(&self, base: &Path, rows: &[Row]) -> StoreResult<PathBuf> {
        let path = base.with_extension("json");
        write_json_atomic(&path, rows)?;
        Ok(path)
    }
}
