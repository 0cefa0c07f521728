//! Crash-safe JSON file helpers.
//!
//! Writes go to a temp file in the target's directory and are renamed over
//! the target, so readers see either the old file or the new one.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{StoreError, StoreResult};

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush().map_err(|e| StoreError::io(path, e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(path, e))?;
    tmp.persist(path).map_err(|e| StoreError::io(path, e.error))?;
    Ok(())
}

/// Read JSON from `path`. A missing or blank file is `None`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    if text.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let mut value = BTreeMap::new();
        value.insert("a".to_string(), vec![1, 2, 3]);
        write_json_atomic(&path, &value).unwrap();

        let back: BTreeMap<String, Vec<i32>> = read_json(&path).unwrap().unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        write_json_atomic(&path, &vec![1]).unwrap();
        write_json_atomic(&path, &vec![1, 2]).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(read_json::<Vec<i32>>(&path).unwrap(), Some(vec![1, 2]));
    }

    #[test]
    fn test_missing_and_blank_files_are_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        assert_eq!(read_json::<Vec<i32>>(&path).unwrap(), None);

        fs::write(&path, "  \n").unwrap();
        assert_eq!(read_json::<Vec<i32>>(&path).unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{\"a\": [1, 2").unwrap();

        let err = read_json::<BTreeMap<String, Vec<i32>>>(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
