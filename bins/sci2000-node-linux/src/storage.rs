//! Calibration storage backed by a JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sci2000_core::{CalibrationStorage, StorageError};

/// Key-value calibration storage persisted as a flat JSON object.
///
/// Writes are staged in memory and only reach the file on `commit`, which
/// writes a sibling temporary file and renames it over the original.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    values: BTreeMap<String, i16>,
}

impl JsonFileStorage {
    /// Open `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| StorageError::Read(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StorageError::Read(format!("{}: {}", path.display(), e))),
        };
        tracing::debug!(path = %path.display(), keys = values.len(), "Calibration file opened");
        Ok(Self { path, values })
    }

    /// Open `path`, starting empty when the file can't be read. The path is
    /// kept so the next commit replaces the unreadable file.
    pub fn open_or_empty(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::open(&path) {
            Ok(storage) => storage,
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable calibration file, starting from defaults");
                Self {
                    path,
                    values: BTreeMap::new(),
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CalibrationStorage for JsonFileStorage {
    fn read(&self, key: &str) -> Result<i16, StorageError> {
        self.values
            .get(key)
            .copied()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn write(&mut self, key: &str, value: i16) -> Result<(), StorageError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        let text = serde_json::to_string_pretty(&self.values).map_err(|e| StorageError::Commit(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text).map_err(|e| StorageError::Commit(format!("{}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| StorageError::Commit(format!("{}: {}", self.path.display(), e)))?;
        tracing::debug!(path = %self.path.display(), "Calibration committed");
        Ok(())
    }
}
