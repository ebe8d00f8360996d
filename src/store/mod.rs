//! Per-user local storage for credentials and upload history
//!
//! The upload core never touches the store; the CLI reads saved credentials
//! before an upload and appends a [`HistoryEntry`] after a success.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::s3::{Credentials, HistoryEntry};

const STORE_DIR: &str = "s3drop";
const STORE_FILE: &str = "store.json";

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to access store file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Credentials persisted together with the bucket they were used for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedCredentials {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub bucket_name: String,
}

/// Persistent storage for saved credentials and upload history
pub trait Store {
    fn load_credentials(&self) -> Result<Option<SavedCredentials>, StoreError>;
    fn save_credentials(&self, saved: &SavedCredentials) -> Result<(), StoreError>;
    fn clear_credentials(&self) -> Result<(), StoreError>;

    /// Entries in insertion order, oldest first
    fn load_history(&self) -> Result<Vec<HistoryEntry>, StoreError>;
    fn append_history(&self, entry: HistoryEntry) -> Result<(), StoreError>;
    fn clear_history(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credentials: Option<SavedCredentials>,
    #[serde(default)]
    upload_history: Vec<HistoryEntry>,
}

/// JSON file store, rewritten in full on every change
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$XDG_CONFIG_HOME/s3drop/store.json`, falling back to `~/.config`
    pub fn default_path() -> Option<PathBuf> {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
        Some(base.join(STORE_DIR).join(STORE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoreData, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoreData::default()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(StoreData::default());
        }

        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write(&self, data: &StoreData) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, json).map_err(io_err)?;
        debug!(path = %self.path.display(), "store_written");
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut StoreData)) -> Result<(), StoreError> {
        let mut data = self.read()?;
        f(&mut data);
        self.write(&data)
    }
}

impl Store for JsonFileStore {
    fn load_credentials(&self) -> Result<Option<SavedCredentials>, StoreError> {
        Ok(self.read()?.credentials)
    }

    fn save_credentials(&self, saved: &SavedCredentials) -> Result<(), StoreError> {
        self.update(|data| data.credentials = Some(saved.clone()))
    }

    fn clear_credentials(&self) -> Result<(), StoreError> {
        self.update(|data| data.credentials = None)
    }

    fn load_history(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self.read()?.upload_history)
    }

    fn append_history(&self, entry: HistoryEntry) -> Result<(), StoreError> {
        self.update(|data| data.upload_history.push(entry))
    }

    fn clear_history(&self) -> Result<(), StoreError> {
        self.update(|data| data.upload_history.clear())
    }
}

/// In-process store, nothing survives the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut StoreData) -> R) -> R {
        let mut data = self.data.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut data)
    }
}

impl Store for MemoryStore {
    fn load_credentials(&self) -> Result<Option<SavedCredentials>, StoreError> {
        Ok(self.with(|data| data.credentials.clone()))
    }

    fn save_credentials(&self, saved: &SavedCredentials) -> Result<(), StoreError> {
        self.with(|data| data.credentials = Some(saved.clone()));
        Ok(())
    }

    fn clear_credentials(&self) -> Result<(), StoreError> {
        self.with(|data| data.credentials = None);
        Ok(())
    }

    fn load_history(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self.with(|data| data.upload_history.clone()))
    }

    fn append_history(&self, entry: HistoryEntry) -> Result<(), StoreError> {
        self.with(|data| data.upload_history.push(entry));
        Ok(())
    }

    fn clear_history(&self) -> Result<(), StoreError> {
        self.with(|data| data.upload_history.clear());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved() -> SavedCredentials {
        SavedCredentials {
            credentials: Credentials::new("AKIATEST", "secret", "eu-west-1"),
            bucket_name: "my-bucket".to_string(),
        }
    }

    #[test]
    fn test_saved_credentials_json_shape() {
        let json = serde_json::to_value(saved()).unwrap();
        assert_eq!(json["bucketName"], "my-bucket");
        assert_eq!(json["region"], "eu-west-1");
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.load_credentials().unwrap(), None);

        store.save_credentials(&saved()).unwrap();
        assert_eq!(store.load_credentials().unwrap(), Some(saved()));

        store.append_history(HistoryEntry::new("a.txt", "b")).unwrap();
        store.append_history(HistoryEntry::new("c.txt", "b")).unwrap();
        let history = store.load_history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].file_name, "a.txt");

        store.clear_history().unwrap();
        assert!(store.load_history().unwrap().is_empty());
        assert!(store.load_credentials().unwrap().is_some());

        store.clear_credentials().unwrap();
        assert_eq!(store.load_credentials().unwrap(), None);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nope").join("store.json"));
        assert_eq!(store.load_credentials().unwrap(), None);
        assert!(store.load_history().unwrap().is_empty());
    }
}
