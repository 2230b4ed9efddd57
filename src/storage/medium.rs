//! Synchronous string key/value media backing the local adapter
//!
//! A medium is shared by every local adapter on the same origin, so it holds
//! keys from many namespaces. Two implementations are provided:
//! - [`MemoryMedium`] - process memory, cheap to clone and share
//! - [`FileMedium`] - a single JSON document on disk, rewritten atomically

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Failures of the underlying medium
#[derive(Error, Debug)]
pub enum MediumError {
    /// A writer panicked while holding the medium
    #[error("medium lock poisoned")]
    Poisoned,

    /// File system failure
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing file is not a JSON object of strings
    #[error("corrupt medium file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Origin-wide string key/value store
pub trait LocalMedium: Send + Sync {
    /// Read the raw string under `key`
    fn get_item(&self, key: &str) -> Result<Option<String>, MediumError>;

    /// Write the raw string under `key`
    fn set_item(&self, key: &str, value: &str) -> Result<(), MediumError>;

    /// Remove `key`; absent keys are not an error
    fn remove_item(&self, key: &str) -> Result<(), MediumError>;

    /// Remove every key in `keys`; absent keys are skipped
    fn remove_items(&self, keys: &[String]) -> Result<(), MediumError> {
        for key in keys {
            self.remove_item(key)?;
        }
        Ok(())
    }

    /// Snapshot of every key currently in the medium, across all namespaces
    fn keys(&self) -> Result<Vec<String>, MediumError>;
}

/// In-memory medium
#[derive(Debug, Clone, Default)]
pub struct MemoryMedium {
    items: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryMedium {
    /// Create an empty medium
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys across all namespaces
    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    /// Whether the medium holds no keys at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalMedium for MemoryMedium {
    fn get_item(&self, key: &str) -> Result<Option<String>, MediumError> {
        let items = self.items.read().map_err(|_| MediumError::Poisoned)?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), MediumError> {
        let mut items = self.items.write().map_err(|_| MediumError::Poisoned)?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), MediumError> {
        let mut items = self.items.write().map_err(|_| MediumError::Poisoned)?;
        items.remove(key);
        Ok(())
    }

    fn remove_items(&self, keys: &[String]) -> Result<(), MediumError> {
        let mut items = self.items.write().map_err(|_| MediumError::Poisoned)?;
        for key in keys {
            items.remove(key);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, MediumError> {
        let items = self.items.read().map_err(|_| MediumError::Poisoned)?;
        Ok(items.keys().cloned().collect())
    }
}

/// Medium persisted as one JSON object file
///
/// Each mutation writes the whole document to a uniquely named temporary file
/// in the same directory and renames it over the original. The in-memory copy only changes once the rename
/// succeeded.
#[derive(Debug)]
pub struct FileMedium {
    path: PathBuf,
    items: RwLock<BTreeMap<String, String>>,
}

impl FileMedium {
    /// Open the medium at `path`, starting empty if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MediumError> {
        let path = path.into();
        let items = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| MediumError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(MediumError::Io { path, source }),
        };

        tracing::debug!(path = %path.display(), keys = items.len(), "opened file medium");
        Ok(Self {
            path,
            items: RwLock::new(items),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> MediumError {
        MediumError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn persist(&self, items: &BTreeMap<String, String>) -> Result<(), MediumError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }

        let mut temp = NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer(&mut writer, items).map_err(|e| MediumError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
            writer.flush().map_err(|e| self.io_error(e))?;
        }

        temp.persist(&self.path)
            .map(|_| ())
            .map_err(|e| self.io_error(e.error))
    }

    fn mutate<F>(&self, change: F) -> Result<(), MediumError>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let mut items = self.items.write().map_err(|_| MediumError::Poisoned)?;
        let mut next = items.clone();
        change(&mut next);
        self.persist(&next)?;
        *items = next;
        Ok(())
    }
}

impl LocalMedium for FileMedium {
    fn get_item(&self, key: &str) -> Result<Option<String>, MediumError> {
        let items = self.items.read().map_err(|_| MediumError::Poisoned)?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), MediumError> {
        self.mutate(|items| {
            items.insert(key.to_string(), value.to_string());
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), MediumError> {
        {
            let items = self.items.read().map_err(|_| MediumError::Poisoned)?;
            if !items.contains_key(key) {
                return Ok(());
            }
        }
        self.mutate(|items| {
            items.remove(key);
        })
    }

    fn remove_items(&self, keys: &[String]) -> Result<(), MediumError> {
        {
            let items = self.items.read().map_err(|_| MediumError::Poisoned)?;
            if !keys.iter().any(|key| items.contains_key(key)) {
                return Ok(());
            }
        }
        self.mutate(|items| {
            for key in keys {
                items.remove(key);
            }
        })
    }

    fn keys(&self) -> Result<Vec<String>, MediumError> {
        let items = self.items.read().map_err(|_| MediumError::Poisoned)?;
        Ok(items.keys().cloned().collect())
    }
}
