//! Storage adapter trait and types

use crate::error::{BackendKind, StorageError, StorageOperation, StorageResult};
use crate::storage::diagnostics::{SkippedEntry, StorageDiagnostics};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A logical key with its decoded value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Logical key, without the namespace
    pub key: String,
    /// Stored JSON value
    pub value: Value,
}

/// Key/value capability shared by every storage backend.
///
/// Keys are scoped to the adapter's namespace (a key prefix or a table).
/// Every operation is asynchronous, whether or not the medium underneath is.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Backend this adapter talks to
    fn backend(&self) -> BackendKind;

    /// Prefix or table name scoping the adapter's keys
    fn namespace(&self) -> &str;

    /// Sink receiving reports about entries dropped from listings
    fn diagnostics(&self) -> &dyn StorageDiagnostics;

    /// Read a value. Absent keys resolve to `None`, not an error.
    async fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Create or overwrite a value
    async fn set(&self, key: &str, value: Value) -> StorageResult<()>;

    /// Remove a value. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Every decodable entry whose key starts with `prefix`, in no particular order
    async fn entries(&self, prefix: Option<&str>) -> StorageResult<Vec<Entry>>;

    /// Values of [`StorageAdapter::entries`]
    async fn list(&self, prefix: Option<&str>) -> StorageResult<Vec<Value>> {
        let entries = self.entries(prefix).await?;
        Ok(entries.into_iter().map(|entry| entry.value).collect())
    }

    /// Remove every entry in the namespace, and nothing outside it
    async fn clear(&self) -> StorageResult<()>;
}

/// Typed access on top of [`StorageAdapter`] through serde
#[async_trait]
pub trait StorageAdapterExt: StorageAdapter {
    /// Read and decode a value into `T`
    async fn get_as<T>(&self, key: &str) -> StorageResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let Some(value) = self.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_value(value).map(Some).map_err(|e| {
            StorageError::failed(
                self.backend(),
                StorageOperation::Get,
                format!("failed to decode value for key '{}': {}", key, e),
            )
        })
    }

    /// Encode `value` and store it under `key`
    async fn set_as<T>(&self, key: &str, value: &T) -> StorageResult<()>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(value).map_err(|e| {
            StorageError::failed(
                self.backend(),
                StorageOperation::Set,
                format!("failed to encode value for key '{}': {}", key, e),
            )
        })?;
        self.set(key, value).await
    }

    /// List and decode values into `T`, skipping the ones that don't fit
    async fn list_as<T>(&self, prefix: Option<&str>) -> StorageResult<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let entries = self.entries(prefix).await?;
        let mut values = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value(entry.value) {
                Ok(value) => values.push(value),
                Err(e) => self.diagnostics().entry_skipped(&SkippedEntry {
                    backend: self.backend(),
                    namespace: self.namespace().to_string(),
                    key: entry.key,
                    reason: e.to_string(),
                }),
            }
        }
        Ok(values)
    }
}

impl<A: StorageAdapter + ?Sized> StorageAdapterExt for A {}
