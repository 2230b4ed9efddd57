//! Local storage backend implementation
//!
//! This module provides the adapter over a [`LocalMedium`], the synchronous
//! string store shared by the whole origin:
//! - Namespacing by key prefix (physical key = prefix + logical key)
//! - JSON text as the physical value format
//! - Snapshot-then-act enumeration for listing and clearing

use crate::error::{BackendKind, StorageError, StorageOperation, StorageResult};
use crate::storage::adapter::{Entry, StorageAdapter};
use crate::storage::constants::DEFAULT_LOCAL_PREFIX;
use crate::storage::diagnostics::{SkippedEntry, StorageDiagnostics, TracingDiagnostics};
use crate::storage::medium::{LocalMedium, MediumError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Local storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Prefix prepended to every key this adapter touches
    pub prefix: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_LOCAL_PREFIX.to_string(),
        }
    }
}

/// Local key/value adapter
pub struct LocalStorageAdapter {
    config: LocalConfig,
    medium: Arc<dyn LocalMedium>,
    diagnostics: Arc<dyn StorageDiagnostics>,
}

impl LocalStorageAdapter {
    /// Create an adapter over `medium` scoped to `config.prefix`
    pub fn new(config: LocalConfig, medium: Arc<dyn LocalMedium>) -> Self {
        Self {
            config,
            medium,
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    /// Replace the sink that receives skipped-entry reports
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn StorageDiagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Prefix scoping this adapter
    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }

    fn physical_key(&self, key: &str) -> String {
        format!("{}{}", self.config.prefix, key)
    }

    fn error(operation: StorageOperation, reason: impl Into<String>) -> StorageError {
        StorageError::failed(BackendKind::Local, operation, reason)
    }

    fn medium_error(operation: StorageOperation, err: MediumError) -> StorageError {
        Self::error(operation, err.to_string())
    }

    /// Physical keys of this namespace that also start with `prefix`.
    ///
    /// The key list is collected in full before the caller acts on it.
    fn matching_keys(
        &self,
        operation: StorageOperation,
        prefix: Option<&str>,
    ) -> StorageResult<Vec<String>> {
        let filter = format!("{}{}", self.config.prefix, prefix.unwrap_or(""));
        let keys = self
            .medium
            .keys()
            .map_err(|e| Self::medium_error(operation, e))?;
        Ok(keys
            .into_iter()
            .filter(|key| key.starts_with(&filter))
            .collect())
    }
}

#[async_trait]
impl StorageAdapter for LocalStorageAdapter {
    fn backend(&self) -> BackendKind {
        BackendKind::Local
    }

    fn namespace(&self) -> &str {
        &self.config.prefix
    }

    fn diagnostics(&self) -> &dyn StorageDiagnostics {
        self.diagnostics.as_ref()
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let physical = self.physical_key(key);
        tracing::debug!(backend = "local", key = %physical, "get");

        let Some(text) = self
            .medium
            .get_item(&physical)
            .map_err(|e| Self::medium_error(StorageOperation::Get, e))?
        else {
            return Ok(None);
        };

        serde_json::from_str(&text).map(Some).map_err(|e| {
            Self::error(
                StorageOperation::Get,
                format!("failed to parse value for key '{}': {}", key, e),
            )
        })
    }

    async fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        let physical = self.physical_key(key);
        tracing::debug!(backend = "local", key = %physical, "set");

        let text = serde_json::to_string(&value).map_err(|e| {
            Self::error(
                StorageOperation::Set,
                format!("failed to serialize value for key '{}': {}", key, e),
            )
        })?;
        self.medium
            .set_item(&physical, &text)
            .map_err(|e| Self::medium_error(StorageOperation::Set, e))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let physical = self.physical_key(key);
        tracing::debug!(backend = "local", key = %physical, "delete");

        self.medium
            .remove_item(&physical)
            .map_err(|e| Self::medium_error(StorageOperation::Delete, e))
    }

    async fn entries(&self, prefix: Option<&str>) -> StorageResult<Vec<Entry>> {
        let keys = self.matching_keys(StorageOperation::List, prefix)?;
        let mut entries = Vec::with_capacity(keys.len());

        for physical in keys {
            // Removed by someone else since the snapshot was taken.
            let Some(text) = self
                .medium
                .get_item(&physical)
                .map_err(|e| Self::medium_error(StorageOperation::List, e))?
            else {
                continue;
            };

            match serde_json::from_str(&text) {
                Ok(value) => entries.push(Entry {
                    key: physical[self.config.prefix.len()..].to_string(),
                    value,
                }),
                Err(e) => self.diagnostics.entry_skipped(&SkippedEntry {
                    backend: BackendKind::Local,
                    namespace: self.config.prefix.clone(),
                    key: physical,
                    reason: e.to_string(),
                }),
            }
        }

        tracing::debug!(
            backend = "local",
            prefix = %self.config.prefix,
            count = entries.len(),
            "list"
        );
        Ok(entries)
    }

    async fn clear(&self) -> StorageResult<()> {
        let keys = self.matching_keys(StorageOperation::Clear, None)?;
        tracing::debug!(
            backend = "local",
            prefix = %self.config.prefix,
            count = keys.len(),
            "clear"
        );

        if keys.is_empty() {
            return Ok(());
        }
        self.medium
            .remove_items(&keys)
            .map_err(|e| Self::medium_error(StorageOperation::Clear, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::adapter::StorageAdapterExt;
    use crate::storage::diagnostics::RecordingDiagnostics;
    use crate::storage::medium::{FileMedium, MemoryMedium};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn create_test_storage(prefix: &str) -> (LocalStorageAdapter, MemoryMedium) {
        let medium = MemoryMedium::new();
        let config = LocalConfig {
            prefix: prefix.to_string(),
        };
        let adapter = LocalStorageAdapter::new(config, Arc::new(medium.clone()));
        (adapter, medium)
    }

    struct BrokenMedium;

    impl LocalMedium for BrokenMedium {
        fn get_item(&self, _key: &str) -> Result<Option<String>, MediumError> {
            Err(MediumError::Poisoned)
        }

        fn set_item(&self, _key: &str, _value: &str) -> Result<(), MediumError> {
            Err(MediumError::Poisoned)
        }

        fn remove_item(&self, _key: &str) -> Result<(), MediumError> {
            Err(MediumError::Poisoned)
        }

        fn keys(&self) -> Result<Vec<String>, MediumError> {
            Err(MediumError::Poisoned)
        }
    }

    /// Counts removal calls reaching the wrapped medium
    #[derive(Default)]
    struct CountingMedium {
        inner: MemoryMedium,
        single_removals: AtomicUsize,
        batch_removals: AtomicUsize,
    }

    impl LocalMedium for CountingMedium {
        fn get_item(&self, key: &str) -> Result<Option<String>, MediumError> {
            self.inner.get_item(key)
        }

        fn set_item(&self, key: &str, value: &str) -> Result<(), MediumError> {
            self.inner.set_item(key, value)
        }

        fn remove_item(&self, key: &str) -> Result<(), MediumError> {
            self.single_removals.fetch_add(1, Ordering::SeqCst);
            self.inner.remove_item(key)
        }

        fn remove_items(&self, keys: &[String]) -> Result<(), MediumError> {
            self.batch_removals.fetch_add(1, Ordering::SeqCst);
            self.inner.remove_items(keys)
        }

        fn keys(&self) -> Result<Vec<String>, MediumError> {
            self.inner.keys()
        }
    }

    #[test]
    fn test_local_config_default() {
        let config = LocalConfig::default();
        assert_eq!(config.prefix, DEFAULT_LOCAL_PREFIX);
    }

    #[tokio::test]
    async fn test_physical_format() {
        let (storage, medium) = create_test_storage("app_");

        storage.set("client:1", json!({"name": "Acme"})).await.unwrap();

        assert_eq!(
            medium.get_item("app_client:1").unwrap(),
            Some("{\"name\":\"Acme\"}".to_string())
        );
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (storage, _medium) = create_test_storage("app_");
        assert_eq!(storage.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_corrupt_value_is_get_error() {
        let (storage, medium) = create_test_storage("app_");
        medium.set_item("app_bad", "{not json").unwrap();

        let err = storage.get("bad").await.unwrap_err();
        assert_eq!(err.code(), "LOCAL_GET_ERROR");
    }

    #[tokio::test]
    async fn test_list_reports_corrupt_entries() {
        let medium = MemoryMedium::new();
        let diagnostics = Arc::new(RecordingDiagnostics::new());
        let storage = LocalStorageAdapter::new(LocalConfig::default(), Arc::new(medium.clone()))
            .with_diagnostics(diagnostics.clone());

        storage.set("ok", json!(1)).await.unwrap();
        medium
            .set_item(&format!("{}broken", DEFAULT_LOCAL_PREFIX), "{")
            .unwrap();

        let values = storage.list(None).await.unwrap();
        assert_eq!(values, vec![json!(1)]);

        let skipped = diagnostics.skipped();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].key, format!("{}broken", DEFAULT_LOCAL_PREFIX));
        assert_eq!(skipped[0].backend, BackendKind::Local);
    }

    #[tokio::test]
    async fn test_entries_strip_prefix() {
        let (storage, _medium) = create_test_storage("app_");
        storage.set("product:7", json!({"sku": "X"})).await.unwrap();

        let entries = storage.entries(Some("product:")).await.unwrap();
        assert_eq!(
            entries,
            vec![Entry {
                key: "product:7".to_string(),
                value: json!({"sku": "X"}),
            }]
        );
    }

    #[tokio::test]
    async fn test_clear_leaves_foreign_keys() {
        let (storage, medium) = create_test_storage("app_");
        for i in 0..20 {
            storage.set(&format!("k{}", i), json!(i)).await.unwrap();
        }
        medium.set_item("other_k1", "1").unwrap();
        medium.set_item("raw", "x").unwrap();

        storage.clear().await.unwrap();

        assert!(storage.list(None).await.unwrap().is_empty());
        let mut remaining = medium.keys().unwrap();
        remaining.sort();
        assert_eq!(remaining, vec!["other_k1".to_string(), "raw".to_string()]);
    }

    #[tokio::test]
    async fn test_clear_removes_namespace_in_one_batch() {
        let medium = Arc::new(CountingMedium::default());
        let storage = LocalStorageAdapter::new(LocalConfig::default(), medium.clone());
        for i in 0..50 {
            storage.set(&format!("k{}", i), json!(i)).await.unwrap();
        }

        storage.clear().await.unwrap();

        assert!(storage.list(None).await.unwrap().is_empty());
        assert_eq!(medium.batch_removals.load(Ordering::SeqCst), 1);
        assert_eq!(medium.single_removals.load(Ordering::SeqCst), 0);

        // An empty namespace does not touch the medium.
        storage.clear().await.unwrap();
        assert_eq!(medium.batch_removals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_medium_failures_are_wrapped() {
        let storage = LocalStorageAdapter::new(LocalConfig::default(), Arc::new(BrokenMedium));

        assert_eq!(storage.get("k").await.unwrap_err().code(), "LOCAL_GET_ERROR");
        assert_eq!(
            storage.set("k", json!(1)).await.unwrap_err().code(),
            "LOCAL_SET_ERROR"
        );
        assert_eq!(
            storage.delete("k").await.unwrap_err().code(),
            "LOCAL_DELETE_ERROR"
        );
        assert_eq!(
            storage.list(None).await.unwrap_err().code(),
            "LOCAL_LIST_ERROR"
        );
        assert_eq!(storage.clear().await.unwrap_err().code(), "LOCAL_CLEAR_ERROR");
    }

    #[tokio::test]
    async fn test_typed_access() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Client {
            name: String,
        }

        let (storage, _medium) = create_test_storage("app_");
        let acme = Client {
            name: "Acme".to_string(),
        };
        storage.set_as("client:1", &acme).await.unwrap();
        storage.set("client:2", json!(42)).await.unwrap();

        assert_eq!(storage.get_as::<Client>("client:1").await.unwrap(), Some(acme));
        assert_eq!(
            storage.get_as::<Client>("client:2").await.unwrap_err().code(),
            "LOCAL_GET_ERROR"
        );
        assert_eq!(storage.list_as::<Client>(Some("client:")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_medium_backend() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("local.json");

        {
            let medium = Arc::new(FileMedium::open(&path).unwrap());
            let storage = LocalStorageAdapter::new(LocalConfig::default(), medium);
            storage.set("invoice:1", json!({"total": 10.5})).await.unwrap();
        }

        let medium = Arc::new(FileMedium::open(&path).unwrap());
        let storage = LocalStorageAdapter::new(LocalConfig::default(), medium);
        assert_eq!(
            storage.get("invoice:1").await.unwrap(),
            Some(json!({"total": 10.5}))
        );
    }
}
