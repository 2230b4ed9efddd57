//! Cloud table storage backend implementation
//!
//! This module provides the adapter over a remote key/value table:
//! - One row per logical key (`key`, `value`, `updated_at`)
//! - Namespacing by table name
//! - "No row" is a normal empty result, never an error
//! - Per-row decoding so a malformed row cannot break a listing
//!
//! The table must already exist; the adapter never provisions schema.

use crate::error::{BackendKind, StorageError, StorageOperation, StorageResult};
use crate::storage::adapter::{Entry, StorageAdapter};
use crate::storage::constants::{DEFAULT_CLOUD_TABLE, DEFAULT_TIMEOUT_SECONDS};
use crate::storage::diagnostics::{SkippedEntry, StorageDiagnostics, TracingDiagnostics};
use crate::storage::table::{TableClient, TableError, TableRow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Cloud storage configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    /// API key sent as `apikey` and bearer token
    pub api_key: String,
    /// Table holding the entries
    pub table: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            table: DEFAULT_CLOUD_TABLE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl std::fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("table", &self.table)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Deserialize)]
struct StoredRow {
    key: String,
    value: Value,
}

/// Cloud table key/value adapter
pub struct CloudTableAdapter {
    table: String,
    client: Arc<dyn TableClient>,
    diagnostics: Arc<dyn StorageDiagnostics>,
}

impl CloudTableAdapter {
    /// Create an adapter for `table` using an existing client
    pub fn with_client(table: impl Into<String>, client: Arc<dyn TableClient>) -> Self {
        Self {
            table: table.into(),
            client,
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    /// Create an adapter talking PostgREST to the project in `config`
    #[cfg(feature = "cloud")]
    pub fn connect(config: &CloudConfig) -> StorageResult<Self> {
        if config.table.trim().is_empty() {
            return Err(StorageError::not_configured(
                BackendKind::Cloud,
                "cloud table name is empty",
            ));
        }
        let client = crate::storage::postgrest::PostgrestClient::new(config)?;
        Ok(Self::with_client(config.table.clone(), Arc::new(client)))
    }

    /// Without the `cloud` feature there is no network client to connect with
    #[cfg(not(feature = "cloud"))]
    pub fn connect(_config: &CloudConfig) -> StorageResult<Self> {
        Err(StorageError::not_configured(
            BackendKind::Cloud,
            "built without the `cloud` feature",
        ))
    }

    /// Replace the sink that receives skipped-entry reports
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn StorageDiagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Table scoping this adapter
    pub fn table(&self) -> &str {
        &self.table
    }

    fn table_error(operation: StorageOperation, err: TableError) -> StorageError {
        StorageError::failed(BackendKind::Cloud, operation, err.to_string())
    }
}

#[async_trait]
impl StorageAdapter for CloudTableAdapter {
    fn backend(&self) -> BackendKind {
        BackendKind::Cloud
    }

    fn namespace(&self) -> &str {
        &self.table
    }

    fn diagnostics(&self) -> &dyn StorageDiagnostics {
        self.diagnostics.as_ref()
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        tracing::debug!(backend = "cloud", table = %self.table, key, "get");
        self.client
            .select_value(&self.table, key)
            .await
            .map_err(|e| Self::table_error(StorageOperation::Get, e))
    }

    async fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        tracing::debug!(backend = "cloud", table = %self.table, key, "set");
        let row = TableRow {
            key: key.to_string(),
            value,
            updated_at: chrono::Utc::now(),
        };
        self.client
            .upsert(&self.table, row)
            .await
            .map_err(|e| Self::table_error(StorageOperation::Set, e))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        tracing::debug!(backend = "cloud", table = %self.table, key, "delete");
        self.client
            .delete_key(&self.table, key)
            .await
            .map_err(|e| Self::table_error(StorageOperation::Delete, e))
    }

    async fn entries(&self, prefix: Option<&str>) -> StorageResult<Vec<Entry>> {
        let rows = self
            .client
            .select_rows(&self.table, prefix)
            .await
            .map_err(|e| Self::table_error(StorageOperation::List, e))?;

        let prefix = prefix.unwrap_or("");
        let mut entries = Vec::with_capacity(rows.len());
        for raw in rows {
            match serde_json::from_value::<StoredRow>(raw.clone()) {
                // LIKE on the server may be looser than a literal prefix match.
                Ok(row) if !row.key.starts_with(prefix) => {}
                Ok(row) => entries.push(Entry {
                    key: row.key,
                    value: row.value,
                }),
                Err(e) => self.diagnostics.entry_skipped(&SkippedEntry {
                    backend: BackendKind::Cloud,
                    namespace: self.table.clone(),
                    key: raw
                        .get("key")
                        .and_then(Value::as_str)
                        .unwrap_or("<unknown>")
                        .to_string(),
                    reason: e.to_string(),
                }),
            }
        }

        tracing::debug!(
            backend = "cloud",
            table = %self.table,
            count = entries.len(),
            "list"
        );
        Ok(entries)
    }

    async fn clear(&self) -> StorageResult<()> {
        tracing::debug!(backend = "cloud", table = %self.table, "clear");
        self.client
            .delete_all(&self.table)
            .await
            .map_err(|e| Self::table_error(StorageOperation::Clear, e))
    }
}
