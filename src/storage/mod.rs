//! Storage module for key/value persistence
//!
//! This module provides a unified storage interface with two backend implementations:
//! - **Local storage** - A synchronous origin-wide string medium, namespaced by key prefix
//! - **Cloud storage** - A remote key/value table reached over PostgREST, namespaced by table
//!
//! The storage module follows a trait-based design: every backend implements
//! [`StorageAdapter`], and the application obtains the single active adapter
//! from a [`StorageProvider`] instead of constructing one itself.
//!
//! # Features
//!
//! - Uniform async API (`get`, `set`, `delete`, `list`, `clear`) over sync and network media
//! - Backend-prefixed error codes (`LOCAL_GET_ERROR`, `CLOUD_LIST_ERROR`, ...)
//! - Listings that skip corrupt entries and report them to a diagnostics sink
//! - Runtime backend switching through a provider
//!
//! # Examples
//!
//! ## Local Storage
//!
//! ```rust
//! use ledgerkv::storage::{LocalConfig, LocalStorageAdapter, MemoryMedium, StorageAdapter};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let medium = Arc::new(MemoryMedium::new());
//! let storage = LocalStorageAdapter::new(LocalConfig::default(), medium);
//!
//! storage.set("client:1", json!({"name": "Acme"})).await?;
//! assert_eq!(storage.get("client:1").await?, Some(json!({"name": "Acme"})));
//! assert_eq!(storage.list(Some("client:")).await?.len(), 1);
//!
//! storage.delete("client:1").await?;
//! assert_eq!(storage.get("client:1").await?, None);
//! # Ok(())
//! # }
//! ```
//!
//! ## Cloud Storage (requires `cloud` feature)
//!
//! ```rust,ignore
//! use ledgerkv::storage::{CloudConfig, CloudTableAdapter, StorageAdapter};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CloudConfig {
//!         url: "https://xyz.supabase.co".to_string(),
//!         api_key: std::env::var("BIZ_CLOUD_KEY")?,
//!         ..Default::default()
//!     };
//!     let storage = CloudTableAdapter::connect(&config)?;
//!
//!     storage.set("product:7", json!({"sku": "W-7"})).await?;
//!     let products = storage.list(Some("product:")).await?;
//!
//!     Ok(())
//! }
//! ```

// Core storage API and types
pub mod adapter;
pub mod config;
pub mod diagnostics;
pub mod provider;

// Storage backend implementations
pub mod medium;
pub mod storage_cloud;
pub mod storage_local;
pub mod table;

#[cfg(feature = "cloud")]
pub mod postgrest;

// Re-export main types for convenience
pub use adapter::{Entry, StorageAdapter, StorageAdapterExt};
pub use config::{BackendChoice, BackendConfig, StorageSettings};
pub use diagnostics::{RecordingDiagnostics, SkippedEntry, StorageDiagnostics, TracingDiagnostics};
pub use medium::{FileMedium, LocalMedium, MediumError, MemoryMedium};
pub use provider::{
    try_current_provider, try_use_storage, use_storage, SharedAdapter, StorageFactory,
    StorageProvider,
};
pub use storage_cloud::{CloudConfig, CloudTableAdapter};
pub use storage_local::{LocalConfig, LocalStorageAdapter};
pub use table::{MemoryTable, TableClient, TableError, TableRow};

#[cfg(feature = "cloud")]
pub use postgrest::PostgrestClient;

pub use crate::error::{StorageError, StorageResult};

/// Storage constants
pub mod constants {
    //! Constants used throughout the storage module

    /// Key prefix used by local adapters unless configured otherwise
    pub const DEFAULT_LOCAL_PREFIX: &str = "bizconsole_";

    /// Table used by cloud adapters unless configured otherwise
    pub const DEFAULT_CLOUD_TABLE: &str = "kv_store";

    /// Default timeout for cloud requests in seconds
    pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

    /// Rows requested per page when listing a cloud table
    pub const DEFAULT_PAGE_SIZE: usize = 1000;
}

/// High-level storage utilities
pub mod utils {
    use super::*;
    use futures::future::try_join_all;

    /// Copy every entry under `prefix` from one adapter to another (one-way).
    ///
    /// Returns the copied keys. Entries already present in `destination` are
    /// overwritten; entries only present there are left alone.
    pub async fn copy_namespace(
        source: &dyn StorageAdapter,
        destination: &dyn StorageAdapter,
        prefix: Option<&str>,
    ) -> StorageResult<Vec<String>> {
        let entries = source.entries(prefix).await?;
        tracing::info!(
            from = %source.backend(),
            to = %destination.backend(),
            count = entries.len(),
            "copying storage namespace"
        );

        let keys: Vec<String> = entries.iter().map(|entry| entry.key.clone()).collect();
        try_join_all(
            entries
                .into_iter()
                .map(|entry| async move { destination.set(&entry.key, entry.value).await }),
        )
        .await?;

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_constants() {
        assert_eq!(constants::DEFAULT_LOCAL_PREFIX, "bizconsole_");
        assert_eq!(constants::DEFAULT_CLOUD_TABLE, "kv_store");
        assert_eq!(constants::DEFAULT_TIMEOUT_SECONDS, 30);
        assert_eq!(constants::DEFAULT_PAGE_SIZE, 1000);
    }

    #[tokio::test]
    async fn test_copy_namespace_local_to_cloud() {
        let local = LocalStorageAdapter::new(LocalConfig::default(), Arc::new(MemoryMedium::new()));
        let cloud = CloudTableAdapter::with_client(
            "kv_store",
            Arc::new(MemoryTable::with_tables(&["kv_store"])),
        );

        local.set("client:1", json!({"name": "Acme"})).await.unwrap();
        local.set("client:2", json!({"name": "Globex"})).await.unwrap();
        local.set("product:1", json!({"sku": "W"})).await.unwrap();

        let mut copied = utils::copy_namespace(&local, &cloud, Some("client:"))
            .await
            .unwrap();
        copied.sort();
        assert_eq!(copied, vec!["client:1".to_string(), "client:2".to_string()]);

        assert_eq!(
            cloud.get("client:2").await.unwrap(),
            Some(json!({"name": "Globex"}))
        );
        assert_eq!(cloud.get("product:1").await.unwrap(), None);
    }
}
