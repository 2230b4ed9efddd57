//! # ledgerkv
//!
//! Pluggable key/value persistence for the business-management console.
//! Feature code (clients, products, billing, ...) stores JSON documents
//! through one [`storage::StorageAdapter`] and never touches the medium
//! underneath.
//!
//! ## Features
//!
//! - **Local backend**: an origin-wide string medium (in memory or a JSON file), namespaced by key prefix
//! - **Cloud backend**: a remote `key`/`value`/`updated_at` table over PostgREST, namespaced by table
//! - **Provider**: owns the active adapter and swaps it when the user switches backend
//!
//! ## Optional Features
//!
//! - `cloud` (default): PostgREST network client built on `reqwest`
//!
//! ## Example
//!
//! ```rust
//! use ledgerkv::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let provider = Arc::new(StorageProvider::new(
//!     StorageFactory::default(),
//!     StorageSettings::local("shop_"),
//! )?);
//!
//! provider
//!     .scope(async {
//!         let storage = use_storage();
//!         storage.set("client:1", json!({"name": "Acme"})).await?;
//!         assert_eq!(storage.list(Some("client:")).await?.len(), 1);
//!         Ok::<_, StorageError>(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(clippy::all)]

// Re-export core error types
pub use error::{Error, Result};

// Core modules
pub mod error;
pub mod storage;
pub mod telemetry;

// Re-export commonly used types
pub mod prelude {
    //! Common types and traits for convenient importing

    pub use crate::error::{BackendKind, Error, Result, StorageError, StorageResult};
    pub use crate::storage::{
        use_storage, BackendChoice, StorageAdapter, StorageAdapterExt, StorageFactory,
        StorageProvider, StorageSettings,
    };
}

// Version information
/// The version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert_eq!(CRATE_NAME, "ledgerkv");
    }
}
