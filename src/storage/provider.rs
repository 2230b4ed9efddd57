//! Storage injection point
//!
//! [`StorageProvider`] owns the one active adapter. Application code never
//! builds adapters itself; it either holds the provider or looks the adapter
//! up with [`use_storage`] from inside [`StorageProvider::scope`].
//!
//! Switching backends replaces the adapter atomically. Operations already
//! issued against the previous adapter keep running against it to
//! completion; nothing drains or cancels them. Callers that care can compare
//! [`StorageProvider::generation`] before and after their work.

use crate::error::{BackendKind, Error, Result, StorageResult};
use crate::storage::adapter::StorageAdapter;
use crate::storage::config::{BackendChoice, BackendConfig, StorageSettings};
use crate::storage::diagnostics::{StorageDiagnostics, TracingDiagnostics};
use crate::storage::medium::{LocalMedium, MemoryMedium};
use crate::storage::storage_cloud::CloudTableAdapter;
use crate::storage::storage_local::LocalStorageAdapter;
use crate::storage::table::TableClient;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared handle to an adapter
pub type SharedAdapter = Arc<dyn StorageAdapter>;

tokio::task_local! {
    static CURRENT_PROVIDER: Arc<StorageProvider>;
}

/// Storage factory for creating adapter instances
pub struct StorageFactory {
    local_medium: Arc<dyn LocalMedium>,
    table_client: Option<Arc<dyn TableClient>>,
    diagnostics: Arc<dyn StorageDiagnostics>,
}

impl Default for StorageFactory {
    fn default() -> Self {
        Self::new(Arc::new(MemoryMedium::new()))
    }
}

impl StorageFactory {
    /// Factory whose local adapters share `local_medium`
    pub fn new(local_medium: Arc<dyn LocalMedium>) -> Self {
        Self {
            local_medium,
            table_client: None,
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    /// Use `client` for cloud adapters instead of connecting over HTTP
    pub fn with_table_client(mut self, client: Arc<dyn TableClient>) -> Self {
        self.table_client = Some(client);
        self
    }

    /// Diagnostics sink handed to every adapter built
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn StorageDiagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Build the adapter described by `config`
    pub fn build(&self, config: &BackendConfig) -> StorageResult<SharedAdapter> {
        match config {
            BackendConfig::Local(local) => {
                let adapter = LocalStorageAdapter::new(local.clone(), self.local_medium.clone())
                    .with_diagnostics(self.diagnostics.clone());
                Ok(Arc::new(adapter))
            }
            BackendConfig::Cloud(cloud) => {
                let adapter = match &self.table_client {
                    Some(client) => CloudTableAdapter::with_client(cloud.table.clone(), client.clone()),
                    None => CloudTableAdapter::connect(cloud)?,
                };
                Ok(Arc::new(adapter.with_diagnostics(self.diagnostics.clone())))
            }
        }
    }
}

struct Active {
    settings: StorageSettings,
    adapter: SharedAdapter,
    generation: u64,
}

/// Owner of the active storage adapter
pub struct StorageProvider {
    factory: StorageFactory,
    active: RwLock<Active>,
}

impl StorageProvider {
    /// Build the adapter selected by `settings` and take ownership of it
    pub fn new(factory: StorageFactory, settings: StorageSettings) -> StorageResult<Self> {
        let adapter = factory.build(&settings.resolve()?)?;
        tracing::info!(
            backend = %adapter.backend(),
            namespace = adapter.namespace(),
            "storage provider initialised"
        );
        Ok(Self {
            factory,
            active: RwLock::new(Active {
                settings,
                adapter,
                generation: 0,
            }),
        })
    }

    /// Switch to the backend described by `settings`.
    ///
    /// Nothing changes when the settings equal the current ones. On failure
    /// the previous adapter stays active. Returns the current generation.
    pub fn select(&self, settings: StorageSettings) -> StorageResult<u64> {
        {
            let active = self.active.read().unwrap_or_else(PoisonError::into_inner);
            if active.settings == settings {
                return Ok(active.generation);
            }
        }

        let adapter = self.factory.build(&settings.resolve()?)?;
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        // A concurrent call may have installed the same settings meanwhile.
        if active.settings == settings {
            return Ok(active.generation);
        }
        active.generation += 1;
        tracing::info!(
            from = %BackendKind::from(active.settings.backend),
            to = %adapter.backend(),
            namespace = adapter.namespace(),
            generation = active.generation,
            "switching storage backend"
        );
        active.settings = settings;
        active.adapter = adapter;
        Ok(active.generation)
    }

    /// Handle to the active adapter
    pub fn adapter(&self) -> SharedAdapter {
        let active = self.active.read().unwrap_or_else(PoisonError::into_inner);
        active.adapter.clone()
    }

    /// Currently selected backend
    pub fn choice(&self) -> BackendChoice {
        let active = self.active.read().unwrap_or_else(PoisonError::into_inner);
        active.settings.backend
    }

    /// Settings the active adapter was built from
    pub fn settings(&self) -> StorageSettings {
        let active = self.active.read().unwrap_or_else(PoisonError::into_inner);
        active.settings.clone()
    }

    /// Number of backend switches so far
    pub fn generation(&self) -> u64 {
        let active = self.active.read().unwrap_or_else(PoisonError::into_inner);
        active.generation
    }

    /// Run `future` with this provider available to [`use_storage`].
    ///
    /// The provider is bound to the current task only; tasks spawned from
    /// inside need their own scope.
    pub async fn scope<F>(self: Arc<Self>, future: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_PROVIDER.scope(self, future).await
    }
}

/// Provider of the enclosing [`StorageProvider::scope`]
pub fn try_current_provider() -> Result<Arc<StorageProvider>> {
    CURRENT_PROVIDER
        .try_with(Arc::clone)
        .map_err(|_| Error::OutsideProvider)
}

/// Active adapter of the enclosing scope, or [`Error::OutsideProvider`]
pub fn try_use_storage() -> Result<SharedAdapter> {
    try_current_provider().map(|provider| provider.adapter())
}

/// Active adapter of the enclosing scope.
///
/// # Panics
///
/// Panics when called outside [`StorageProvider::scope`]; that is a wiring
/// bug, not a storage failure.
pub fn use_storage() -> SharedAdapter {
    match try_use_storage() {
        Ok(adapter) => adapter,
        Err(e) => panic!("{}", e),
    }
}
