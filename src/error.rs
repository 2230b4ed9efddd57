//! Error types for the ledgerkv library
//!
//! This module provides a unified error handling system using `thiserror` for
//! all components of the library. Storage failures carry a stable,
//! backend-prefixed code so calling features can tell a transient I/O failure
//! apart from a backend that was never configured.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for the ledgerkv library
#[derive(Error, Debug)]
pub enum Error {
    /// Storage operation errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The storage handle was requested outside of a provider scope
    #[error("storage requested outside of a StorageProvider scope")]
    OutsideProvider,

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Backend a storage error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local key/value medium
    Local,
    /// Remote key/value table
    Cloud,
}

impl BackendKind {
    /// Code prefix used for this backend
    pub const fn code_prefix(self) -> &'static str {
        match self {
            Self::Local => "LOCAL",
            Self::Cloud => "CLOUD",
        }
    }

    /// Lowercase name as used in configuration
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter operation a storage error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOperation {
    /// Read a single entry
    Get,
    /// Create or overwrite an entry
    Set,
    /// Remove an entry
    Delete,
    /// Enumerate entries
    List,
    /// Remove every entry of the namespace
    Clear,
}

impl StorageOperation {
    /// Uppercase name used inside error codes
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Set => "SET",
            Self::Delete => "DELETE",
            Self::List => "LIST",
            Self::Clear => "CLEAR",
        }
    }
}

impl fmt::Display for StorageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_lowercase())
    }
}

/// Storage-specific error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Storage operation failed against the underlying medium
    #[error("{backend} {operation} failed: {reason}")]
    OperationFailed {
        backend: BackendKind,
        operation: StorageOperation,
        reason: String,
    },

    /// Backend selected but missing the settings it needs
    #[error("{backend} storage is not configured: {reason}")]
    NotConfigured { backend: BackendKind, reason: String },
}

impl StorageError {
    /// Build an operation failure
    pub fn failed(
        backend: BackendKind,
        operation: StorageOperation,
        reason: impl Into<String>,
    ) -> Self {
        Self::OperationFailed {
            backend,
            operation,
            reason: reason.into(),
        }
    }

    /// Build a configuration failure
    pub fn not_configured(backend: BackendKind, reason: impl Into<String>) -> Self {
        Self::NotConfigured {
            backend,
            reason: reason.into(),
        }
    }

    /// Stable code, e.g. `LOCAL_GET_ERROR` or `CLOUD_NOT_CONFIGURED`
    pub fn code(&self) -> String {
        match self {
            Self::OperationFailed {
                backend, operation, ..
            } => format!("{}_{}_ERROR", backend.code_prefix(), operation.as_str()),
            Self::NotConfigured { backend, .. } => {
                format!("{}_NOT_CONFIGURED", backend.code_prefix())
            }
        }
    }

    /// Human readable message
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Backend the error came from
    pub fn backend(&self) -> BackendKind {
        match self {
            Self::OperationFailed { backend, .. } | Self::NotConfigured { backend, .. } => *backend,
        }
    }

    /// Operation that failed, if the error is tied to one
    pub fn operation(&self) -> Option<StorageOperation> {
        match self {
            Self::OperationFailed { operation, .. } => Some(*operation),
            Self::NotConfigured { .. } => None,
        }
    }

    /// Whether retrying the same call might succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::OperationFailed { .. })
    }
}

/// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, Error>;

/// Convenience type alias for Storage Results
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_codes() {
        let err = StorageError::failed(BackendKind::Local, StorageOperation::Get, "boom");
        assert_eq!(err.code(), "LOCAL_GET_ERROR");
        assert_eq!(err.operation(), Some(StorageOperation::Get));

        let err = StorageError::failed(BackendKind::Cloud, StorageOperation::Clear, "boom");
        assert_eq!(err.code(), "CLOUD_CLEAR_ERROR");
        assert_eq!(err.backend(), BackendKind::Cloud);
    }

    #[test]
    fn test_not_configured_is_not_transient() {
        let err = StorageError::not_configured(BackendKind::Cloud, "missing url");
        assert_eq!(err.code(), "CLOUD_NOT_CONFIGURED");
        assert!(!err.is_transient());
        assert!(err.operation().is_none());

        let err = StorageError::failed(BackendKind::Cloud, StorageOperation::Set, "timeout");
        assert!(err.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = StorageError::failed(BackendKind::Local, StorageOperation::List, "poisoned");
        assert_eq!(err.message(), "local list failed: poisoned");

        let error = Error::Storage(err);
        assert!(error.to_string().contains("Storage error"));
        assert!(error.to_string().contains("local list failed"));
    }
}
