//! Diagnostics channel for entries skipped during listing
//!
//! A listing never fails because of a single undecodable entry; instead the
//! entry is dropped and reported here so the condition stays observable.

use crate::error::BackendKind;
use std::sync::Mutex;

/// An entry that was dropped from a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Backend the entry lives on
    pub backend: BackendKind,
    /// Prefix or table of the adapter that skipped it
    pub namespace: String,
    /// Key as seen by the adapter (physical key for local, row key for cloud)
    pub key: String,
    /// Why decoding failed
    pub reason: String,
}

/// Receiver for skipped-entry reports
pub trait StorageDiagnostics: Send + Sync {
    /// Called once per dropped entry
    fn entry_skipped(&self, entry: &SkippedEntry);
}

/// Reports skipped entries as `tracing` warnings
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl StorageDiagnostics for TracingDiagnostics {
    fn entry_skipped(&self, entry: &SkippedEntry) {
        tracing::warn!(
            backend = %entry.backend,
            namespace = %entry.namespace,
            key = %entry.key,
            reason = %entry.reason,
            "skipping undecodable storage entry"
        );
    }
}

/// Keeps every report in memory, mostly useful in tests
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    skipped: Mutex<Vec<SkippedEntry>>,
}

impl RecordingDiagnostics {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn skipped(&self) -> Vec<SkippedEntry> {
        self.skipped
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl StorageDiagnostics for RecordingDiagnostics {
    fn entry_skipped(&self, entry: &SkippedEntry) {
        if let Ok(mut entries) = self.skipped.lock() {
            entries.push(entry.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_diagnostics() {
        let diagnostics = RecordingDiagnostics::new();
        assert!(diagnostics.skipped().is_empty());

        let entry = SkippedEntry {
            backend: BackendKind::Local,
            namespace: "app_".to_string(),
            key: "app_broken".to_string(),
            reason: "expected value at line 1 column 1".to_string(),
        };
        diagnostics.entry_skipped(&entry);
        TracingDiagnostics.entry_skipped(&entry);

        assert_eq!(diagnostics.skipped(), vec![entry]);
    }
}
