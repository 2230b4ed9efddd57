//! Remote key/value table access
//!
//! The cloud adapter talks to a single table with the columns `key` (unique
//! text), `value` (JSON) and `updated_at` (timestamp) through a
//! [`TableClient`]. [`MemoryTable`] is an in-process table store with the same
//! behaviour, used for tests and offline runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;

/// One row of the key/value table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    /// Unique key
    pub key: String,
    /// Stored JSON value
    pub value: Value,
    /// Time of the last write
    pub updated_at: DateTime<Utc>,
}

/// Failures reported by a table client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// The request never produced a response
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status
    #[error("HTTP error: {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body could not be decoded
    #[error("decode error: {0}")]
    Decode(String),
}

/// Row-level access to key/value tables
#[async_trait]
pub trait TableClient: Send + Sync {
    /// `value` of the row whose key equals `key`; `None` when there is no such row
    async fn select_value(&self, table: &str, key: &str) -> Result<Option<Value>, TableError>;

    /// Raw `{key, value}` objects of every row, or of rows whose key starts with `prefix`.
    ///
    /// Rows are returned undecoded so a single malformed row can be skipped
    /// by the caller.
    async fn select_rows(&self, table: &str, prefix: Option<&str>)
        -> Result<Vec<Value>, TableError>;

    /// Insert the row, or replace the row with the same key
    async fn upsert(&self, table: &str, row: TableRow) -> Result<(), TableError>;

    /// Delete the row with `key`; no row is not an error
    async fn delete_key(&self, table: &str, key: &str) -> Result<(), TableError>;

    /// Delete every row of the table
    async fn delete_all(&self, table: &str) -> Result<(), TableError>;
}

/// Escape `LIKE` metacharacters so `prefix` matches literally
pub fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

type Tables = HashMap<String, BTreeMap<String, Value>>;

/// In-process table store
///
/// Tables must be created before use, mirroring a provisioned database.
/// Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    tables: Arc<RwLock<Tables>>,
    fail_next: Arc<Mutex<Option<TableError>>>,
}

impl MemoryTable {
    /// Create a store without tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the given tables provisioned
    pub fn with_tables(names: &[&str]) -> Self {
        let store = Self::new();
        for name in names {
            store.create_table(name);
        }
        store
    }

    /// Provision an empty table; existing tables are left alone
    pub fn create_table(&self, name: &str) {
        if let Ok(mut tables) = self.tables.write() {
            tables.entry(name.to_string()).or_default();
        }
    }

    /// Make the next call fail with `error`
    pub fn fail_next(&self, error: TableError) {
        if let Ok(mut slot) = self.fail_next.lock() {
            *slot = Some(error);
        }
    }

    /// Store an arbitrary JSON object as the row for `key`, bypassing validation
    pub fn insert_raw(&self, table: &str, key: &str, row: Value) -> Result<(), TableError> {
        let mut tables = self.write()?;
        let rows = Self::table_mut(&mut tables, table)?;
        rows.insert(key.to_string(), row);
        Ok(())
    }

    /// Number of rows in `table`
    pub fn row_count(&self, table: &str) -> Result<usize, TableError> {
        let tables = self.read()?;
        let count = Self::table(&tables, table)?.len();
        Ok(count)
    }

    fn take_failure(&self) -> Result<(), TableError> {
        match self.fail_next.lock() {
            Ok(mut slot) => slot.take().map_or(Ok(()), Err),
            Err(_) => Err(TableError::Transport("failure slot poisoned".to_string())),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, TableError> {
        self.take_failure()?;
        self.tables
            .read()
            .map_err(|_| TableError::Transport("table lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, TableError> {
        self.take_failure()?;
        self.tables
            .write()
            .map_err(|_| TableError::Transport("table lock poisoned".to_string()))
    }

    fn missing(table: &str) -> TableError {
        TableError::Status {
            status: 404,
            message: format!("relation \"{}\" does not exist", table),
        }
    }

    fn table<'a>(tables: &'a Tables, table: &str) -> Result<&'a BTreeMap<String, Value>, TableError> {
        tables.get(table).ok_or_else(|| Self::missing(table))
    }

    fn table_mut<'a>(
        tables: &'a mut Tables,
        table: &str,
    ) -> Result<&'a mut BTreeMap<String, Value>, TableError> {
        tables.get_mut(table).ok_or_else(|| Self::missing(table))
    }
}

#[async_trait]
impl TableClient for MemoryTable {
    async fn select_value(&self, table: &str, key: &str) -> Result<Option<Value>, TableError> {
        let tables = self.read()?;
        let rows = Self::table(&tables, table)?;
        let Some(row) = rows.get(key) else {
            return Ok(None);
        };
        let value = row
            .get("value")
            .cloned()
            .ok_or_else(|| TableError::Decode(format!("row '{}' has no value column", key)))?;
        Ok(Some(value))
    }

    async fn select_rows(
        &self,
        table: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<Value>, TableError> {
        let tables = self.read()?;
        let rows = Self::table(&tables, table)?;
        let prefix = prefix.unwrap_or("");
        Ok(rows
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn upsert(&self, table: &str, row: TableRow) -> Result<(), TableError> {
        let encoded = serde_json::to_value(&row).map_err(|e| TableError::Decode(e.to_string()))?;
        let mut tables = self.write()?;
        let rows = Self::table_mut(&mut tables, table)?;
        rows.insert(row.key, encoded);
        Ok(())
    }

    async fn delete_key(&self, table: &str, key: &str) -> Result<(), TableError> {
        let mut tables = self.write()?;
        let rows = Self::table_mut(&mut tables, table)?;
        rows.remove(key);
        Ok(())
    }

    async fn delete_all(&self, table: &str) -> Result<(), TableError> {
        let mut tables = self.write()?;
        let rows = Self::table_mut(&mut tables, table)?;
        rows.clear();
        Ok(())
    }
}
