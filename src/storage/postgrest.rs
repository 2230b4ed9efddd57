//! PostgREST table client
//!
//! Speaks the REST dialect exposed by PostgREST (and Supabase on top of it):
//! - `GET    /rest/v1/{table}?select=value&key=eq.{key}` - point read
//! - `POST   /rest/v1/{table}?on_conflict=key` - upsert
//! - `DELETE /rest/v1/{table}?key=eq.{key}` - point delete
//! - `GET    /rest/v1/{table}?select=key,value&key=like.{prefix}%&order=key&limit=..&offset=..` - listing
//! - `DELETE /rest/v1/{table}?key=not.is.null` - clear
//!
//! Listings are paged. The server may cap a page below the requested limit
//! (`max-rows`), so paging only stops on an empty page.

use crate::error::{BackendKind, StorageError, StorageResult};
use crate::storage::constants::DEFAULT_PAGE_SIZE;
use crate::storage::storage_cloud::CloudConfig;
use crate::storage::table::{escape_like, TableClient, TableError, TableRow};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ValueRow {
    value: Value,
}

/// Table client over the PostgREST HTTP API
#[derive(Clone)]
pub struct PostgrestClient {
    base_url: Url,
    api_key: String,
    page_size: usize,
    client: Client,
}

impl std::fmt::Debug for PostgrestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestClient")
            .field("base_url", &self.base_url.as_str())
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl PostgrestClient {
    /// Create a client for the project at `config.url`
    pub fn new(config: &CloudConfig) -> StorageResult<Self> {
        if config.url.trim().is_empty() {
            return Err(StorageError::not_configured(
                BackendKind::Cloud,
                "cloud URL is empty",
            ));
        }
        let base_url = Url::parse(&config.url).map_err(|e| {
            StorageError::not_configured(
                BackendKind::Cloud,
                format!("invalid cloud URL '{}': {}", config.url, e),
            )
        })?;
        if base_url.cannot_be_a_base() {
            return Err(StorageError::not_configured(
                BackendKind::Cloud,
                format!("cloud URL '{}' cannot carry a path", config.url),
            ));
        }
        if config.api_key.trim().is_empty() {
            return Err(StorageError::not_configured(
                BackendKind::Cloud,
                "cloud API key is empty",
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                StorageError::not_configured(
                    BackendKind::Cloud,
                    format!("failed to build HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            page_size: DEFAULT_PAGE_SIZE,
            client,
        })
    }

    /// Rows requested per listing page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn table_url(&self, table: &str) -> Result<Url, TableError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TableError::Transport(format!("'{}' cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .push("rest")
            .push("v1")
            .push(table);
        Ok(url)
    }

    fn request(&self, method: Method, table: &str) -> Result<RequestBuilder, TableError> {
        Ok(self
            .client
            .request(method, self.table_url(table)?)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key))
    }

    async fn send(request: RequestBuilder) -> Result<Response, TableError> {
        let response = request
            .send()
            .await
            .map_err(|e| TableError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
        Err(TableError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl TableClient for PostgrestClient {
    async fn select_value(&self, table: &str, key: &str) -> Result<Option<Value>, TableError> {
        let request = self
            .request(Method::GET, table)?
            .query(&[("select", "value".to_string()), ("key", format!("eq.{}", key))]);

        let rows: Vec<ValueRow> = Self::send(request)
            .await?
            .json()
            .await
            .map_err(|e| TableError::Decode(e.to_string()))?;

        Ok(rows.into_iter().next().map(|row| row.value))
    }

    async fn select_rows(
        &self,
        table: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<Value>, TableError> {
        let mut filter = vec![("select", "key,value".to_string())];
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            filter.push(("key", format!("like.{}%", escape_like(prefix))));
        }
        filter.push(("order", "key".to_string()));

        let mut rows = Vec::new();
        loop {
            let request = self
                .request(Method::GET, table)?
                .query(&filter)
                .query(&[("limit", self.page_size), ("offset", rows.len())]);

            let page: Vec<Value> = Self::send(request)
                .await?
                .json()
                .await
                .map_err(|e| TableError::Decode(e.to_string()))?;
            if page.is_empty() {
                break;
            }
            tracing::trace!(table, offset = rows.len(), count = page.len(), "fetched page");
            rows.extend(page);
        }
        Ok(rows)
    }

    async fn upsert(&self, table: &str, row: TableRow) -> Result<(), TableError> {
        let request = self
            .request(Method::POST, table)?
            .query(&[("on_conflict", "key")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row);

        Self::send(request).await.map(|_| ())
    }

    async fn delete_key(&self, table: &str, key: &str) -> Result<(), TableError> {
        let request = self
            .request(Method::DELETE, table)?
            .query(&[("key", format!("eq.{}", key))]);

        Self::send(request).await.map(|_| ())
    }

    async fn delete_all(&self, table: &str) -> Result<(), TableError> {
        let request = self
            .request(Method::DELETE, table)?
            .query(&[("key", "not.is.null")]);

        Self::send(request).await.map(|_| ())
    }
}
