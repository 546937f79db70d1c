//! HTTP access to the dataset endpoints.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use evolf_common::http::{check_response, read_json};
use evolf_common::{ApiClient, ApiConfig, EvolfError, Result, ValidationError};

use crate::models::{DatasetDetail, DatasetPage, DatasetQuery, RawPage, SearchResponse};

/// Where a [`DetailContext`](crate::DetailContext) loads records from.
#[async_trait]
pub trait DetailSource: Send + Sync {
    async fn fetch_detail(&self, evolf_id: &str) -> Result<DatasetDetail>;
}

/// reqwest-backed dataset client.
#[derive(Debug, Clone)]
pub struct DatasetClient {
    api: ApiClient,
}

impl DatasetClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Ok(Self { api: ApiClient::new(config)? })
    }

    pub fn from_api(api: ApiClient) -> Self {
        Self { api }
    }

    /// One page of the listing.
    pub async fn fetch_page(&self, query: &DatasetQuery) -> Result<DatasetPage> {
        let mut url = self.api.url(&["dataset"], true);
        url.query_pairs_mut().extend_pairs(query.query_pairs());

        let raw: RawPage = read_json(self.api.get(url).send().await?).await?;
        let page = raw.into_page(query);
        debug!(
            "Dataset page {}/{}: {} entries",
            page.pagination.current_page,
            page.pagination.total_pages,
            page.entries.len()
        );
        Ok(page)
    }

    /// Total number of rows in the dataset.
    pub async fn count(&self) -> Result<u64> {
        let url = self.api.url(&["dataset", "count"], false);
        let body: Value = read_json(self.api.get(url).send().await?).await?;
        parse_count(&body)
            .ok_or_else(|| EvolfError::Other(anyhow::anyhow!("Unexpected count response: {}", body)))
    }

    /// Zip of a single entry.
    pub async fn export_entry(&self, evolf_id: &str) -> Result<Vec<u8>> {
        let evolf_id = require_id(evolf_id)?;
        let url = self.api.url(&["dataset", "export", evolf_id], true);
        let bytes = self.download(url).await?;
        info!("Exported entry {} ({} bytes)", evolf_id, bytes.len());
        Ok(bytes)
    }

    /// Zip of the selected entries.
    pub async fn export_entries(&self, evolf_ids: &[String]) -> Result<Vec<u8>> {
        let ids: Vec<&str> = evolf_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .collect();
        if ids.is_empty() {
            return Err(ValidationError::NoExportIds.into());
        }

        let url = self.api.url(&["dataset", "export"], false);
        let resp = self.api.post(url).json(&json!({ "evolfIds": ids })).send().await?;
        let bytes = check_response(resp).await?.bytes().await?;
        info!("Exported {} entries ({} bytes)", ids.len(), bytes.len());
        Ok(bytes.to_vec())
    }

    /// Zip of the whole dataset.
    pub async fn download_complete(&self) -> Result<Vec<u8>> {
        let url = self.api.url(&["dataset", "download"], false);
        let bytes = self.download(url).await?;
        info!("Downloaded complete dataset ({} bytes)", bytes.len());
        Ok(bytes)
    }

    /// Free-text search. A blank query returns no hits without calling
    /// the backend.
    pub async fn search(&self, query: &str) -> Result<SearchResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchResponse::default());
        }

        let mut url = self.api.url(&["search"], true);
        url.query_pairs_mut().append_pair("q", query);
        let results: SearchResponse = read_json(self.api.get(url).send().await?).await?;
        debug!("Search '{}' returned {} hits", query, results.results.len());
        Ok(results)
    }

    async fn download(&self, url: Url) -> Result<Vec<u8>> {
        let resp = check_response(self.api.get(url).send().await?).await?;
        Ok(resp.bytes().await?.to_vec())
    }
}

#[async_trait]
impl DetailSource for DatasetClient {
    async fn fetch_detail(&self, evolf_id: &str) -> Result<DatasetDetail> {
        let evolf_id = require_id(evolf_id)?;
        let url = self.api.url(&["dataset", "details", evolf_id], true);
        let detail: DatasetDetail = read_json(self.api.get(url).send().await?).await?;
        Ok(detail.normalize())
    }
}

fn require_id(evolf_id: &str) -> Result<&str> {
    let trimmed = evolf_id.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyEvolfId.into());
    }
    Ok(trimmed)
}

/// Accepts a bare number or an object carrying the total under one of the
/// names the backend has used.
fn parse_count(body: &Value) -> Option<u64> {
    if let Some(n) = body.as_u64() {
        return Some(n);
    }
    ["count", "total", "totalItems", "totalRows"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_u64))
}
