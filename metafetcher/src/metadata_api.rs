//! Product metadata API module
//!
//! Pages through a JSON endpoint (`<endpoint>?page=<n>`) that serves arrays of
//! product metadata objects and normalizes them into
//! [`flowstore::models::MetadataRecord`]s.

use async_trait::async_trait;
use flowstore::fetch::MetadataSource;
use flowstore::models::{DEFAULT_AVAILABILITY, DEFAULT_DESCRIPTION, DEFAULT_RATING, MetadataRecord};
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_PAGES: u32 = 5;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Custom error types for metadata API operations
#[derive(Error, Debug)]
pub enum MetaFetchError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("JSON deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

pub type Result<T> = std::result::Result<T, MetaFetchError>;

#[derive(Clone, Debug)]
pub struct MetadataClientConfig {
    pub endpoint: String,
    pub max_pages: u32,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl MetadataClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            max_pages: DEFAULT_MAX_PAGES,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One element of a page, as served. Every field is optional and loosely typed.
#[derive(Clone, Debug, Default, Deserialize)]
struct ApiProduct {
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    product_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_float")]
    rating: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    availability_status: Option<String>,
}

impl ApiProduct {
    fn into_record(self) -> Option<MetadataRecord> {
        let id = self.id?.trim().to_string();
        if id.is_empty() {
            return None;
        }
        Some(MetadataRecord {
            id,
            product_id_api: self.product_id.unwrap_or_default(),
            description: self
                .description
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            rating: self.rating.unwrap_or(DEFAULT_RATING),
            availability_status: self
                .availability_status
                .unwrap_or_else(|| DEFAULT_AVAILABILITY.to_string()),
        })
    }
}

/// Client for the paginated product metadata endpoint
#[derive(Clone, Debug)]
pub struct MetadataClient {
    http_client: reqwest::Client,
    config: MetadataClientConfig,
}

impl MetadataClient {
    pub fn new(config: MetadataClientConfig) -> Result<Self> {
        reqwest::Url::parse(&config.endpoint).map_err(|e| {
            MetaFetchError::InvalidParameters(format!("endpoint '{}': {}", config.endpoint, e))
        })?;
        let http_client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &MetadataClientConfig {
        &self.config
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<ApiProduct>> {
        let response = self
            .http_client
            .get(&self.config.endpoint)
            .query(&[("page", page)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetaFetchError::ApiError(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            )));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetches up to `max_pages` pages and returns every record collected.
    ///
    /// The loop stops early on an empty page, on a page that brings no new
    /// `id`, and on any request, status or decoding failure. Failures are
    /// logged; whatever was gathered before them is still returned.
    pub async fn fetch_all(&self) -> Vec<MetadataRecord> {
        let mut records = Vec::new();
        let mut seen_ids = HashSet::new();

        for page in 1..=self.config.max_pages {
            let items = match self.fetch_page(page).await {
                Ok(items) => items,
                Err(e) => {
                    log::error!("Metadata API request for page {} failed: {}", page, e);
                    break;
                }
            };
            if items.is_empty() {
                log::info!("No more data available from API.");
                break;
            }

            let page_records: Vec<MetadataRecord> =
                items.into_iter().filter_map(ApiProduct::into_record).collect();
            let new_ids = page_records
                .iter()
                .filter(|record| !seen_ids.contains(&record.id))
                .map(|record| record.id.clone())
                .collect::<HashSet<_>>();
            if new_ids.is_empty() {
                log::warn!(
                    "Page {} brought no new metadata ids; stopping pagination.",
                    page
                );
                break;
            }

            log::debug!("Fetched {} metadata records from page {}.", page_records.len(), page);
            seen_ids.extend(new_ids);
            records.extend(page_records);
        }

        if records.is_empty() {
            log::warn!("No records fetched from API.");
        }
        records
    }
}

#[async_trait]
impl MetadataSource for MetadataClient {
    fn name(&self) -> &'static str {
        "metadata-api"
    }

    async fn fetch_metadata(&self) -> Vec<MetadataRecord> {
        self.fetch_all().await
    }
}

/// Accepts strings and numbers; anything else becomes `None`.
fn deserialize_optional_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: serde_json::Value = Deserialize::deserialize(deserializer)?;

    match value {
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        serde_json::Value::Bool(b) => Ok(Some(b.to_string())),
        _ => Ok(None),
    }
}

/// Numbers and numeric strings; unparsable values become `None`.
fn deserialize_optional_float<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: serde_json::Value = Deserialize::deserialize(deserializer)?;

    match value {
        serde_json::Value::Number(n) => Ok(n.as_f64()),
        serde_json::Value::String(s) => Ok(s.trim().parse::<f64>().ok().filter(|f| f.is_finite())),
        _ => Ok(None),
    }
}
