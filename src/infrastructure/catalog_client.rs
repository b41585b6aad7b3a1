//! HTTP client for the external catalog API
//!
//! Speaks a minimal JSON shape: a page request returns the page's items plus
//! the catalog's reported total page count. The client enforces its own
//! request timeout; inter-page pacing is the job drivers' responsibility.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::domain::catalog::{CatalogItem, CatalogPage, ImageData};
use crate::domain::services::CatalogClient;
use crate::infrastructure::config::CatalogConfig;

pub struct HttpCatalogClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    items: Vec<ItemPayload>,
    #[serde(rename = "pageCount")]
    page_count: u32,
    page: u32,
}

#[derive(Debug, Deserialize)]
struct ItemPayload {
    key: String,
    title: String,
    creator: Option<String>,
    publisher: Option<String>,
    #[serde(rename = "releaseDate")]
    release_date: Option<NaiveDate>,
    #[serde(rename = "imageUrl")]
    image_url: Option<String>,
}

impl From<ItemPayload> for CatalogItem {
    fn from(payload: ItemPayload) -> Self {
        Self {
            key: payload.key,
            title: payload.title,
            creator: payload.creator,
            publisher: payload.publisher,
            release_date: payload.release_date,
            image_url: payload.image_url,
        }
    }
}

impl HttpCatalogClient {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("invalid catalog base url: {}", config.base_url))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .context("failed to build catalog http client")?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    fn page_url(&self, page: u32) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("sort", "+releaseDate");
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("apiKey", key);
        }
        url
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn fetch_page(&self, page: u32) -> Result<CatalogPage> {
        let url = self.page_url(page);
        debug!("Fetching catalog page {}", page);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("catalog request failed for page {page}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "catalog returned {status} for page {page}: {body}"
            ));
        }

        let payload: PageResponse = response
            .json()
            .await
            .with_context(|| format!("invalid catalog response for page {page}"))?;

        Ok(CatalogPage {
            page: payload.page,
            page_count: payload.page_count,
            items: payload.items.into_iter().map(CatalogItem::from).collect(),
        })
    }

    async fn fetch_image(&self, url: &str) -> Result<ImageData> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("image request failed for {url}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("image fetch returned {status} for {url}"));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read image body for {url}"))?;

        Ok(ImageData {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}
