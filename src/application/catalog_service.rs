//! Catalog service
//!
//! Composes the catalog client, item store, and blob store into the two
//! page operations the job drivers invoke: register one page's worth of
//! items, and download one page's worth of images. Image work is naturally
//! idempotent: anything already present under the item's key prefix is
//! skipped.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

use crate::domain::catalog::CatalogItem;
use crate::domain::repositories::ItemRepository;
use crate::domain::services::{BlobStore, CatalogClient};
use crate::infrastructure::content_type::extension_for_content_type;

pub struct CatalogService {
    catalog: Arc<dyn CatalogClient>,
    items: Arc<dyn ItemRepository>,
    blobs: Arc<dyn BlobStore>,
}

impl CatalogService {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        items: Arc<dyn ItemRepository>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            catalog,
            items,
            blobs,
        }
    }

    /// Total page count as reported by the catalog on its first page.
    pub async fn page_count(&self) -> Result<u32> {
        let page = self
            .catalog
            .fetch_page(1)
            .await
            .context("failed to get page count from catalog")?;
        Ok(page.page_count)
    }

    /// Register one page's worth of items into the item store.
    pub async fn register_page(&self, page_number: u32) -> Result<()> {
        let page = self
            .catalog
            .fetch_page(page_number)
            .await
            .with_context(|| format!("failed to fetch catalog page {page_number}"))?;

        self.items
            .upsert_items(&page.items)
            .await
            .with_context(|| format!("failed to register items for page {page_number}"))?;

        debug!(
            "Registered {} items from page {}",
            page.items.len(),
            page_number
        );
        Ok(())
    }

    /// Download the missing images for one page's worth of items. Items
    /// without a key or image URL are skipped, as are items whose image is
    /// already present.
    pub async fn download_page_images(&self, page_number: u32) -> Result<()> {
        let page = self
            .catalog
            .fetch_page(page_number)
            .await
            .with_context(|| format!("failed to fetch catalog page {page_number}"))?;

        debug!(
            "Processing images for page {} with {} items",
            page_number,
            page.items.len()
        );

        for item in &page.items {
            let Some(image_url) = item.image_url.as_deref() else {
                debug!("Skipping item {} - no image url", item.key);
                continue;
            };
            if item.key.trim().is_empty() {
                continue;
            }

            if self.has_image(&item.key).await? {
                debug!("Image already exists for item {}, skipping", item.key);
                continue;
            }

            self.store_image(&item.key, image_url).await?;
            debug!("Stored image for item {}", item.key);
        }

        debug!("Completed image processing for page {}", page_number);
        Ok(())
    }

    /// Items registered in the store that have an image URL but no stored
    /// image yet. The image phase's idempotent work scan.
    pub async fn items_missing_images(&self) -> Result<Vec<CatalogItem>> {
        let items = self
            .items
            .get_items()
            .await
            .context("failed to list items for image scan")?;

        let total = items.len();
        let mut missing = Vec::new();
        for item in items {
            if item.key.trim().is_empty() || item.image_url.is_none() {
                continue;
            }
            if !self.has_image(&item.key).await? {
                missing.push(item);
            }
        }

        debug!(
            "Found {} items needing images out of {} total items",
            missing.len(),
            total
        );
        Ok(missing)
    }

    async fn has_image(&self, key: &str) -> Result<bool> {
        // Blob names are "{key}{ext}", so the dot-terminated prefix matches
        // any extension without matching longer keys.
        self.blobs
            .exists_with_prefix(&format!("{key}."))
            .await
            .with_context(|| format!("failed to check stored image for item {key}"))
    }

    async fn store_image(&self, key: &str, image_url: &str) -> Result<()> {
        let image = self
            .catalog
            .fetch_image(image_url)
            .await
            .with_context(|| format!("failed to download image for item {key}"))?;

        let extension = extension_for_content_type(image.content_type.as_deref());
        let blob_name = format!("{key}{extension}");

        self.blobs
            .upload(&blob_name, &image.bytes, image.content_type.as_deref())
            .await
            .with_context(|| format!("failed to store image for item {key}"))
    }
}
