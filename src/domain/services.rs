//! External collaborator interfaces
//!
//! The catalog API client and the object store are consumed through these
//! traits only; the batch engine never depends on a concrete transport.

use async_trait::async_trait;

use crate::domain::catalog::{CatalogPage, ImageData};

/// Client for the external, rate-limited catalog API.
///
/// Calls are synchronous-per-page; the job drivers apply the mandatory
/// inter-call pacing, and implementations may add their own on top.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn fetch_page(&self, page: u32) -> anyhow::Result<CatalogPage>;

    /// Fetch the raw bytes of an item image by URL.
    async fn fetch_image(&self, url: &str) -> anyhow::Result<ImageData>;
}

/// Object storage for item images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Whether any blob exists whose name starts with `prefix`.
    async fn exists_with_prefix(&self, prefix: &str) -> anyhow::Result<bool>;

    async fn upload(
        &self,
        name: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> anyhow::Result<()>;
}
