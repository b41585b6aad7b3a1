//! Catalog item models
//!
//! The shapes exchanged with the external catalog API and the item store.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One entry of the external catalog, keyed by its stable catalog identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Stable identifier assigned by the catalog. Upserts key on this.
    pub key: String,
    pub title: String,
    pub creator: Option<String>,
    pub publisher: Option<String>,
    pub release_date: Option<NaiveDate>,
    /// Source URL of the item's cover image, when the catalog provides one.
    pub image_url: Option<String>,
}

/// One page of catalog results together with the catalog's reported paging.
#[derive(Debug, Clone)]
pub struct CatalogPage {
    pub page: u32,
    /// Total number of pages the catalog reports for the query.
    pub page_count: u32,
    pub items: Vec<CatalogItem>,
}

/// Raw image bytes fetched from the catalog, with the content type the
/// server declared (if any).
#[derive(Debug, Clone)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}
