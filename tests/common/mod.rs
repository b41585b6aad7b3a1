//! Shared test harness: in-memory fakes for the external collaborators and
//! a fully wired service stack over an in-memory database.

// Each integration test binary compiles its own copy; not every binary uses
// every helper.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use catalog_batch::application::{
    BatchStateService, CatalogService, JobDriver, JobKind, JobSchedulingService, JobTriggerService,
    PartialRetryService,
};
use catalog_batch::domain::catalog::{CatalogItem, CatalogPage, ImageData};
use catalog_batch::domain::repositories::{
    BatchStateRepository, ItemRepository, PageErrorRepository,
};
use catalog_batch::domain::services::{BlobStore, CatalogClient};
use catalog_batch::infrastructure::{
    DatabaseConnection, SqliteBatchStateRepository, SqlitePageErrorRepository,
};

/// Scriptable fake catalog. Pages hold a deterministic set of items; page
/// fetches can be failed per page (a number of times) or across the board.
pub struct FakeCatalogClient {
    page_count: u32,
    items_per_page: u32,
    fail_all: Mutex<bool>,
    remaining_failures: Mutex<HashMap<u32, u32>>,
    fetched_pages: Mutex<Vec<u32>>,
}

impl FakeCatalogClient {
    pub fn new(page_count: u32, items_per_page: u32) -> Self {
        Self {
            page_count,
            items_per_page,
            fail_all: Mutex::new(false),
            remaining_failures: Mutex::new(HashMap::new()),
            fetched_pages: Mutex::new(Vec::new()),
        }
    }

    /// Make every page fetch fail (catalog down) until turned off.
    pub fn set_fail_all(&self, fail: bool) {
        *self.fail_all.lock().unwrap() = fail;
    }

    /// Fail the next `times` fetches of `page`.
    pub fn fail_page(&self, page: u32, times: u32) {
        self.remaining_failures.lock().unwrap().insert(page, times);
    }

    /// Every page number passed to `fetch_page`, in call order.
    pub fn fetched_pages(&self) -> Vec<u32> {
        self.fetched_pages.lock().unwrap().clone()
    }

    pub fn item_key(page: u32, index: u32) -> String {
        format!("item-{page}-{index}")
    }
}

#[async_trait]
impl CatalogClient for FakeCatalogClient {
    async fn fetch_page(&self, page: u32) -> Result<CatalogPage> {
        self.fetched_pages.lock().unwrap().push(page);

        if *self.fail_all.lock().unwrap() {
            return Err(anyhow!("catalog unavailable"));
        }

        {
            let mut failures = self.remaining_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&page) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(anyhow!("scripted failure for page {page}"));
                }
            }
        }

        let items = (0..self.items_per_page)
            .map(|index| {
                let key = Self::item_key(page, index);
                CatalogItem {
                    key: key.clone(),
                    title: format!("Item {key}"),
                    creator: None,
                    publisher: None,
                    release_date: None,
                    image_url: Some(format!("https://img.example.com/{key}")),
                }
            })
            .collect();

        Ok(CatalogPage {
            page,
            page_count: self.page_count,
            items,
        })
    }

    async fn fetch_image(&self, url: &str) -> Result<ImageData> {
        Ok(ImageData {
            bytes: format!("image:{url}").into_bytes(),
            content_type: Some("image/jpeg".to_string()),
        })
    }
}

/// Item store backed by a map.
#[derive(Default)]
pub struct InMemoryItemRepository {
    items: Mutex<BTreeMap<String, CatalogItem>>,
}

impl InMemoryItemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.items.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ItemRepository for InMemoryItemRepository {
    async fn upsert_items(&self, items: &[CatalogItem]) -> Result<()> {
        let mut map = self.items.lock().unwrap();
        for item in items {
            map.insert(item.key.clone(), item.clone());
        }
        Ok(())
    }

    async fn get_items(&self) -> Result<Vec<CatalogItem>> {
        Ok(self.items.lock().unwrap().values().cloned().collect())
    }
}

/// Blob store backed by a name set.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<BTreeSet<String>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str) {
        self.blobs.lock().unwrap().insert(name.to_string());
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.blobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn exists_with_prefix(&self, prefix: &str) -> Result<bool> {
        Ok(self
            .blobs
            .lock()
            .unwrap()
            .iter()
            .any(|name| name.starts_with(prefix)))
    }

    async fn upload(&self, name: &str, _bytes: &[u8], _content_type: Option<&str>) -> Result<()> {
        self.blobs.lock().unwrap().insert(name.to_string());
        Ok(())
    }
}

/// Fully wired stack: sqlite-backed batch stores, fake collaborators.
pub struct Harness {
    pub batches: Arc<dyn BatchStateRepository>,
    pub errors: Arc<dyn PageErrorRepository>,
    pub batch_state: Arc<BatchStateService>,
    pub scheduling: Arc<JobSchedulingService>,
    pub partial_retry: Arc<PartialRetryService>,
    pub triggers: JobTriggerService,
    pub catalog_client: Arc<FakeCatalogClient>,
    pub items: Arc<InMemoryItemRepository>,
    pub blobs: Arc<InMemoryBlobStore>,
    pub catalog: Arc<CatalogService>,
}

impl Harness {
    pub async fn new(page_count: u32, items_per_page: u32) -> Self {
        let db = DatabaseConnection::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();

        let batches: Arc<dyn BatchStateRepository> =
            Arc::new(SqliteBatchStateRepository::new(db.pool().clone()));
        let errors: Arc<dyn PageErrorRepository> =
            Arc::new(SqlitePageErrorRepository::new(db.pool().clone()));

        let batch_state = Arc::new(BatchStateService::new(
            Arc::clone(&batches),
            Arc::clone(&errors),
        ));
        let scheduling = Arc::new(JobSchedulingService::new(Arc::clone(&batches)));
        let partial_retry = Arc::new(PartialRetryService::new(
            Arc::clone(&batches),
            Arc::clone(&errors),
        ));
        let triggers = JobTriggerService::new(
            Arc::clone(&batch_state),
            Arc::clone(&scheduling),
            Arc::clone(&partial_retry),
        );

        let catalog_client = Arc::new(FakeCatalogClient::new(page_count, items_per_page));
        let items = Arc::new(InMemoryItemRepository::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let catalog = Arc::new(CatalogService::new(
            Arc::clone(&catalog_client) as Arc<dyn CatalogClient>,
            Arc::clone(&items) as Arc<dyn ItemRepository>,
            Arc::clone(&blobs) as Arc<dyn BlobStore>,
        ));

        Self {
            batches,
            errors,
            batch_state,
            scheduling,
            partial_retry,
            triggers,
            catalog_client,
            items,
            blobs,
            catalog,
        }
    }

    /// Driver with no inter-page delay, so test loops run immediately.
    pub fn driver(&self, kind: JobKind) -> JobDriver {
        JobDriver::new(
            kind,
            Arc::clone(&self.catalog),
            Arc::clone(&self.batch_state),
            Arc::clone(&self.scheduling),
        )
        .with_rate_limit(Duration::ZERO)
    }

    /// All item keys expected for the fake catalog's pages.
    pub fn all_item_keys(page_count: u32, items_per_page: u32) -> HashSet<String> {
        let mut keys = HashSet::new();
        for page in 1..=page_count {
            for index in 0..items_per_page {
                keys.insert(FakeCatalogClient::item_key(page, index));
            }
        }
        keys
    }
}
