//! Repository interfaces for batch ingestion
//!
//! Contains trait definitions for the data access patterns of the batch
//! engine. The batch-state and page-error stores return typed errors so
//! callers can distinguish a missing batch from a storage failure; the item
//! store is an external collaborator and keeps the looser `anyhow` contract.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::batch::{BatchPageError, BatchPhase, BatchState, BatchStatus, PhaseStatus};
use crate::domain::catalog::CatalogItem;
use crate::domain::error::BatchResult;

/// Store for `BatchState` rows, one per calendar date.
#[async_trait]
pub trait BatchStateRepository: Send + Sync {
    /// Return the batch for `batch_date`, creating a fresh pending one if
    /// none exists. Never fails on a missing row.
    async fn get_or_create(&self, batch_date: NaiveDate) -> BatchResult<BatchState>;

    async fn get_by_id(&self, batch_id: i64) -> BatchResult<Option<BatchState>>;

    async fn get_by_date(&self, batch_date: NaiveDate) -> BatchResult<Option<BatchState>>;

    /// Overwrite status and error message. The error message is replaced
    /// with the given value even when `None`.
    async fn update_status(
        &self,
        batch_id: i64,
        status: BatchStatus,
        error_message: Option<&str>,
    ) -> BatchResult<()>;

    async fn update_phase(
        &self,
        batch_id: i64,
        phase: BatchPhase,
        status: PhaseStatus,
    ) -> BatchResult<()>;

    async fn update_progress(
        &self,
        batch_id: i64,
        processed_pages: u32,
        failed_pages: u32,
    ) -> BatchResult<()>;

    async fn set_total_pages(&self, batch_id: i64, total_pages: u32) -> BatchResult<()>;

    /// Move the batch into `Delayed` until the given instant, recording the
    /// retry attempt count.
    async fn set_delay(
        &self,
        batch_id: i64,
        delayed_until: DateTime<Utc>,
        retry_attempts: u32,
    ) -> BatchResult<()>;

    /// Reset the retry budget: `delayed_until` becomes now and
    /// `retry_attempts` zero, without touching the batch status.
    async fn reset_retry_state(&self, batch_id: i64) -> BatchResult<()>;

    /// Set or clear the manual-intervention flag. Setting it also moves the
    /// batch status to `ManualIntervention`; clearing leaves status alone.
    async fn set_manual_intervention(
        &self,
        batch_id: i64,
        required: bool,
        error_message: Option<&str>,
    ) -> BatchResult<()>;

    /// All delayed batches whose delay has elapsed, with auto-resume enabled
    /// and no manual intervention pending.
    async fn get_ready_to_resume(&self) -> BatchResult<Vec<BatchState>>;
}

/// Store for per-page failure records, unique per (batch, page, phase).
#[async_trait]
pub trait PageErrorRepository: Send + Sync {
    /// Record a page failure. Upserts on the unique triple, refreshing the
    /// error classification and last-retry timestamp of an existing row.
    async fn record(
        &self,
        batch_id: i64,
        page_number: u32,
        phase: BatchPhase,
        error_type: &str,
        error_message: &str,
    ) -> BatchResult<()>;

    async fn get_unresolved(&self, batch_id: i64) -> BatchResult<Vec<BatchPageError>>;

    async fn mark_resolved(
        &self,
        batch_id: i64,
        page_numbers: &[u32],
        phase: BatchPhase,
    ) -> BatchResult<()>;

    /// Delete error rows so the pages can be retried without a resolved
    /// history.
    async fn delete(
        &self,
        batch_id: i64,
        page_numbers: &[u32],
        phase: BatchPhase,
    ) -> BatchResult<()>;
}

/// Durable store for registered catalog items. External collaborator; any
/// row store with key-based upsert satisfies this.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Idempotent upsert keyed on `CatalogItem::key`.
    async fn upsert_items(&self, items: &[CatalogItem]) -> anyhow::Result<()>;

    async fn get_items(&self) -> anyhow::Result<Vec<CatalogItem>>;
}
