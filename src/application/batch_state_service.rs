//! Batch state service
//!
//! Thin façade over the batch-state and page-error stores. Field mutations
//! only; retry policy, delays, and escalation all live in
//! `JobSchedulingService`.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::batch::{BatchPageError, BatchPhase, BatchState, BatchStatus, PhaseStatus};
use crate::domain::error::BatchResult;
use crate::domain::repositories::{BatchStateRepository, PageErrorRepository};

pub struct BatchStateService {
    batches: Arc<dyn BatchStateRepository>,
    errors: Arc<dyn PageErrorRepository>,
}

impl BatchStateService {
    pub fn new(
        batches: Arc<dyn BatchStateRepository>,
        errors: Arc<dyn PageErrorRepository>,
    ) -> Self {
        Self { batches, errors }
    }

    pub async fn get_or_create(&self, batch_date: NaiveDate) -> BatchResult<BatchState> {
        self.batches.get_or_create(batch_date).await
    }

    pub async fn get_batch_state(&self, batch_id: i64) -> BatchResult<Option<BatchState>> {
        self.batches.get_by_id(batch_id).await
    }

    pub async fn get_batch_state_by_date(
        &self,
        batch_date: NaiveDate,
    ) -> BatchResult<Option<BatchState>> {
        self.batches.get_by_date(batch_date).await
    }

    pub async fn update_status(
        &self,
        batch_id: i64,
        status: BatchStatus,
        error_message: Option<&str>,
    ) -> BatchResult<()> {
        self.batches
            .update_status(batch_id, status, error_message)
            .await?;
        info!("Updated batch {} status to {}", batch_id, status);
        Ok(())
    }

    pub async fn update_phase(
        &self,
        batch_id: i64,
        phase: BatchPhase,
        status: PhaseStatus,
    ) -> BatchResult<()> {
        self.batches.update_phase(batch_id, phase, status).await?;
        debug!("Updated batch {} {} phase to {}", batch_id, phase, status);
        Ok(())
    }

    pub async fn update_progress(
        &self,
        batch_id: i64,
        processed_pages: u32,
        failed_pages: u32,
    ) -> BatchResult<()> {
        self.batches
            .update_progress(batch_id, processed_pages, failed_pages)
            .await
    }

    pub async fn set_total_pages(&self, batch_id: i64, total_pages: u32) -> BatchResult<()> {
        self.batches.set_total_pages(batch_id, total_pages).await
    }

    pub async fn set_delay(
        &self,
        batch_id: i64,
        delayed_until: DateTime<Utc>,
        retry_attempts: u32,
    ) -> BatchResult<()> {
        self.batches
            .set_delay(batch_id, delayed_until, retry_attempts)
            .await?;
        info!(
            "Set batch {} delay until {}, retry attempt {}",
            batch_id, delayed_until, retry_attempts
        );
        Ok(())
    }

    pub async fn set_manual_intervention(
        &self,
        batch_id: i64,
        required: bool,
        error_message: Option<&str>,
    ) -> BatchResult<()> {
        self.batches
            .set_manual_intervention(batch_id, required, error_message)
            .await?;
        warn!(
            "Set manual intervention for batch {}: {}",
            batch_id, required
        );
        Ok(())
    }

    /// Clear the flag; if the batch sat in `ManualIntervention` status, put
    /// it back to `Pending`.
    pub async fn clear_manual_intervention(&self, batch_id: i64) -> BatchResult<()> {
        self.batches
            .set_manual_intervention(batch_id, false, None)
            .await?;

        if let Some(state) = self.batches.get_by_id(batch_id).await? {
            if state.status == BatchStatus::ManualIntervention {
                self.batches
                    .update_status(batch_id, BatchStatus::Pending, None)
                    .await?;
            }
        }

        info!("Cleared manual intervention for batch {}", batch_id);
        Ok(())
    }

    pub async fn record_page_error(
        &self,
        batch_id: i64,
        page_number: u32,
        phase: BatchPhase,
        error_type: &str,
        error_message: &str,
    ) -> BatchResult<()> {
        self.errors
            .record(batch_id, page_number, phase, error_type, error_message)
            .await?;
        warn!(
            "Recorded error for batch {}, page {}, phase {}: {}",
            batch_id, page_number, phase, error_type
        );
        Ok(())
    }

    pub async fn get_unresolved_errors(&self, batch_id: i64) -> BatchResult<Vec<BatchPageError>> {
        self.errors.get_unresolved(batch_id).await
    }

    pub async fn mark_errors_resolved(
        &self,
        batch_id: i64,
        page_numbers: &[u32],
        phase: BatchPhase,
    ) -> BatchResult<()> {
        self.errors.mark_resolved(batch_id, page_numbers, phase).await
    }
}
