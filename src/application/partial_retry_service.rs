//! Partial retry service
//!
//! Checkpoint reset and error-page requery logic. Operators repair a batch
//! either by resetting an explicit page range or by resetting exactly the
//! pages that currently hold unresolved errors; a full reset wipes progress
//! for a clean-slate rerun.
//!
//! Note the deliberate asymmetry: `reset_page_range` leaves the
//! `failed_pages` counter alone (the caller may reset pages that never
//! failed), while `reset_error_pages` decrements it by the number of error
//! pages cleared.

use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::batch::{BatchPageError, BatchPhase, BatchStatus, PhaseStatus, RetryStatistics};
use crate::domain::error::{BatchError, BatchResult};
use crate::domain::repositories::{BatchStateRepository, PageErrorRepository};

pub struct PartialRetryService {
    batches: Arc<dyn BatchStateRepository>,
    errors: Arc<dyn PageErrorRepository>,
}

impl PartialRetryService {
    pub fn new(
        batches: Arc<dyn BatchStateRepository>,
        errors: Arc<dyn PageErrorRepository>,
    ) -> Self {
        Self { batches, errors }
    }

    /// Delete error records for every page in `[start_page, end_page]` for
    /// the given phase so those pages can be reprocessed.
    pub async fn reset_page_range(
        &self,
        batch_id: i64,
        start_page: u32,
        end_page: u32,
        phase: BatchPhase,
    ) -> BatchResult<()> {
        if start_page < 1 || end_page < start_page {
            return Err(BatchError::InvalidPageRange {
                start: start_page,
                end: end_page,
            });
        }

        if self.batches.get_by_id(batch_id).await?.is_none() {
            return Err(BatchError::BatchNotFound(batch_id));
        }

        let page_numbers: Vec<u32> = (start_page..=end_page).collect();
        self.errors.delete(batch_id, &page_numbers, phase).await?;

        info!(
            "Reset page range {}-{} for batch {}, phase {}",
            start_page, end_page, batch_id, phase
        );
        Ok(())
    }

    /// Sorted, de-duplicated page numbers with unresolved errors for the
    /// given phase.
    pub async fn get_error_pages(&self, batch_id: i64, phase: BatchPhase) -> BatchResult<Vec<u32>> {
        let errors = self.errors.get_unresolved(batch_id).await?;
        let mut pages: Vec<u32> = errors
            .into_iter()
            .filter(|e| e.phase == phase)
            .map(|e| e.page_number)
            .collect();
        pages.sort_unstable();
        pages.dedup();

        if !pages.is_empty() {
            info!(
                "Found {} error pages for batch {}, phase {}: {:?}",
                pages.len(),
                batch_id,
                phase,
                pages
            );
        }

        Ok(pages)
    }

    /// Reset exactly the pages with unresolved errors, decrementing the
    /// failed-pages counter by the number of pages cleared (floored at zero).
    pub async fn reset_error_pages(&self, batch_id: i64, phase: BatchPhase) -> BatchResult<()> {
        let pages = self.get_error_pages(batch_id, phase).await?;
        if pages.is_empty() {
            info!(
                "No error pages to reset for batch {}, phase {}",
                batch_id, phase
            );
            return Ok(());
        }

        self.errors.delete(batch_id, &pages, phase).await?;

        if let Some(state) = self.batches.get_by_id(batch_id).await? {
            let new_failed = state.failed_pages.saturating_sub(pages.len() as u32);
            self.batches
                .update_progress(batch_id, state.processed_pages, new_failed)
                .await?;
        }

        info!(
            "Reset {} error pages for batch {}, phase {}",
            pages.len(),
            batch_id,
            phase
        );
        Ok(())
    }

    /// Record current progress for recovery.
    pub async fn mark_checkpoint(
        &self,
        batch_id: i64,
        processed_pages: u32,
        failed_pages: u32,
    ) -> BatchResult<()> {
        self.batches
            .update_progress(batch_id, processed_pages, failed_pages)
            .await?;
        debug!(
            "Checkpoint marked for batch {}: processed={}, failed={}",
            batch_id, processed_pages, failed_pages
        );
        Ok(())
    }

    /// The persisted progress checkpoint, if the batch exists.
    pub async fn get_checkpoint(&self, batch_id: i64) -> BatchResult<Option<(u32, u32)>> {
        let state = self.batches.get_by_id(batch_id).await?;
        Ok(state.map(|s| (s.processed_pages, s.failed_pages)))
    }

    /// Unresolved errors, optionally narrowed to one phase.
    pub async fn get_unresolved_error_details(
        &self,
        batch_id: i64,
        phase: Option<BatchPhase>,
    ) -> BatchResult<Vec<BatchPageError>> {
        let mut errors = self.errors.get_unresolved(batch_id).await?;
        if let Some(phase) = phase {
            errors.retain(|e| e.phase == phase);
        }
        Ok(errors)
    }

    /// Mark pages as successfully reprocessed, resolving their errors.
    pub async fn mark_pages_successful(
        &self,
        batch_id: i64,
        page_numbers: &[u32],
        phase: BatchPhase,
    ) -> BatchResult<()> {
        if page_numbers.is_empty() {
            return Ok(());
        }

        self.errors
            .mark_resolved(batch_id, page_numbers, phase)
            .await?;
        info!(
            "Marked {} pages as successful for batch {}, phase {}",
            page_numbers.len(),
            batch_id,
            phase
        );
        Ok(())
    }

    /// Read-only retry summary for a batch.
    pub async fn get_retry_statistics(&self, batch_id: i64) -> BatchResult<RetryStatistics> {
        let Some(state) = self.batches.get_by_id(batch_id).await? else {
            return Err(BatchError::BatchNotFound(batch_id));
        };

        let errors = self.errors.get_unresolved(batch_id).await?;
        let registration_errors = errors
            .iter()
            .filter(|e| e.phase == BatchPhase::Registration)
            .count();
        let image_download_errors = errors
            .iter()
            .filter(|e| e.phase == BatchPhase::ImageDownload)
            .count();

        Ok(RetryStatistics {
            batch_id,
            total_pages: state.total_pages.unwrap_or(0),
            processed_pages: state.processed_pages,
            failed_pages: state.failed_pages,
            registration_errors,
            image_download_errors,
            retry_attempts: state.retry_attempts,
            can_retry: !state.manual_intervention_required,
        })
    }

    /// Prepare the batch for a clean-slate rerun: zero the counters, reset
    /// both phases, drop all unresolved errors, and put the batch back to
    /// pending.
    pub async fn reset_batch_for_full_retry(&self, batch_id: i64) -> BatchResult<()> {
        if self.batches.get_by_id(batch_id).await?.is_none() {
            return Err(BatchError::BatchNotFound(batch_id));
        }

        self.batches.update_progress(batch_id, 0, 0).await?;
        self.batches
            .update_phase(batch_id, BatchPhase::Registration, PhaseStatus::Pending)
            .await?;
        self.batches
            .update_phase(batch_id, BatchPhase::ImageDownload, PhaseStatus::Pending)
            .await?;

        let errors = self.errors.get_unresolved(batch_id).await?;
        let mut pages: Vec<u32> = errors.iter().map(|e| e.page_number).collect();
        pages.sort_unstable();
        pages.dedup();

        if !pages.is_empty() {
            self.errors
                .delete(batch_id, &pages, BatchPhase::Registration)
                .await?;
            self.errors
                .delete(batch_id, &pages, BatchPhase::ImageDownload)
                .await?;
        }

        self.batches
            .update_status(batch_id, BatchStatus::Pending, None)
            .await?;

        info!("Reset batch {} for full retry", batch_id);
        Ok(())
    }
}
