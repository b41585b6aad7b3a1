//! Job trigger service
//!
//! Operator-facing entry points behind the trigger surface. Each action
//! validates preconditions and flips the batch into running, then returns
//! immediately; the actual page processing happens in a separately
//! launched driver run.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::batch_state_service::BatchStateService;
use crate::application::job_scheduling_service::JobSchedulingService;
use crate::application::partial_retry_service::PartialRetryService;
use crate::domain::batch::{BatchPhase, BatchStatus, PhaseStatus};
use crate::domain::error::{BatchError, BatchResult};

/// Outcome of a trigger request.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerOutcome {
    pub success: bool,
    pub message: String,
    pub batch_id: Option<i64>,
}

/// Outcome of a partial-retry trigger request.
#[derive(Debug, Clone, Serialize)]
pub struct PartialRetryOutcome {
    pub success: bool,
    pub message: String,
    pub batch_id: Option<i64>,
    pub start_page: u32,
    pub end_page: u32,
    pub page_count: u32,
}

pub struct JobTriggerService {
    batch_state: Arc<BatchStateService>,
    scheduling: Arc<JobSchedulingService>,
    partial_retry: Arc<PartialRetryService>,
}

impl JobTriggerService {
    pub fn new(
        batch_state: Arc<BatchStateService>,
        scheduling: Arc<JobSchedulingService>,
        partial_retry: Arc<PartialRetryService>,
    ) -> Self {
        Self {
            batch_state,
            scheduling,
            partial_retry,
        }
    }

    pub async fn trigger_registration(&self) -> BatchResult<TriggerOutcome> {
        info!("Manual registration job trigger requested");
        self.trigger_phase(BatchPhase::Registration).await
    }

    pub async fn trigger_image_download(&self) -> BatchResult<TriggerOutcome> {
        info!("Manual image download job trigger requested");
        self.trigger_phase(BatchPhase::ImageDownload).await
    }

    async fn trigger_phase(&self, phase: BatchPhase) -> BatchResult<TriggerOutcome> {
        let batch = self
            .batch_state
            .get_or_create(Utc::now().date_naive())
            .await?;
        info!(
            "Batch state for manual trigger. batch_id: {}, status: {}, {} phase: {}",
            batch.id,
            batch.status,
            phase,
            batch.phase_status(phase)
        );

        let check = self.scheduling.can_proceed(batch.id, phase).await?;
        if !check.can_proceed {
            let reason = check.reason.unwrap_or_default();
            warn!(
                "Manual {} job cannot proceed. batch_id: {}, reason: {}",
                phase, batch.id, reason
            );
            return Ok(TriggerOutcome {
                success: false,
                message: format!("Job cannot proceed: {reason}"),
                batch_id: Some(batch.id),
            });
        }

        if batch.phase_status(phase) == PhaseStatus::Completed {
            info!("{} phase already completed for batch {}", phase, batch.id);
            return Ok(TriggerOutcome {
                success: true,
                message: format!("{phase} phase already completed"),
                batch_id: Some(batch.id),
            });
        }

        self.batch_state
            .update_status(batch.id, BatchStatus::Running, None)
            .await?;
        self.batch_state
            .update_phase(batch.id, phase, PhaseStatus::Running)
            .await?;

        info!(
            "Manual {} job triggered successfully. batch_id: {}",
            phase, batch.id
        );
        Ok(TriggerOutcome {
            success: true,
            message: format!(
                "{phase} job triggered successfully. Job is now running in the background."
            ),
            batch_id: Some(batch.id),
        })
    }

    /// Reset a page range of today's batch for reprocessing and flip the
    /// registration phase back to running.
    pub async fn trigger_partial_retry(
        &self,
        start_page: u32,
        end_page: u32,
    ) -> BatchResult<PartialRetryOutcome> {
        info!(
            "Manual partial retry trigger requested. start_page: {}, end_page: {}",
            start_page, end_page
        );

        if start_page < 1 || end_page < start_page {
            return Ok(PartialRetryOutcome {
                success: false,
                message: format!(
                    "Invalid page range: {start_page}-{end_page}. Start page must be >= 1 and end page must be >= start page."
                ),
                batch_id: None,
                start_page,
                end_page,
                page_count: 0,
            });
        }

        let Some(batch) = self
            .batch_state
            .get_batch_state_by_date(Utc::now().date_naive())
            .await?
        else {
            return Ok(PartialRetryOutcome {
                success: false,
                message: "No batch state found for today. Run a full job first.".to_string(),
                batch_id: None,
                start_page,
                end_page,
                page_count: 0,
            });
        };

        self.partial_retry
            .reset_page_range(batch.id, start_page, end_page, BatchPhase::Registration)
            .await?;

        let page_count = end_page - start_page + 1;

        self.batch_state
            .update_phase(batch.id, BatchPhase::Registration, PhaseStatus::Running)
            .await?;

        info!(
            "Partial retry triggered successfully. batch_id: {}, pages: {}-{}, count: {}",
            batch.id, start_page, end_page, page_count
        );
        Ok(PartialRetryOutcome {
            success: true,
            message: format!(
                "Partial retry triggered for pages {start_page}-{end_page} ({page_count} pages). Job is now running in the background."
            ),
            batch_id: Some(batch.id),
            start_page,
            end_page,
            page_count,
        })
    }

    /// Clear manual intervention for the given batch, defaulting to today's
    /// batch when no id is supplied.
    pub async fn reset_intervention(&self, batch_id: Option<i64>) -> BatchResult<i64> {
        let batch_id = match batch_id {
            Some(id) => id,
            None => {
                let today = Utc::now().date_naive();
                self.batch_state
                    .get_batch_state_by_date(today)
                    .await?
                    .ok_or(BatchError::BatchNotFoundForDate(today))?
                    .id
            }
        };

        self.scheduling.clear_manual_intervention(batch_id).await?;
        Ok(batch_id)
    }
}
