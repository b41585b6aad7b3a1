//! Job scheduling service
//!
//! The retry/delay/dependency state machine. A batch moves between
//! `Pending`/`Running`/`Completed`, `Delayed` (retry backoff pending), and
//! `ManualIntervention` (hard stop until an operator clears it). Whole-job
//! failures (typically a failed page-count fetch) are escalated here;
//! page-level failures never are.

use anyhow::Error;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::batch::{BatchPhase, BatchState, BatchStatus, PhaseStatus};
use crate::domain::error::{BatchError, BatchResult};
use crate::domain::repositories::BatchStateRepository;

const MAX_RETRY_ATTEMPTS: u32 = 3;

// Delay intervals for retry attempts as per business requirements.
// First retry: 5 minutes, second: 15 minutes, third: 30 minutes. These are
// part of the business logic and stay fixed across environments.
const DELAY_INTERVAL_MINUTES: [i64; 3] = [5, 15, 30];

/// Result of a proceed check, with the blocking reason when refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProceedCheck {
    pub can_proceed: bool,
    pub reason: Option<String>,
}

impl ProceedCheck {
    fn allowed() -> Self {
        Self {
            can_proceed: true,
            reason: None,
        }
    }

    fn refused(reason: impl Into<String>) -> Self {
        Self {
            can_proceed: false,
            reason: Some(reason.into()),
        }
    }
}

pub struct JobSchedulingService {
    batches: Arc<dyn BatchStateRepository>,
}

impl JobSchedulingService {
    pub fn new(batches: Arc<dyn BatchStateRepository>) -> Self {
        Self { batches }
    }

    /// Check whether a phase of a batch may run right now.
    ///
    /// Refused when the batch is missing, paused for manual intervention,
    /// still inside its retry delay window, or, for image download, when
    /// the registration phase has not completed yet.
    pub async fn can_proceed(&self, batch_id: i64, phase: BatchPhase) -> BatchResult<ProceedCheck> {
        let Some(state) = self.batches.get_by_id(batch_id).await? else {
            return Ok(ProceedCheck::refused("Batch state not found"));
        };

        if state.manual_intervention_required {
            return Ok(ProceedCheck::refused(
                "Manual intervention required - batch is paused",
            ));
        }

        if state.status == BatchStatus::Delayed {
            if let Some(delayed_until) = state.delayed_until {
                if delayed_until > Utc::now() {
                    return Ok(ProceedCheck::refused(format!(
                        "Batch is delayed until {} UTC",
                        delayed_until.format("%Y-%m-%d %H:%M:%S")
                    )));
                }
            }
        }

        if phase == BatchPhase::ImageDownload
            && state.registration_phase != PhaseStatus::Completed
        {
            return Ok(ProceedCheck::refused(
                "Registration phase must be completed before image download can proceed",
            ));
        }

        Ok(ProceedCheck::allowed())
    }

    /// Handle a whole-job failure with automatic retry and delay logic.
    ///
    /// Returns `true` when a retry was scheduled, `false` when the retry
    /// budget is exhausted and the batch now requires manual intervention.
    pub async fn handle_job_failure(
        &self,
        batch_id: i64,
        phase: BatchPhase,
        error: &Error,
    ) -> BatchResult<bool> {
        let Some(state) = self.batches.get_by_id(batch_id).await? else {
            error!("Batch state not found for id {}", batch_id);
            return Ok(false);
        };

        let current_retry = state.retry_attempts;
        warn!(
            "Job failure for batch {}, phase {}. Retry attempt: {}/{}: {:#}",
            batch_id, phase, current_retry, MAX_RETRY_ATTEMPTS, error
        );

        if current_retry >= MAX_RETRY_ATTEMPTS {
            error!(
                "Max retry attempts ({}) reached for batch {}, phase {}. Requiring manual intervention.",
                MAX_RETRY_ATTEMPTS, batch_id, phase
            );

            self.batches
                .set_manual_intervention(
                    batch_id,
                    true,
                    Some(&format!(
                        "Max retry attempts reached after {MAX_RETRY_ATTEMPTS} failures. Last error: {error}"
                    )),
                )
                .await?;
            self.batches
                .update_phase(batch_id, phase, PhaseStatus::Failed)
                .await?;

            return Ok(false);
        }

        let interval = Duration::minutes(DELAY_INTERVAL_MINUTES[current_retry as usize]);
        let delayed_until = Utc::now() + interval;

        self.batches
            .set_delay(batch_id, delayed_until, current_retry + 1)
            .await?;

        info!(
            "Scheduled retry {}/{} for batch {} at {}. Delay interval: {} minutes",
            current_retry + 1,
            MAX_RETRY_ATTEMPTS,
            batch_id,
            delayed_until,
            interval.num_minutes()
        );

        Ok(true)
    }

    /// Batches whose retry delay has elapsed and that are allowed to
    /// auto-resume. Polled by an external scheduler.
    pub async fn get_batches_ready_to_resume(&self) -> BatchResult<Vec<BatchState>> {
        let batches = self.batches.get_ready_to_resume().await?;
        if !batches.is_empty() {
            info!("Found {} batches ready to resume", batches.len());
        }
        Ok(batches)
    }

    /// Clear the manual-intervention flag and hand the batch a fresh retry
    /// budget. Idempotent; errors only when the batch does not exist.
    pub async fn clear_manual_intervention(&self, batch_id: i64) -> BatchResult<()> {
        let Some(state) = self.batches.get_by_id(batch_id).await? else {
            return Err(BatchError::BatchNotFound(batch_id));
        };

        if !state.manual_intervention_required {
            info!("Manual intervention already cleared for batch {}", batch_id);
            return Ok(());
        }

        self.batches
            .set_manual_intervention(batch_id, false, None)
            .await?;

        if state.status == BatchStatus::ManualIntervention {
            self.batches
                .update_status(batch_id, BatchStatus::Pending, None)
                .await?;
        }

        // Fresh retry budget: delay elapsed as of now, zero attempts.
        self.batches.reset_retry_state(batch_id).await?;

        info!(
            "Cleared manual intervention for batch {} - ready for auto-resume",
            batch_id
        );
        Ok(())
    }

    /// Pause a batch by hand (operator action).
    pub async fn set_manual_intervention(&self, batch_id: i64, reason: &str) -> BatchResult<()> {
        self.batches
            .set_manual_intervention(batch_id, true, Some(reason))
            .await?;
        warn!("Manual intervention set for batch {}: {}", batch_id, reason);
        Ok(())
    }

    /// Reset the retry counter after a fully successful run. Leaves the
    /// batch status alone so a completed batch stays completed.
    pub async fn reset_retry_counter(&self, batch_id: i64) -> BatchResult<()> {
        self.batches.reset_retry_state(batch_id).await?;
        info!("Reset retry counter for batch {}", batch_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::batch_state_repository::SqliteBatchStateRepository;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use anyhow::anyhow;
    use chrono::NaiveDate;
    use rstest::rstest;

    async fn service() -> (JobSchedulingService, Arc<dyn BatchStateRepository>, i64) {
        let db = DatabaseConnection::new_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let repo: Arc<dyn BatchStateRepository> =
            Arc::new(SqliteBatchStateRepository::new(db.pool().clone()));
        let batch = repo
            .get_or_create(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap())
            .await
            .unwrap();
        (JobSchedulingService::new(Arc::clone(&repo)), repo, batch.id)
    }

    #[tokio::test]
    async fn fresh_batch_may_run_registration() {
        let (service, _, batch_id) = service().await;
        let check = service
            .can_proceed(batch_id, BatchPhase::Registration)
            .await
            .unwrap();
        assert!(check.can_proceed);
        assert_eq!(check.reason, None);
    }

    #[tokio::test]
    async fn missing_batch_is_refused() {
        let (service, _, _) = service().await;
        let check = service
            .can_proceed(999, BatchPhase::Registration)
            .await
            .unwrap();
        assert!(!check.can_proceed);
    }

    #[tokio::test]
    async fn image_download_requires_completed_registration() {
        let (service, repo, batch_id) = service().await;

        for status in [PhaseStatus::Pending, PhaseStatus::Running, PhaseStatus::Failed] {
            repo.update_phase(batch_id, BatchPhase::Registration, status)
                .await
                .unwrap();
            let check = service
                .can_proceed(batch_id, BatchPhase::ImageDownload)
                .await
                .unwrap();
            assert!(!check.can_proceed, "allowed with registration {status}");
        }

        repo.update_phase(batch_id, BatchPhase::Registration, PhaseStatus::Completed)
            .await
            .unwrap();
        let check = service
            .can_proceed(batch_id, BatchPhase::ImageDownload)
            .await
            .unwrap();
        assert!(check.can_proceed);
    }

    #[tokio::test]
    async fn delayed_batch_is_refused_until_the_delay_passes() {
        let (service, repo, batch_id) = service().await;

        repo.set_delay(batch_id, Utc::now() + Duration::minutes(5), 1)
            .await
            .unwrap();
        let check = service
            .can_proceed(batch_id, BatchPhase::Registration)
            .await
            .unwrap();
        assert!(!check.can_proceed);

        repo.set_delay(batch_id, Utc::now() - Duration::seconds(1), 1)
            .await
            .unwrap();
        let check = service
            .can_proceed(batch_id, BatchPhase::Registration)
            .await
            .unwrap();
        assert!(check.can_proceed);
    }

    #[tokio::test]
    async fn manual_intervention_blocks_even_after_delay_passes() {
        let (service, repo, batch_id) = service().await;

        repo.set_delay(batch_id, Utc::now() - Duration::minutes(1), 1)
            .await
            .unwrap();
        repo.set_manual_intervention(batch_id, true, None)
            .await
            .unwrap();

        let check = service
            .can_proceed(batch_id, BatchPhase::Registration)
            .await
            .unwrap();
        assert!(!check.can_proceed);
    }

    #[rstest]
    #[case(0, 5)]
    #[case(1, 15)]
    #[case(2, 30)]
    #[tokio::test]
    async fn backoff_schedule_is_five_fifteen_thirty_minutes(
        #[case] attempts: u32,
        #[case] expected_minutes: i64,
    ) {
        let (service, repo, batch_id) = service().await;
        if attempts > 0 {
            repo.set_delay(batch_id, Utc::now(), attempts).await.unwrap();
        }

        let before = Utc::now();
        let will_retry = service
            .handle_job_failure(batch_id, BatchPhase::Registration, &anyhow!("boom"))
            .await
            .unwrap();
        assert!(will_retry);

        let state = repo.get_by_id(batch_id).await.unwrap().unwrap();
        assert_eq!(state.status, BatchStatus::Delayed);
        assert_eq!(state.retry_attempts, attempts + 1);

        let delay = state.delayed_until.unwrap() - before;
        assert!(
            (delay - Duration::minutes(expected_minutes)).num_seconds().abs() < 5,
            "expected ~{expected_minutes} minutes, got {delay}"
        );
    }

    #[tokio::test]
    async fn fourth_consecutive_failure_escalates_to_manual_intervention() {
        let (service, repo, batch_id) = service().await;

        for attempt in 0..3 {
            let will_retry = service
                .handle_job_failure(batch_id, BatchPhase::Registration, &anyhow!("boom"))
                .await
                .unwrap();
            assert!(will_retry, "attempt {attempt} should still retry");
        }

        let will_retry = service
            .handle_job_failure(batch_id, BatchPhase::Registration, &anyhow!("boom"))
            .await
            .unwrap();
        assert!(!will_retry);

        let state = repo.get_by_id(batch_id).await.unwrap().unwrap();
        assert!(state.manual_intervention_required);
        assert_eq!(state.status, BatchStatus::ManualIntervention);
        assert_eq!(state.registration_phase, PhaseStatus::Failed);
        assert!(state
            .error_message
            .as_deref()
            .unwrap()
            .contains("Max retry attempts reached"));
    }

    #[tokio::test]
    async fn clear_manual_intervention_is_idempotent() {
        let (service, repo, batch_id) = service().await;

        for _ in 0..4 {
            service
                .handle_job_failure(batch_id, BatchPhase::Registration, &anyhow!("boom"))
                .await
                .unwrap();
        }

        service.clear_manual_intervention(batch_id).await.unwrap();
        let first = repo.get_by_id(batch_id).await.unwrap().unwrap();
        assert!(!first.manual_intervention_required);
        assert_eq!(first.status, BatchStatus::Pending);
        assert_eq!(first.retry_attempts, 0);

        // Second clear observes the flag already down and changes nothing.
        service.clear_manual_intervention(batch_id).await.unwrap();
        let second = repo.get_by_id(batch_id).await.unwrap().unwrap();
        assert_eq!(second.status, first.status);
        assert_eq!(second.retry_attempts, first.retry_attempts);
        assert!(!second.manual_intervention_required);
    }

    #[tokio::test]
    async fn clear_manual_intervention_requires_an_existing_batch() {
        let (service, _, _) = service().await;
        let err = service.clear_manual_intervention(999).await.unwrap_err();
        assert!(matches!(err, BatchError::BatchNotFound(999)));
    }

    #[tokio::test]
    async fn ready_to_resume_excludes_future_delays_and_interventions() {
        let (service, repo, batch_id) = service().await;

        repo.set_delay(batch_id, Utc::now() - Duration::minutes(1), 1)
            .await
            .unwrap();

        let ready = service.get_batches_ready_to_resume().await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, batch_id);

        repo.set_manual_intervention(batch_id, true, None)
            .await
            .unwrap();
        assert!(service
            .get_batches_ready_to_resume()
            .await
            .unwrap()
            .is_empty());
    }
}
