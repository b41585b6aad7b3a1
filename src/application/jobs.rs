//! Job drivers
//!
//! One driver instance runs one phase of today's batch to completion. Both
//! phases share the same template: resolve the batch, pass the scheduling
//! checks, fetch the page count, then walk pages sequentially with the
//! phase's rate-limit delay between catalog calls. They differ in how they
//! resume: registration trusts the persisted page counter and continues at
//! `processed_pages + 1`, while image download restarts at page 1 every run
//! and relies on per-item storage-presence checks to skip finished work.
//!
//! Page-level failures are recorded and the loop moves on; only a failure
//! to obtain the page count escalates through the scheduling service.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::batch_state_service::BatchStateService;
use crate::application::catalog_service::CatalogService;
use crate::application::job_scheduling_service::JobSchedulingService;
use crate::domain::batch::{BatchPhase, BatchState, BatchStatus, PhaseStatus};

/// Which phase a worker process serves. Selected explicitly at
/// construction; each kind carries its own rate-limit budget and page
/// operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Registration,
    ImageDownload,
}

impl JobKind {
    pub fn phase(self) -> BatchPhase {
        match self {
            Self::Registration => BatchPhase::Registration,
            Self::ImageDownload => BatchPhase::ImageDownload,
        }
    }

    /// Seconds between catalog calls required by the catalog's rate budget.
    pub const fn default_rate_limit(self) -> Duration {
        match self {
            Self::Registration => Duration::from_secs(120),
            Self::ImageDownload => Duration::from_secs(30),
        }
    }
}

/// How a driver run ended. The durable outcome lives in the batch state;
/// this is for the caller's logging and exit decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The scheduling checks refused the run.
    Blocked(String),
    /// This phase already completed for today's batch.
    AlreadyCompleted,
    /// The page count could not be obtained; the failure went through the
    /// escalation path.
    Escalated { will_retry: bool },
    /// The loop visited every page. `failed_pages` may be non-zero.
    Completed { processed_pages: u32, failed_pages: u32 },
    /// Cancelled before reaching the last page; progress stays checkpointed
    /// and the phase is left running for a future resume.
    Interrupted { processed_pages: u32, failed_pages: u32 },
}

pub struct JobDriver {
    kind: JobKind,
    rate_limit: Duration,
    catalog: Arc<CatalogService>,
    batch_state: Arc<BatchStateService>,
    scheduling: Arc<JobSchedulingService>,
}

impl JobDriver {
    pub fn new(
        kind: JobKind,
        catalog: Arc<CatalogService>,
        batch_state: Arc<BatchStateService>,
        scheduling: Arc<JobSchedulingService>,
    ) -> Self {
        Self {
            kind,
            rate_limit: kind.default_rate_limit(),
            catalog,
            batch_state,
            scheduling,
        }
    }

    /// Override the inter-page delay (configuration or tests).
    pub fn with_rate_limit(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Run this driver's phase for today's batch.
    pub async fn run(&self, token: &CancellationToken) -> Result<JobOutcome> {
        let phase = self.kind.phase();
        info!("Starting {} job", phase);

        let batch = self
            .batch_state
            .get_or_create(Utc::now().date_naive())
            .await?;
        info!(
            "Batch state initialized. batch_id: {}, status: {}, {} phase: {}",
            batch.id,
            batch.status,
            phase,
            batch.phase_status(phase)
        );

        let check = self.scheduling.can_proceed(batch.id, phase).await?;
        if !check.can_proceed {
            let reason = check.reason.unwrap_or_default();
            warn!(
                "Job cannot proceed for batch {}. Reason: {}",
                batch.id, reason
            );
            return Ok(JobOutcome::Blocked(reason));
        }

        if batch.phase_status(phase) == PhaseStatus::Completed {
            info!(
                "{} phase already completed for batch {}. Skipping.",
                phase, batch.id
            );
            return Ok(JobOutcome::AlreadyCompleted);
        }

        self.batch_state
            .update_status(batch.id, BatchStatus::Running, None)
            .await?;
        self.batch_state
            .update_phase(batch.id, phase, PhaseStatus::Running)
            .await?;

        let total_pages = match self.catalog.page_count().await {
            Ok(total) => {
                info!("Total pages to process: {}", total);
                self.batch_state.set_total_pages(batch.id, total).await?;
                total
            }
            Err(err) => {
                error!(
                    "Failed to get page count from catalog for batch {}: {:#}",
                    batch.id, err
                );
                let will_retry = self
                    .scheduling
                    .handle_job_failure(batch.id, phase, &err)
                    .await?;
                return Ok(JobOutcome::Escalated { will_retry });
            }
        };

        let (start_page, mut processed_pages, mut failed_pages) = self.resume_point(&batch);
        info!(
            "Starting page processing. Start page: {}, total pages: {}",
            start_page, total_pages
        );

        let mut interrupted = false;
        for current_page in start_page..=total_pages {
            if token.is_cancelled() {
                warn!(
                    "Cancellation requested at page {}. Progress stays checkpointed.",
                    current_page
                );
                interrupted = true;
                break;
            }

            info!(
                "Processing page {}/{} for batch {}",
                current_page, total_pages, batch.id
            );

            match self.process_page(current_page).await {
                Ok(()) => {
                    processed_pages += 1;
                    if self.kind == JobKind::Registration {
                        // Checkpoint: a crash after this point resumes at
                        // the next page.
                        self.batch_state
                            .update_progress(batch.id, processed_pages, failed_pages)
                            .await?;
                    }
                    info!(
                        "Processed page {}/{}. Progress: {} successful, {} failed",
                        current_page, total_pages, processed_pages, failed_pages
                    );
                }
                Err(err) => {
                    error!(
                        "Failed to process page {}/{} for batch {}: {:#}",
                        current_page, total_pages, batch.id, err
                    );

                    failed_pages += 1;
                    self.batch_state
                        .record_page_error(
                            batch.id,
                            current_page,
                            phase,
                            classify_error(&err),
                            &format!("{err:#}"),
                        )
                        .await?;
                    if self.kind == JobKind::Registration {
                        self.batch_state
                            .update_progress(batch.id, processed_pages, failed_pages)
                            .await?;
                    }

                    // Page-level errors never abort the loop; the pages are
                    // retried later via partial retry.
                    info!(
                        "Continuing to next page after error. Progress: {} successful, {} failed",
                        processed_pages, failed_pages
                    );
                }
            }

            if current_page < total_pages {
                debug!(
                    "Rate limiting: waiting {}s before next catalog call",
                    self.rate_limit.as_secs()
                );
                tokio::select! {
                    _ = tokio::time::sleep(self.rate_limit) => {}
                    _ = token.cancelled() => {
                        warn!("Cancellation requested during rate-limit delay. Stopping.");
                        interrupted = true;
                        break;
                    }
                }
            }
        }

        self.finish(&batch, total_pages, processed_pages, failed_pages, interrupted)
            .await
    }

    /// Where the page loop starts and what the counters begin at.
    fn resume_point(&self, batch: &BatchState) -> (u32, u32, u32) {
        match self.kind {
            // Counter-based checkpoint resume.
            JobKind::Registration => (
                batch.processed_pages + 1,
                batch.processed_pages,
                batch.failed_pages,
            ),
            // Every run re-derives outstanding work from storage presence;
            // already-downloaded images are skipped per item.
            JobKind::ImageDownload => (1, 0, 0),
        }
    }

    async fn process_page(&self, page: u32) -> Result<()> {
        match self.kind {
            JobKind::Registration => self.catalog.register_page(page).await,
            JobKind::ImageDownload => self.catalog.download_page_images(page).await,
        }
    }

    async fn finish(
        &self,
        batch: &BatchState,
        total_pages: u32,
        processed_pages: u32,
        failed_pages: u32,
        interrupted: bool,
    ) -> Result<JobOutcome> {
        let phase = self.kind.phase();

        if interrupted {
            // Leave the phase running so a future run resumes from the
            // checkpoint; nothing is rolled back.
            info!(
                "{} phase interrupted for batch {}. Progress saved at {}/{} pages",
                phase, batch.id, processed_pages, total_pages
            );
            return Ok(JobOutcome::Interrupted {
                processed_pages,
                failed_pages,
            });
        }

        if failed_pages == 0 && processed_pages >= total_pages {
            self.batch_state
                .update_phase(batch.id, phase, PhaseStatus::Completed)
                .await?;
            self.batch_state
                .update_status(batch.id, BatchStatus::Completed, None)
                .await?;
            self.scheduling.reset_retry_counter(batch.id).await?;

            info!(
                "{} phase completed successfully for batch {}. Processed {} pages.",
                phase, batch.id, total_pages
            );
        } else {
            // Partial success still counts as done; the recorded page
            // errors are the operator's repair list.
            self.batch_state
                .update_phase(batch.id, phase, PhaseStatus::Completed)
                .await?;

            warn!(
                "{} phase completed with failures for batch {}. Success: {}, failed: {}",
                phase, batch.id, processed_pages, failed_pages
            );
        }

        Ok(JobOutcome::Completed {
            processed_pages,
            failed_pages,
        })
    }
}

/// Coarse classification of a page failure for the error record.
fn classify_error(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if cause.downcast_ref::<reqwest::Error>().is_some() {
            return "http";
        }
        if cause.downcast_ref::<sqlx::Error>().is_some() {
            return "database";
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return "io";
        }
    }
    "other"
}
