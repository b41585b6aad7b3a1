//! batch-worker - standalone worker for catalog batch ingestion
//!
//! One invocation serves one operator action: run a phase of today's batch,
//! relaunch delayed batches, trigger a partial retry, clear manual
//! intervention, or print retry statistics. Which phase a worker process
//! serves is an explicit subcommand, never ambient environment state.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use catalog_batch::application::{
    BatchStateService, CatalogService, JobDriver, JobKind, JobOutcome, JobSchedulingService,
    JobTriggerService, PartialRetryService,
};
use catalog_batch::domain::batch::PhaseStatus;
use catalog_batch::infrastructure::{
    init_logging, AppConfig, DatabaseConnection, FsBlobStore, HttpCatalogClient,
    SqliteBatchStateRepository, SqliteItemRepository, SqlitePageErrorRepository,
};

#[derive(Parser)]
#[command(name = "batch-worker")]
#[command(about = "Catalog batch ingestion worker")]
struct Cli {
    /// Path to the worker configuration file
    #[arg(long, default_value = "catalog-batch.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the registration phase for today's batch
    Register,

    /// Run the image download phase for today's batch
    DownloadImages,

    /// Relaunch delayed batches whose backoff has elapsed
    Resume,

    /// Reset a page range of today's batch for reprocessing
    PartialRetry {
        #[arg(long)]
        start_page: u32,
        #[arg(long)]
        end_page: u32,
    },

    /// Clear the manual-intervention flag (defaults to today's batch)
    ClearIntervention {
        #[arg(long)]
        batch_id: Option<i64>,
    },

    /// Print retry statistics (defaults to today's batch)
    Status {
        #[arg(long)]
        batch_id: Option<i64>,
    },
}

struct App {
    config: AppConfig,
    batch_state: Arc<BatchStateService>,
    scheduling: Arc<JobSchedulingService>,
    partial_retry: Arc<PartialRetryService>,
    triggers: JobTriggerService,
    catalog: Arc<CatalogService>,
}

impl App {
    async fn build(config: AppConfig) -> Result<Self> {
        let db = DatabaseConnection::new(&config.database.url).await?;
        db.migrate().await?;

        let batches = Arc::new(SqliteBatchStateRepository::new(db.pool().clone()));
        let errors = Arc::new(SqlitePageErrorRepository::new(db.pool().clone()));

        let batch_state = Arc::new(BatchStateService::new(batches.clone(), errors.clone()));
        let scheduling = Arc::new(JobSchedulingService::new(batches.clone()));
        let partial_retry = Arc::new(PartialRetryService::new(batches, errors));
        let triggers = JobTriggerService::new(
            batch_state.clone(),
            scheduling.clone(),
            partial_retry.clone(),
        );

        let catalog_client = Arc::new(HttpCatalogClient::new(&config.catalog)?);
        let item_repo = Arc::new(SqliteItemRepository::new(db.pool().clone()));
        let blob_store = Arc::new(FsBlobStore::new(config.storage.blob_root.clone()));
        let catalog = Arc::new(CatalogService::new(catalog_client, item_repo, blob_store));

        Ok(Self {
            config,
            batch_state,
            scheduling,
            partial_retry,
            triggers,
            catalog,
        })
    }

    fn driver(&self, kind: JobKind) -> JobDriver {
        let delay_seconds = match kind {
            JobKind::Registration => self.config.jobs.registration_delay_seconds,
            JobKind::ImageDownload => self.config.jobs.image_download_delay_seconds,
        };

        JobDriver::new(
            kind,
            self.catalog.clone(),
            self.batch_state.clone(),
            self.scheduling.clone(),
        )
        .with_rate_limit(Duration::from_secs(delay_seconds))
    }

    async fn run_driver(&self, kind: JobKind, token: &CancellationToken) -> Result<()> {
        let outcome = self.driver(kind).run(token).await?;
        match outcome {
            JobOutcome::Blocked(reason) => warn!("Job did not run: {}", reason),
            JobOutcome::AlreadyCompleted => info!("Nothing to do - phase already completed"),
            JobOutcome::Escalated { will_retry } => {
                if will_retry {
                    warn!("Job failed; retry scheduled - relaunch after the delay window");
                } else {
                    warn!("Job failed; manual intervention required");
                }
            }
            JobOutcome::Completed {
                processed_pages,
                failed_pages,
            } => info!(
                "Job finished: {} pages processed, {} failed",
                processed_pages, failed_pages
            ),
            JobOutcome::Interrupted {
                processed_pages, ..
            } => info!(
                "Job interrupted; progress checkpointed at {} pages",
                processed_pages
            ),
        }
        Ok(())
    }

    /// Relaunch the right phase for every delayed batch whose backoff has
    /// elapsed. Drivers always operate on today's batch, so older dates are
    /// only reported.
    async fn resume_ready_batches(&self, token: &CancellationToken) -> Result<()> {
        let ready = self.scheduling.get_batches_ready_to_resume().await?;
        if ready.is_empty() {
            info!("No batches ready to resume");
            return Ok(());
        }

        let today = Utc::now().date_naive();
        for batch in ready {
            if batch.batch_date != today {
                warn!(
                    "Batch {} ({}) is ready to resume but only today's batch can be relaunched by this worker",
                    batch.id, batch.batch_date
                );
                continue;
            }

            let kind = if batch.registration_phase != PhaseStatus::Completed {
                JobKind::Registration
            } else if batch.image_download_phase != PhaseStatus::Completed {
                JobKind::ImageDownload
            } else {
                info!("Batch {} has both phases completed; nothing to resume", batch.id);
                continue;
            };

            info!("Resuming batch {} with {} job", batch.id, kind.phase());
            self.run_driver(kind, token).await?;
        }
        Ok(())
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(&cli.config).await?;
    init_logging(&config.logging)?;

    let app = App::build(config).await?;

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received - stopping after the current page");
            signal_token.cancel();
        }
    });

    match cli.command {
        Command::Register => app.run_driver(JobKind::Registration, &token).await?,
        Command::DownloadImages => app.run_driver(JobKind::ImageDownload, &token).await?,
        Command::Resume => app.resume_ready_batches(&token).await?,
        Command::PartialRetry {
            start_page,
            end_page,
        } => {
            let outcome = app.triggers.trigger_partial_retry(start_page, end_page).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.success {
                return Err(anyhow!("partial retry refused: {}", outcome.message));
            }
        }
        Command::ClearIntervention { batch_id } => {
            let cleared = app.triggers.reset_intervention(batch_id).await?;
            info!(
                "Manual intervention cleared for batch {}. Job will auto-resume on next scheduled run.",
                cleared
            );
        }
        Command::Status { batch_id } => {
            let batch_id = match batch_id {
                Some(id) => id,
                None => {
                    let today = Utc::now().date_naive();
                    app.batch_state
                        .get_batch_state_by_date(today)
                        .await?
                        .ok_or_else(|| anyhow!("no batch state exists for {today}"))?
                        .id
                }
            };
            let stats = app.partial_retry.get_retry_statistics(batch_id).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!("batch worker terminated with an unrecoverable error: {:#}", err);
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
