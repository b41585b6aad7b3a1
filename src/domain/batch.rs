//! Batch execution state entities
//!
//! One `BatchState` row exists per calendar date and tracks overall progress
//! of that day's ingestion run across its two ordered phases. Page-level
//! failures are tracked separately as `BatchPageError` rows owned by the
//! batch, so a run can complete with partial success and be repaired later
//! without redoing finished pages.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Overall status of a batch for one calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Delayed,
    ManualIntervention,
}

impl BatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Delayed => "delayed",
            Self::ManualIntervention => "manual_intervention",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single phase within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl PhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two ordered sub-jobs of a batch. Registration must complete before
/// image download is allowed to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum BatchPhase {
    Registration,
    ImageDownload,
}

impl BatchPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::ImageDownload => "image_download",
        }
    }
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" => Ok(Self::Registration),
            "image_download" => Ok(Self::ImageDownload),
            other => Err(format!("unknown batch phase: {other}")),
        }
    }
}

/// Persistent state of one calendar day's batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchState {
    pub id: i64,
    /// Date-only (UTC), immutable after creation. Unique per batch.
    pub batch_date: NaiveDate,
    pub status: BatchStatus,
    /// Total page count, persisted once the catalog has reported it.
    pub total_pages: Option<u32>,
    pub processed_pages: u32,
    pub failed_pages: u32,
    pub registration_phase: PhaseStatus,
    pub image_download_phase: PhaseStatus,
    /// When `status` is `Delayed`, no run may proceed before this instant.
    pub delayed_until: Option<DateTime<Utc>>,
    /// Consecutive automatic retries since the last success or
    /// manual-intervention clear.
    pub retry_attempts: u32,
    /// Hard stop: while set, every proceed check fails regardless of delay.
    pub manual_intervention_required: bool,
    pub auto_resume_enabled: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchState {
    /// Status of the given phase.
    pub fn phase_status(&self, phase: BatchPhase) -> PhaseStatus {
        match phase {
            BatchPhase::Registration => self.registration_phase,
            BatchPhase::ImageDownload => self.image_download_phase,
        }
    }
}

/// A recorded page-level failure, unique per (batch, page, phase).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPageError {
    pub id: i64,
    pub batch_id: i64,
    pub page_number: u32,
    pub phase: BatchPhase,
    pub error_type: String,
    pub error_message: String,
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read-only retry summary for a batch.
#[derive(Debug, Clone, Serialize)]
pub struct RetryStatistics {
    pub batch_id: i64,
    pub total_pages: u32,
    pub processed_pages: u32,
    pub failed_pages: u32,
    pub registration_errors: usize,
    pub image_download_errors: usize,
    pub retry_attempts: u32,
    pub can_retry: bool,
}
