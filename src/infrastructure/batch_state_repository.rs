//! SQLite repository for batch state rows
//!
//! All timestamps are written from Rust so the stored strings share one
//! format and order correctly under SQLite's text comparison; the
//! ready-to-resume query binds `now` as a parameter for the same reason.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::batch::{BatchPhase, BatchState, BatchStatus, PhaseStatus};
use crate::domain::error::{BatchError, BatchResult};
use crate::domain::repositories::BatchStateRepository;

const BATCH_STATE_COLUMNS: &str = r#"
    id, batch_date, status, total_pages, processed_pages, failed_pages,
    registration_phase, image_download_phase, delayed_until, retry_attempts,
    manual_intervention_required, auto_resume_enabled, error_message,
    created_at, updated_at
"#;

#[derive(Clone)]
pub struct SqliteBatchStateRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteBatchStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    fn read_batch_state(row: &SqliteRow) -> BatchState {
        BatchState {
            id: row.get("id"),
            batch_date: row.get("batch_date"),
            status: row.get("status"),
            total_pages: row.get("total_pages"),
            processed_pages: row.get("processed_pages"),
            failed_pages: row.get("failed_pages"),
            registration_phase: row.get("registration_phase"),
            image_download_phase: row.get("image_download_phase"),
            delayed_until: row.get("delayed_until"),
            retry_attempts: row.get("retry_attempts"),
            manual_intervention_required: row.get("manual_intervention_required"),
            auto_resume_enabled: row.get("auto_resume_enabled"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn require_update(result: sqlx::sqlite::SqliteQueryResult, batch_id: i64) -> BatchResult<()> {
        if result.rows_affected() == 0 {
            return Err(BatchError::BatchNotFound(batch_id));
        }
        Ok(())
    }
}

#[async_trait]
impl BatchStateRepository for SqliteBatchStateRepository {
    async fn get_or_create(&self, batch_date: NaiveDate) -> BatchResult<BatchState> {
        let select_sql =
            format!("SELECT {BATCH_STATE_COLUMNS} FROM batch_states WHERE batch_date = ?");

        if let Some(row) = sqlx::query(&select_sql)
            .bind(batch_date)
            .fetch_optional(&*self.pool)
            .await?
        {
            return Ok(Self::read_batch_state(&row));
        }

        // ON CONFLICT DO NOTHING keeps the create race-safe: whoever loses
        // the insert still finds the winner's row in the re-select below.
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO batch_states (
                batch_date, status, processed_pages, failed_pages,
                registration_phase, image_download_phase, retry_attempts,
                manual_intervention_required, auto_resume_enabled,
                created_at, updated_at
            ) VALUES (?, 'pending', 0, 0, 'pending', 'pending', 0, 0, 1, ?, ?)
            ON CONFLICT (batch_date) DO NOTHING
            "#,
        )
        .bind(batch_date)
        .bind(now)
        .bind(now)
        .execute(&*self.pool)
        .await?;

        let row = sqlx::query(&select_sql)
            .bind(batch_date)
            .fetch_one(&*self.pool)
            .await?;

        let batch = Self::read_batch_state(&row);
        info!(
            "Created new batch state for date {} with id {}",
            batch_date, batch.id
        );
        Ok(batch)
    }

    async fn get_by_id(&self, batch_id: i64) -> BatchResult<Option<BatchState>> {
        let sql = format!("SELECT {BATCH_STATE_COLUMNS} FROM batch_states WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(batch_id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.as_ref().map(Self::read_batch_state))
    }

    async fn get_by_date(&self, batch_date: NaiveDate) -> BatchResult<Option<BatchState>> {
        let sql = format!("SELECT {BATCH_STATE_COLUMNS} FROM batch_states WHERE batch_date = ?");
        let row = sqlx::query(&sql)
            .bind(batch_date)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.as_ref().map(Self::read_batch_state))
    }

    async fn update_status(
        &self,
        batch_id: i64,
        status: BatchStatus,
        error_message: Option<&str>,
    ) -> BatchResult<()> {
        let result = sqlx::query(
            "UPDATE batch_states SET status = ?, error_message = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(error_message)
        .bind(Utc::now())
        .bind(batch_id)
        .execute(&*self.pool)
        .await?;

        debug!("Updated batch {} status to {}", batch_id, status);
        Self::require_update(result, batch_id)
    }

    async fn update_phase(
        &self,
        batch_id: i64,
        phase: BatchPhase,
        status: PhaseStatus,
    ) -> BatchResult<()> {
        let sql = match phase {
            BatchPhase::Registration => {
                "UPDATE batch_states SET registration_phase = ?, updated_at = ? WHERE id = ?"
            }
            BatchPhase::ImageDownload => {
                "UPDATE batch_states SET image_download_phase = ?, updated_at = ? WHERE id = ?"
            }
        };

        let result = sqlx::query(sql)
            .bind(status)
            .bind(Utc::now())
            .bind(batch_id)
            .execute(&*self.pool)
            .await?;

        debug!("Updated batch {} {} phase to {}", batch_id, phase, status);
        Self::require_update(result, batch_id)
    }

    async fn update_progress(
        &self,
        batch_id: i64,
        processed_pages: u32,
        failed_pages: u32,
    ) -> BatchResult<()> {
        let result = sqlx::query(
            "UPDATE batch_states SET processed_pages = ?, failed_pages = ?, updated_at = ? WHERE id = ?",
        )
        .bind(processed_pages)
        .bind(failed_pages)
        .bind(Utc::now())
        .bind(batch_id)
        .execute(&*self.pool)
        .await?;

        Self::require_update(result, batch_id)
    }

    async fn set_total_pages(&self, batch_id: i64, total_pages: u32) -> BatchResult<()> {
        let result =
            sqlx::query("UPDATE batch_states SET total_pages = ?, updated_at = ? WHERE id = ?")
                .bind(total_pages)
                .bind(Utc::now())
                .bind(batch_id)
                .execute(&*self.pool)
                .await?;

        Self::require_update(result, batch_id)
    }

    async fn set_delay(
        &self,
        batch_id: i64,
        delayed_until: DateTime<Utc>,
        retry_attempts: u32,
    ) -> BatchResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE batch_states
            SET status = ?, delayed_until = ?, retry_attempts = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(BatchStatus::Delayed)
        .bind(delayed_until)
        .bind(retry_attempts)
        .bind(Utc::now())
        .bind(batch_id)
        .execute(&*self.pool)
        .await?;

        info!(
            "Set batch {} to delayed status until {}, retry attempt {}",
            batch_id, delayed_until, retry_attempts
        );
        Self::require_update(result, batch_id)
    }

    async fn reset_retry_state(&self, batch_id: i64) -> BatchResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE batch_states SET delayed_until = ?, retry_attempts = 0, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(batch_id)
        .execute(&*self.pool)
        .await?;

        debug!("Reset retry state for batch {}", batch_id);
        Self::require_update(result, batch_id)
    }

    async fn set_manual_intervention(
        &self,
        batch_id: i64,
        required: bool,
        error_message: Option<&str>,
    ) -> BatchResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE batch_states
            SET status = CASE WHEN ? THEN ? ELSE status END,
                manual_intervention_required = ?,
                error_message = COALESCE(?, error_message),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(required)
        .bind(BatchStatus::ManualIntervention)
        .bind(required)
        .bind(error_message)
        .bind(Utc::now())
        .bind(batch_id)
        .execute(&*self.pool)
        .await?;

        warn!(
            "Set manual intervention for batch {}: {}",
            batch_id, required
        );
        Self::require_update(result, batch_id)
    }

    async fn get_ready_to_resume(&self) -> BatchResult<Vec<BatchState>> {
        let sql = format!(
            r#"
            SELECT {BATCH_STATE_COLUMNS} FROM batch_states
            WHERE status = ?
              AND delayed_until <= ?
              AND auto_resume_enabled = 1
              AND manual_intervention_required = 0
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(BatchStatus::Delayed)
            .bind(Utc::now())
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows.iter().map(Self::read_batch_state).collect())
    }
}
