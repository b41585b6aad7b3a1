//! SQLite repository for page-level failure records
//!
//! Rows are unique per (batch, page, phase); recording the same failing page
//! twice refreshes the stored error instead of inserting a duplicate.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::batch::{BatchPageError, BatchPhase};
use crate::domain::error::BatchResult;
use crate::domain::repositories::PageErrorRepository;

#[derive(Clone)]
pub struct SqlitePageErrorRepository {
    pool: Arc<SqlitePool>,
}

impl SqlitePageErrorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    fn read_page_error(row: &SqliteRow) -> BatchPageError {
        BatchPageError {
            id: row.get("id"),
            batch_id: row.get("batch_id"),
            page_number: row.get("page_number"),
            phase: row.get("phase"),
            error_type: row.get("error_type"),
            error_message: row.get("error_message"),
            retry_count: row.get("retry_count"),
            last_retry_at: row.get("last_retry_at"),
            resolved: row.get("resolved"),
            resolved_at: row.get("resolved_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    /// `IN (?, ?, ...)` with one placeholder per page number.
    fn page_list_sql(template: &str, count: usize) -> String {
        let placeholders = vec!["?"; count].join(", ");
        template.replace("{pages}", &placeholders)
    }
}

#[async_trait]
impl PageErrorRepository for SqlitePageErrorRepository {
    async fn record(
        &self,
        batch_id: i64,
        page_number: u32,
        phase: BatchPhase,
        error_type: &str,
        error_message: &str,
    ) -> BatchResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO batch_page_errors (
                batch_id, page_number, phase, error_type, error_message,
                retry_count, last_retry_at, resolved, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 0, ?, 0, ?, ?)
            ON CONFLICT (batch_id, page_number, phase) DO UPDATE SET
                error_type = excluded.error_type,
                error_message = excluded.error_message,
                retry_count = retry_count + 1,
                last_retry_at = excluded.last_retry_at,
                resolved = 0,
                resolved_at = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(batch_id)
        .bind(page_number)
        .bind(phase)
        .bind(error_type)
        .bind(error_message)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&*self.pool)
        .await?;

        warn!(
            "Recorded error for batch {}, page {}, phase {}: {}",
            batch_id, page_number, phase, error_type
        );
        Ok(())
    }

    async fn get_unresolved(&self, batch_id: i64) -> BatchResult<Vec<BatchPageError>> {
        let rows = sqlx::query(
            r#"
            SELECT id, batch_id, page_number, phase, error_type, error_message,
                   retry_count, last_retry_at, resolved, resolved_at,
                   created_at, updated_at
            FROM batch_page_errors
            WHERE batch_id = ? AND resolved = 0
            ORDER BY page_number, phase
            "#,
        )
        .bind(batch_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.iter().map(Self::read_page_error).collect())
    }

    async fn mark_resolved(
        &self,
        batch_id: i64,
        page_numbers: &[u32],
        phase: BatchPhase,
    ) -> BatchResult<()> {
        if page_numbers.is_empty() {
            return Ok(());
        }

        let sql = Self::page_list_sql(
            r#"
            UPDATE batch_page_errors
            SET resolved = 1, resolved_at = ?, updated_at = ?
            WHERE batch_id = ? AND phase = ? AND page_number IN ({pages})
            "#,
            page_numbers.len(),
        );

        let now = Utc::now();
        let mut query = sqlx::query(&sql)
            .bind(now)
            .bind(now)
            .bind(batch_id)
            .bind(phase);
        for page in page_numbers {
            query = query.bind(page);
        }
        query.execute(&*self.pool).await?;

        info!(
            "Marked {} errors as resolved for batch {}, phase {}",
            page_numbers.len(),
            batch_id,
            phase
        );
        Ok(())
    }

    async fn delete(
        &self,
        batch_id: i64,
        page_numbers: &[u32],
        phase: BatchPhase,
    ) -> BatchResult<()> {
        if page_numbers.is_empty() {
            return Ok(());
        }

        let sql = Self::page_list_sql(
            "DELETE FROM batch_page_errors WHERE batch_id = ? AND phase = ? AND page_number IN ({pages})",
            page_numbers.len(),
        );

        let mut query = sqlx::query(&sql).bind(batch_id).bind(phase);
        for page in page_numbers {
            query = query.bind(page);
        }
        query.execute(&*self.pool).await?;

        info!(
            "Deleted {} page errors for batch {}, phase {}",
            page_numbers.len(),
            batch_id,
            phase
        );
        Ok(())
    }
}
