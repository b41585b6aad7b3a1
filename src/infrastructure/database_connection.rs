// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        // Create database file directory if it doesn't exist
        let db_path = if database_url.starts_with("sqlite://") {
            database_url.trim_start_matches("sqlite://")
        } else if database_url.starts_with("sqlite:") {
            database_url.trim_start_matches("sqlite:")
        } else {
            database_url
        };

        if db_path != ":memory:" {
            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            // Ensure the database file exists by creating it if necessary
            if !Path::new(db_path).exists() {
                std::fs::File::create(db_path)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// In-memory database on a single connection. A pooled `:memory:` URL
    /// would hand every connection its own empty database, so the pool is
    /// pinned to one connection here.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_batch_states_sql = r#"
            CREATE TABLE IF NOT EXISTS batch_states (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                batch_date TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'pending',
                total_pages INTEGER,
                processed_pages INTEGER NOT NULL DEFAULT 0,
                failed_pages INTEGER NOT NULL DEFAULT 0,
                registration_phase TEXT NOT NULL DEFAULT 'pending',
                image_download_phase TEXT NOT NULL DEFAULT 'pending',
                delayed_until TEXT,
                retry_attempts INTEGER NOT NULL DEFAULT 0,
                manual_intervention_required INTEGER NOT NULL DEFAULT 0,
                auto_resume_enabled INTEGER NOT NULL DEFAULT 1,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#;

        let create_page_errors_sql = r#"
            CREATE TABLE IF NOT EXISTS batch_page_errors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                batch_id INTEGER NOT NULL,
                page_number INTEGER NOT NULL,
                phase TEXT NOT NULL,
                error_type TEXT NOT NULL,
                error_message TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_retry_at TEXT,
                resolved INTEGER NOT NULL DEFAULT 0,
                resolved_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (batch_id, page_number, phase),
                FOREIGN KEY (batch_id) REFERENCES batch_states (id) ON DELETE CASCADE
            )
        "#;

        let create_items_sql = r#"
            CREATE TABLE IF NOT EXISTS catalog_items (
                key TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                creator TEXT,
                publisher TEXT,
                release_date TEXT,
                image_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#;

        let create_indexes_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_batch_states_status ON batch_states (status);
            CREATE INDEX IF NOT EXISTS idx_page_errors_batch_id ON batch_page_errors (batch_id);
            CREATE INDEX IF NOT EXISTS idx_page_errors_resolved ON batch_page_errors (batch_id, resolved);
        "#;

        sqlx::query(create_batch_states_sql).execute(&self.pool).await?;
        sqlx::query(create_page_errors_sql).execute(&self.pool).await?;
        sqlx::query(create_items_sql).execute(&self.pool).await?;
        sqlx::query(create_indexes_sql).execute(&self.pool).await?;

        Ok(())
    }
}
