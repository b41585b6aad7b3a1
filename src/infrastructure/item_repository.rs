//! SQLite repository for registered catalog items
//!
//! Upserts are keyed on the catalog identifier so re-running a page is
//! idempotent.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::domain::catalog::CatalogItem;
use crate::domain::repositories::ItemRepository;

#[derive(Clone)]
pub struct SqliteItemRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl ItemRepository for SqliteItemRepository {
    async fn upsert_items(&self, items: &[CatalogItem]) -> Result<()> {
        let now = Utc::now();
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO catalog_items (
                    key, title, creator, publisher, release_date, image_url,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (key) DO UPDATE SET
                    title = excluded.title,
                    creator = excluded.creator,
                    publisher = excluded.publisher,
                    release_date = excluded.release_date,
                    image_url = excluded.image_url,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&item.key)
            .bind(&item.title)
            .bind(&item.creator)
            .bind(&item.publisher)
            .bind(item.release_date)
            .bind(&item.image_url)
            .bind(now)
            .bind(now)
            .execute(&*self.pool)
            .await?;
        }
        Ok(())
    }

    async fn get_items(&self) -> Result<Vec<CatalogItem>> {
        let rows = sqlx::query(
            r#"
            SELECT key, title, creator, publisher, release_date, image_url
            FROM catalog_items
            ORDER BY key
            "#,
        )
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CatalogItem {
                key: row.get("key"),
                title: row.get("title"),
                creator: row.get("creator"),
                publisher: row.get("publisher"),
                release_date: row.get("release_date"),
                image_url: row.get("image_url"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use chrono::NaiveDate;

    fn item(key: &str, title: &str) -> CatalogItem {
        CatalogItem {
            key: key.to_string(),
            title: title.to_string(),
            creator: Some("someone".to_string()),
            publisher: None,
            release_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            image_url: Some(format!("https://img.example.com/{key}.jpg")),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_existing_rows_by_key() -> Result<()> {
        let db = DatabaseConnection::new_in_memory().await?;
        db.migrate().await?;
        let repo = SqliteItemRepository::new(db.pool().clone());

        repo.upsert_items(&[item("a-1", "First"), item("a-2", "Second")])
            .await?;
        repo.upsert_items(&[item("a-1", "First, revised")]).await?;

        let items = repo.get_items().await?;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, "a-1");
        assert_eq!(items[0].title, "First, revised");
        assert_eq!(items[1].title, "Second");
        Ok(())
    }
}
