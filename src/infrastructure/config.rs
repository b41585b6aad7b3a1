//! Configuration infrastructure
//!
//! Loads the worker configuration from a JSON file, creating the file with
//! defaults when it does not exist yet. Every section tolerates missing
//! fields so older files keep loading after upgrades.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Complete worker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub catalog: CatalogConfig,
    pub storage: StorageConfig,
    pub jobs: JobsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL for the batch/item database.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:data/catalog-batch.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base URL of the catalog search endpoint.
    pub base_url: String,
    /// API key appended to catalog requests when set.
    pub api_key: Option<String>,
    pub request_timeout_seconds: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://catalog.example.com/v1/search".to_string(),
            api_key: None,
            request_timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the image blob store.
    pub blob_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob_root: PathBuf::from("data/images"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Seconds between catalog calls during registration. The catalog's
    /// rate budget for the heavy search endpoint.
    pub registration_delay_seconds: u64,
    /// Seconds between catalog calls during image download.
    pub image_download_delay_seconds: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            registration_delay_seconds: 120,
            image_download_delay_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter; overridden by RUST_LOG when set.
    pub level: String,
    /// Also write daily-rotated log files.
    pub file_output: bool,
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_output: false,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl AppConfig {
    /// Load configuration from file, creating a default file if it doesn't
    /// exist.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(
                "Configuration file not found, creating default: {}",
                path.display()
            );
            let default_config = Self::default();
            default_config.save(path).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;

        let config = serde_json::from_str::<Self>(&content)
            .with_context(|| format!("invalid configuration file {}", path.display()))?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.with_context(|| {
                    format!("failed to create config directory {}", parent.display())
                })?;
            }
        }

        let content =
            serde_json::to_string_pretty(self).context("failed to serialize configuration")?;
        fs::write(path, content)
            .await
            .with_context(|| format!("failed to write configuration file {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn load_creates_default_file_when_missing() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config/worker.json");

        let config = AppConfig::load(&path).await?;
        assert!(path.exists());
        assert_eq!(config.jobs.registration_delay_seconds, 120);
        assert_eq!(config.jobs.image_download_delay_seconds, 30);
        Ok(())
    }

    #[tokio::test]
    async fn load_tolerates_missing_sections() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("worker.json");
        tokio::fs::write(&path, r#"{"catalog": {"api_key": "k"}}"#).await?;

        let config = AppConfig::load(&path).await?;
        assert_eq!(config.catalog.api_key.as_deref(), Some("k"));
        // Untouched sections come from defaults.
        assert_eq!(config.database.url, DatabaseConfig::default().url);
        Ok(())
    }

    #[tokio::test]
    async fn config_round_trips_through_its_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("worker.json");

        let mut config = AppConfig::default();
        config.jobs.registration_delay_seconds = 5;
        config.save(&path).await?;

        let loaded = AppConfig::load(&path).await?;
        assert_eq!(loaded.jobs.registration_delay_seconds, 5);
        Ok(())
    }
}
