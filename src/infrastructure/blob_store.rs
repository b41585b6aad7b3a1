//! Filesystem-backed object store for item images
//!
//! Blob names map to file names under a single root directory; the prefix
//! existence check scans that directory. Content types are not stored; the
//! extension already encodes them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::services::BlobStore;

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn exists_with_prefix(&self, prefix: &str) -> Result<bool> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            // Missing root means nothing has been uploaded yet.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to list blobs under {}", self.root.display()))
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(prefix) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn upload(
        &self,
        name: &str,
        bytes: &[u8],
        _content_type: Option<&str>,
    ) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create blob root {}", self.root.display()))?;

        let path = self.root.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write blob {}", path.display()))?;
        Ok(())
    }
}
