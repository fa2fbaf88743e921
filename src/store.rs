//! Durable storage for finished videos.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::StoreConfig;
use crate::foundation::error::{ReelError, ReelResult};

/// Object-storage collaborator. Called once per successfully assembled video.
#[async_trait]
pub trait Store: Send + Sync {
    /// Publish `local` under `key` and return its public URL.
    async fn put(&self, local: &Path, key: &str) -> ReelResult<String>;
}

/// Publishes by copying into a directory that is served under `base_url`.
#[derive(Clone, Debug)]
pub struct DirStore {
    root: PathBuf,
    base_url: String,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn from_config(cfg: &StoreConfig) -> Self {
        Self::new(cfg.root.clone(), cfg.base_url.clone())
    }
}

#[async_trait]
impl Store for DirStore {
    async fn put(&self, local: &Path, key: &str) -> ReelResult<String> {
        if key.is_empty() || key.split('/').any(|seg| seg == "..") {
            return Err(ReelError::publish(format!("invalid object key '{key}'")));
        }
        let dest = self.root.join(key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ReelError::publish(format!("failed to create '{}': {e}", parent.display()))
            })?;
        }
        tokio::fs::copy(local, &dest).await.map_err(|e| {
            ReelError::publish(format!(
                "failed to upload '{}' as '{key}': {e}",
                local.display()
            ))
        })?;
        Ok(format!("{}/{key}", self.base_url.trim_end_matches('/')))
    }
}
