use std::path::PathBuf;

use anyhow::Context;
use axum::async_trait;
use bytes::Bytes;

/// Where raw uploads end up. Injected so tests can point it at a temp dir.
#[async_trait]
pub trait UploadStorage: Send + Sync {
    /// Persist `body` under `key` and return the stored path.
    async fn save(&self, key: &str, body: Bytes) -> anyhow::Result<String>;
}

/// Filesystem storage rooted at the configured uploads directory.
#[derive(Clone)]
pub struct LocalUploads {
    root: PathBuf,
}

impl LocalUploads {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl UploadStorage for LocalUploads {
    async fn save(&self, key: &str, body: Bytes) -> anyhow::Result<String> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("create uploads dir")?;
        }
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write upload {}", path.display()))?;
        Ok(path.to_string_lossy().into_owned())
    }
}
