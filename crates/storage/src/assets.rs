//! Storage for generated binary assets (comic page images).

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::debug;

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Stores `data` under the relative `path` and returns its public URL.
    async fn upload(&self, path: &str, data: &[u8], content_type: &str) -> Result<String>;
    fn url_for(&self, path: &str) -> String;
}

/// Filesystem-backed assets, served back by the API under `/files`.
#[derive(Debug, Clone)]
pub struct LocalAssetStore {
    base_path: PathBuf,
    base_url: String,
}

impl LocalAssetStore {
    pub fn new(base_path: impl Into<PathBuf>, base_url: impl AsRef<str>) -> Self {
        Self {
            base_path: base_path.into(),
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if path.is_empty() || escapes {
            bail!("asset path '{path}' must be a plain relative path");
        }
        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn upload(&self, path: &str, data: &[u8], content_type: &str) -> Result<String> {
        let file_path = self.resolve(path)?;
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create asset dir '{}'", parent.display()))?;
        }
        tokio::fs::write(&file_path, data)
            .await
            .with_context(|| format!("failed to write asset '{}'", file_path.display()))?;
        debug!(path, content_type, size_bytes = data.len(), "asset stored");
        Ok(self.url_for(path))
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
