use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::{File, OpenOptions};
use tracing::debug;

use crate::storage::volume::{directory_usage, volume_capacity};
use crate::storage::{Capacity, StorageTarget};

/// Upload directory on the local filesystem, optionally capped by a quota.
pub struct LocalStorage {
    root: PathBuf,
    extension: String,
    quota: Option<u64>,
}

impl LocalStorage {
    pub fn new(root: PathBuf, extension: impl Into<String>) -> Self {
        Self {
            root,
            extension: extension.into(),
            quota: None,
        }
    }

    /// Treat the directory as a volume of `quota` bytes
    pub fn with_quota(mut self, quota: Option<u64>) -> Self {
        self.quota = quota;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn destination_path(&self, started_at: SystemTime, connection_id: &str) -> PathBuf {
        let secs = started_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.root
            .join(format!("{}_{}.{}", secs, connection_id, self.extension))
    }
}

#[async_trait]
impl StorageTarget for LocalStorage {
    fn capacity(&self) -> anyhow::Result<Capacity> {
        let volume = volume_capacity(&self.root)
            .with_context(|| format!("querying capacity of {:?}", self.root))?;

        let Some(quota) = self.quota else {
            return Ok(volume);
        };

        let used = directory_usage(&self.root)
            .with_context(|| format!("measuring usage of {:?}", self.root))?;
        Ok(Capacity {
            total: quota,
            used,
            free: quota.saturating_sub(used).min(volume.free),
        })
    }

    async fn create_destination(&self, connection_id: &str) -> anyhow::Result<(PathBuf, File)> {
        let path = self.destination_path(SystemTime::now(), connection_id);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .with_context(|| format!("creating destination {:?}", path))?;

        debug!("Created destination file {:?}", path);
        Ok((path, file))
    }
}
