use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs::File;

/// Capacity figures in bytes, queried fresh on every call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capacity {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

/// Where uploads land. Shared read-mostly by every session; nothing here
/// reserves space, so two sessions can both pass a capacity check that
/// only one of them fits into.
#[async_trait]
pub trait StorageTarget: Send + Sync {
    fn capacity(&self) -> anyhow::Result<Capacity>;

    /// Create a new, uniquely named destination file for one session.
    /// Fails rather than truncating an existing file.
    async fn create_destination(
        &self,
        connection_id: &str,
    ) -> anyhow::Result<(PathBuf, File)>;
}
