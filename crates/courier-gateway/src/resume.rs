//! Resume state persistence

use crate::error::{GatewayError, GatewayResult};
use crate::session::SessionSnapshot;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Stores the last resumable session of each shard
#[async_trait]
pub trait ResumeStore: Send + Sync + 'static {
    async fn load(&self, shard_id: u32) -> GatewayResult<Option<SessionSnapshot>>;

    async fn save(&self, shard_id: u32, snapshot: &SessionSnapshot) -> GatewayResult<()>;

    async fn remove(&self, shard_id: u32) -> GatewayResult<()>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryResumeStore {
    entries: DashMap<u32, SessionSnapshot>,
}

impl MemoryResumeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ResumeStore for MemoryResumeStore {
    async fn load(&self, shard_id: u32) -> GatewayResult<Option<SessionSnapshot>> {
        Ok(self.entries.get(&shard_id).map(|entry| entry.clone()))
    }

    async fn save(&self, shard_id: u32, snapshot: &SessionSnapshot) -> GatewayResult<()> {
        self.entries.insert(shard_id, snapshot.clone());
        Ok(())
    }

    async fn remove(&self, shard_id: u32) -> GatewayResult<()> {
        self.entries.remove(&shard_id);
        Ok(())
    }
}

/// JSON file holding one snapshot per shard id
///
/// Writes go to a temporary file first and are renamed into place.
#[derive(Debug)]
pub struct FileResumeStore {
    path: PathBuf,
    lock: Mutex<()>,
}

type SnapshotFile = BTreeMap<u32, SessionSnapshot>;

impl FileResumeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> GatewayResult<SnapshotFile> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(SnapshotFile::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                GatewayError::ResumeStore(format!("{}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SnapshotFile::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, entries: &SnapshotFile) -> GatewayResult<()> {
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| GatewayError::ResumeStore(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");

        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ResumeStore for FileResumeStore {
    async fn load(&self, shard_id: u32) -> GatewayResult<Option<SessionSnapshot>> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.remove(&shard_id))
    }

    async fn save(&self, shard_id: u32, snapshot: &SessionSnapshot) -> GatewayResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read().await?;
        entries.insert(shard_id, snapshot.clone());
        self.write(&entries).await
    }

    async fn remove(&self, shard_id: u32) -> GatewayResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read().await?;
        if entries.remove(&shard_id).is_some() {
            self.write(&entries).await?;
        }
        Ok(())
    }
}
