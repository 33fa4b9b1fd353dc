//! Mount registry (spec §3 `MountInfo`, §4.8).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::nzb::types::ParsedNzb;
use crate::rar::types::{AssembledRarFile, RarVolumeInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountStatus {
    Pending,
    Ready,
    /// Archive layout makes streaming impossible (solid/encrypted/compressed
    /// RAR). Distinguished from `Error` so `NzbStreamService::create_stream`
    /// can surface it as `RarError::NotStreamable` (422) rather than a
    /// generic "mount not ready" (409) (spec §4.7, S6).
    NotStreamable(String),
    Error(String),
}

impl std::fmt::Display for MountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MountStatus::Pending => write!(f, "pending"),
            MountStatus::Ready => write!(f, "ready"),
            MountStatus::NotStreamable(reason) => write!(f, "not streamable: {reason}"),
            MountStatus::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// One media entry exposed by a mount: either a plain NZB file (index into
/// `Mount::parsed.files`) or a RAR-assembled file (index into
/// `Mount::assembled`).
#[derive(Debug, Clone)]
pub enum MountMediaFile {
    Direct { nzb_file_index: usize },
    Rar { assembled_index: usize },
}

#[derive(Debug, Clone)]
pub struct MountInfo {
    pub id: String,
    pub nzb_hash: String,
    pub media_files: Vec<MountMediaFile>,
    pub total_size: u64,
    pub status: MountStatus,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
}

/// A mount's full state: the lightweight [`MountInfo`] plus everything
/// [`crate::service::stream_service::NzbStreamService`] needs to resolve a
/// read (the parsed NZB, and — once RAR headers have been fetched — the
/// assembled RAR files and the volume info each span was built from).
#[derive(Clone)]
pub struct Mount {
    pub info: MountInfo,
    pub parsed: Arc<ParsedNzb>,
    pub assembled: Vec<AssembledRarFile>,
    pub rar_volumes: Vec<RarVolumeInfo>,
}

#[async_trait]
pub trait MountStore: Send + Sync {
    async fn insert(&self, mount: Mount);
    async fn get(&self, id: &str) -> Option<Mount>;
    async fn set_status(&self, id: &str, status: MountStatus);
    async fn finalize_ready(
        &self,
        id: &str,
        media_files: Vec<MountMediaFile>,
        assembled: Vec<AssembledRarFile>,
        volumes: Vec<RarVolumeInfo>,
    );
    async fn touch(&self, id: &str);
}

/// Reference [`MountStore`] implementation (spec §4.10): every mount lives
/// in memory for the process lifetime, there is no persistence across
/// restarts.
#[derive(Clone, Default)]
pub struct InMemoryMountStore {
    mounts: Arc<DashMap<String, Mount>>,
}

impl InMemoryMountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MountStore for InMemoryMountStore {
    async fn insert(&self, mount: Mount) {
        self.mounts.insert(mount.info.id.clone(), mount);
    }

    async fn get(&self, id: &str) -> Option<Mount> {
        self.mounts.get(id).map(|entry| entry.clone())
    }

    async fn set_status(&self, id: &str, status: MountStatus) {
        if let Some(mut entry) = self.mounts.get_mut(id) {
            entry.info.status = status;
        }
    }

    async fn finalize_ready(
        &self,
        id: &str,
        media_files: Vec<MountMediaFile>,
        assembled: Vec<AssembledRarFile>,
        volumes: Vec<RarVolumeInfo>,
    ) {
        if let Some(mut entry) = self.mounts.get_mut(id) {
            entry.info.media_files = media_files;
            entry.assembled = assembled;
            entry.rar_volumes = volumes;
            entry.info.status = MountStatus::Ready;
        }
    }

    async fn touch(&self, id: &str) {
        if let Some(mut entry) = self.mounts.get_mut(id) {
            entry.info.last_access_at = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mount(id: &str) -> Mount {
        Mount {
            info: MountInfo {
                id: id.to_string(),
                nzb_hash: "deadbeef".into(),
                media_files: vec![MountMediaFile::Direct { nzb_file_index: 0 }],
                total_size: 100,
                status: MountStatus::Pending,
                created_at: Utc::now(),
                last_access_at: Utc::now(),
            },
            parsed: Arc::new(ParsedNzb {
                hash: "deadbeef".into(),
                files: vec![],
                media_file_indices: vec![],
                total_size: 100,
                groups: vec![],
            }),
            assembled: vec![],
            rar_volumes: vec![],
        }
    }

    #[tokio::test]
    async fn inserted_mount_is_retrievable_and_status_updates() {
        let store = InMemoryMountStore::new();
        store.insert(sample_mount("m1")).await;
        assert_eq!(store.get("m1").await.unwrap().info.status, MountStatus::Pending);

        store.set_status("m1", MountStatus::Ready).await;
        assert_eq!(store.get("m1").await.unwrap().info.status, MountStatus::Ready);

        assert!(store.get("missing").await.is_none());
    }
}
