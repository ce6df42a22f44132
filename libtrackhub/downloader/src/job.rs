use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Active,
    Completed,
    Failed,
}

/// One track the caller wants downloaded. The URL must already be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub track_name: String,
    pub era_name: Option<String>,
    pub playable_url: String,
}

impl DownloadRequest {
    pub fn new(
        track_name: impl Into<String>,
        era_name: Option<&str>,
        playable_url: impl Into<String>,
    ) -> Self {
        Self {
            track_name: track_name.into(),
            era_name: era_name.map(str::to_owned),
            playable_url: playable_url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadItem {
    /// Position of the item within its job.
    pub id: usize,
    pub track_name: String,
    pub era_name: Option<String>,
    pub playable_url: String,
    pub status: ItemStatus,
    /// 0..=100
    pub progress: u8,
    pub retry_count: u32,
}

impl DownloadItem {
    pub(crate) fn from_request(id: usize, request: DownloadRequest) -> Self {
        Self {
            id,
            track_name: request.track_name,
            era_name: request.era_name,
            playable_url: request.playable_url,
            status: ItemStatus::Pending,
            progress: 0,
            retry_count: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ItemStatus::Completed | ItemStatus::Failed)
    }
}

/// A finished archive. `object_url` stays valid until the job is dismissed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveInfo {
    pub object_url: String,
    pub path: Option<PathBuf>,
    pub size: u64,
    pub file_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadJob {
    pub id: JobId,
    pub name: String,
    pub artist_name: String,
    pub era_name: Option<String>,
    pub items: Vec<DownloadItem>,
    pub status: JobStatus,
    pub completed_count: usize,
    pub failed_count: usize,
    pub archive: Option<ArchiveInfo>,
    pub error: Option<String>,
}

impl DownloadJob {
    pub(crate) fn new(
        name: String,
        artist_name: String,
        era_name: Option<String>,
        requests: Vec<DownloadRequest>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            artist_name,
            era_name,
            items: requests
                .into_iter()
                .enumerate()
                .map(|(i, r)| DownloadItem::from_request(i, r))
                .collect(),
            status: JobStatus::Active,
            completed_count: 0,
            failed_count: 0,
            archive: None,
            error: None,
        }
    }

    /// Fraction of items in a terminal state, 0.0..=1.0.
    pub fn progress(&self) -> f32 {
        if self.items.is_empty() {
            return 1.0;
        }
        (self.completed_count + self.failed_count) as f32 / self.items.len() as f32
    }

    pub fn is_terminal(&self) -> bool {
        self.status != JobStatus::Active
    }

    pub(crate) fn all_items_terminal(&self) -> bool {
        self.items.iter().all(DownloadItem::is_terminal)
    }
}
