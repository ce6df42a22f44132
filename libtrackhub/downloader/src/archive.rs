use std::collections::HashMap;
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::Bytes;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::naming::sanitize_file_name;

pub const OBJECT_URL_PREFIX: &str = "blob:trackhub/";

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive would hold {size} bytes, over the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("Error writing archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Archive task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// `<era folder>/<file name>`
    pub path: String,
    pub bytes: Bytes,
}

/// Packs the entries into an uncompressed ZIP held in memory. Fails before writing anything if
/// the entries add up to more than `limit` bytes.
pub fn build_zip(entries: &[ArchiveEntry], limit: u64) -> Result<Vec<u8>, ArchiveError> {
    let size: u64 = entries.iter().map(|e| e.bytes.len() as u64).sum();
    if size > limit {
        return Err(ArchiveError::TooLarge { size, limit });
    }

    // audio is already compressed
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .large_file(size > u32::MAX as u64);
    let mut zip = ZipWriter::new(Cursor::new(Vec::with_capacity(size as usize)));
    for entry in entries {
        zip.start_file(entry.path.as_str(), options)?;
        zip.write_all(&entry.bytes)?;
    }
    Ok(zip.finish()?.into_inner())
}

/// Where finished archives are handed to the user.
pub trait ArchiveSink: Send + Sync {
    /// Returns the saved location, if the sink has one.
    fn save(&self, job_name: &str, archive: &[u8]) -> Result<Option<PathBuf>, ArchiveError>;
}

/// Writes `<dir>/<job name>.zip`, adding a numeric suffix instead of overwriting.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn available_path(&self, stem: &str) -> PathBuf {
        let mut path = self.dir.join(format!("{stem}.zip"));
        let mut n = 2;
        while path.exists() {
            path = self.dir.join(format!("{stem} ({n}).zip"));
            n += 1;
        }
        path
    }
}

impl ArchiveSink for DirectorySink {
    fn save(&self, job_name: &str, archive: &[u8]) -> Result<Option<PathBuf>, ArchiveError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.available_path(&sanitize_file_name(job_name));
        fs::write(&path, archive)?;
        info!("saved archive to {path:?}");
        Ok(Some(path))
    }
}

/// Keeps archives in memory only. They stay reachable through their object URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemorySink;

impl ArchiveSink for MemorySink {
    fn save(&self, _job_name: &str, _archive: &[u8]) -> Result<Option<PathBuf>, ArchiveError> {
        Ok(None)
    }
}

/// Object URLs for finished archives. An archive's bytes stay alive until its URL is revoked.
#[derive(Debug, Default)]
pub struct ArchiveUrls {
    archives: Mutex<HashMap<String, Bytes>>,
}

impl ArchiveUrls {
    pub fn new() -> Self {
        Self::default()
    }

    fn archives(&self) -> std::sync::MutexGuard<'_, HashMap<String, Bytes>> {
        self.archives.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn create(&self, archive: Bytes) -> String {
        let url = format!("{OBJECT_URL_PREFIX}{}", Uuid::new_v4());
        self.archives().insert(url.clone(), archive);
        url
    }

    pub fn get(&self, url: &str) -> Option<Bytes> {
        self.archives().get(url).cloned()
    }

    /// Returns whether the URL was live.
    pub fn revoke(&self, url: &str) -> bool {
        self.archives().remove(url).is_some()
    }

    pub fn revoke_all(&self) -> usize {
        let mut archives = self.archives();
        let revoked = archives.len();
        archives.clear();
        revoked
    }

    pub fn len(&self) -> usize {
        self.archives().len()
    }

    pub fn is_empty(&self) -> bool {
        self.archives().is_empty()
    }
}
