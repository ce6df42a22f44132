use std::env;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const MAX_CONCURRENT_DOWNLOADS: usize = 3;
pub const MAX_RETRY_ATTEMPTS: u32 = 2;
pub const MAX_ZIP_BYTES: u64 = 500 * 1024 * 1024;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be a whole number: {1}")]
    InvalidNumber(&'static str, ParseIntError),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("Unable to locate a download directory")]
    NoDownloadDir,
}

#[derive(Clone, Debug)]
pub struct DownloadSettings {
    /// Items downloading at once, across every job.
    pub max_concurrent: usize,
    /// Times a failed item is re-queued before it is marked failed.
    pub max_retry_attempts: u32,
    /// Largest total of uncompressed bytes a single archive may hold.
    pub max_zip_bytes: u64,
    pub output_dir: Option<PathBuf>,
    pub connect_timeout: Duration,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_concurrent: MAX_CONCURRENT_DOWNLOADS,
            max_retry_attempts: MAX_RETRY_ATTEMPTS,
            max_zip_bytes: MAX_ZIP_BYTES,
            output_dir: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_positive(key: &'static str) -> Result<Option<u64>, ConfigError> {
    match env_string(key) {
        Some(v) => match v.trim().parse::<u64>() {
            Ok(0) => Err(ConfigError::Zero(key)),
            Ok(n) => Ok(Some(n)),
            Err(e) => Err(ConfigError::InvalidNumber(key, e)),
        },
        None => Ok(None),
    }
}

impl DownloadSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        if let Some(max) = env_positive("TRACKHUB_MAX_CONCURRENT_DOWNLOADS")? {
            settings.max_concurrent = max as usize;
        }
        if let Some(attempts) = env_positive("TRACKHUB_MAX_RETRY_ATTEMPTS")? {
            settings.max_retry_attempts = attempts as u32;
        }
        if let Some(dir) = env_string("TRACKHUB_DOWNLOAD_DIR") {
            settings.output_dir = Some(PathBuf::from(dir));
        }
        Ok(settings)
    }

    /// The configured output directory, falling back to the user's download folder and then to
    /// the application data directory.
    pub fn download_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.output_dir {
            return Ok(dir.clone());
        }
        if let Some(dir) = directories::UserDirs::new().and_then(|d| d.download_dir().map(Into::into))
        {
            return Ok(dir);
        }
        let proj_dirs = directories::ProjectDirs::from("", "", "trackhub")
            .ok_or(ConfigError::NoDownloadDir)?;
        Ok(proj_dirs.data_dir().join("downloads"))
    }
}
