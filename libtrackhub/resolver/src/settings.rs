use std::env;
use std::num::ParseIntError;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_TRACKER_BASE_URL: &str = "https://api.trackhub.dev";
pub const DEFAULT_CACHE_PREFIX: &str = "tracker_cache_";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be a whole number: {1}")]
    InvalidNumber(&'static str, ParseIntError),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupEndpoints {
    pub krakenfiles: String,
    pub imgur: String,
    pub soundcloud: String,
    pub qobuz: String,
}

impl Default for LookupEndpoints {
    fn default() -> Self {
        Self {
            krakenfiles: format!("{DEFAULT_TRACKER_BASE_URL}/resolve/krakenfiles"),
            imgur: format!("{DEFAULT_TRACKER_BASE_URL}/resolve/imgur"),
            soundcloud: format!("{DEFAULT_TRACKER_BASE_URL}/resolve/soundcloud"),
            qobuz: "https://qobuz.squid.wtf/api/download-music".to_owned(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResolverSettings {
    pub tracker_base_url: String,
    pub endpoints: LookupEndpoints,
    pub tidal_mirrors: Vec<String>,
    pub cache_prefix: String,
    pub cache_ttl: Duration,
    pub batch_size: usize,
    pub request_timeout: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            tracker_base_url: DEFAULT_TRACKER_BASE_URL.to_owned(),
            endpoints: LookupEndpoints::default(),
            tidal_mirrors: vec![
                "https://triton.squid.wtf".to_owned(),
                "https://hifi.401658.xyz".to_owned(),
                "https://tidal.kinoplus.online".to_owned(),
            ],
            cache_prefix: DEFAULT_CACHE_PREFIX.to_owned(),
            cache_ttl: DEFAULT_CACHE_TTL,
            batch_size: crate::BATCH_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_number(key: &'static str) -> Result<Option<u64>, ConfigError> {
    env_string(key)
        .map(|v| v.trim().parse().map_err(|e| ConfigError::InvalidNumber(key, e)))
        .transpose()
}

impl ResolverSettings {
    /// Defaults overlaid with any `TRACKHUB_*` variables present in the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        if let Some(base) = env_string("TRACKHUB_TRACKER_URL") {
            settings.tracker_base_url = base.trim_end_matches('/').to_owned();
        }
        if let Some(url) = env_string("TRACKHUB_KRAKENFILES_RESOLVER") {
            settings.endpoints.krakenfiles = url;
        }
        if let Some(url) = env_string("TRACKHUB_IMGUR_RESOLVER") {
            settings.endpoints.imgur = url;
        }
        if let Some(url) = env_string("TRACKHUB_SOUNDCLOUD_RESOLVER") {
            settings.endpoints.soundcloud = url;
        }
        if let Some(url) = env_string("TRACKHUB_QOBUZ_RESOLVER") {
            settings.endpoints.qobuz = url;
        }
        if let Some(mirrors) = env_string("TRACKHUB_TIDAL_MIRRORS") {
            settings.tidal_mirrors = mirrors
                .split(',')
                .map(|m| m.trim().trim_end_matches('/').to_owned())
                .filter(|m| !m.is_empty())
                .collect();
        }
        if let Some(prefix) = env_string("TRACKHUB_CACHE_PREFIX") {
            settings.cache_prefix = prefix;
        }
        if let Some(secs) = env_number("TRACKHUB_CACHE_TTL_SECS")? {
            settings.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(size) = env_number("TRACKHUB_BATCH_SIZE")? {
            if size == 0 {
                return Err(ConfigError::Zero("TRACKHUB_BATCH_SIZE"));
            }
            settings.batch_size = size as usize;
        }
        if let Some(secs) = env_number("TRACKHUB_REQUEST_TIMEOUT_SECS")? {
            settings.request_timeout = Duration::from_secs(secs);
        }
        Ok(settings)
    }
}
