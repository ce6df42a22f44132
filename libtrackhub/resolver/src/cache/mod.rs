mod store;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
pub use store::*;
use tap::TapFallible;
use tracing::{debug, info, warn};

use crate::ResolvedUrls;
use crate::settings::ResolverSettings;
use crate::tracker::TrackerData;

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub tracker_id: String,
    pub tab: Option<String>,
    pub payload: TrackerData,
    pub resolved_urls: ResolvedUrls,
    /// Milliseconds since the unix epoch at write time.
    pub timestamp: u64,
}

/// Tracker payloads plus their resolved URLs, persisted per `(tracker id, tab)`.
///
/// Every operation is best-effort. Storage and serialization failures are logged and reported
/// as a miss (reads) or ignored (writes).
#[derive(Clone)]
pub struct ResolutionCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    prefix: String,
    ttl: Duration,
}

impl ResolutionCache {
    pub fn new(store: Arc<dyn CacheStore>, settings: &ResolverSettings) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), settings)
    }

    pub fn with_clock(
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        settings: &ResolverSettings,
    ) -> Self {
        Self {
            store,
            clock,
            prefix: settings.cache_prefix.clone(),
            ttl: settings.cache_ttl,
        }
    }

    /// `None` and `Some("")` produce different keys.
    pub fn key(&self, tracker_id: &str, tab: Option<&str>) -> String {
        match tab {
            Some(tab) => format!("{}{tracker_id}_{tab}", self.prefix),
            None => format!("{}{tracker_id}", self.prefix),
        }
    }

    fn is_expired(&self, entry: &CacheEntry, now: u64) -> bool {
        now.saturating_sub(entry.timestamp) > self.ttl.as_millis() as u64
    }

    pub fn get(&self, tracker_id: &str, tab: Option<&str>) -> Option<CacheEntry> {
        let key = self.key(tracker_id, tab);
        let raw = self
            .store
            .get(&key)
            .tap_err(|e| warn!("error reading cache key {key}: {e}"))
            .ok()??;

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("discarding corrupt cache entry {key}: {e}");
                self.remove_key(&key);
                return None;
            }
        };

        if self.is_expired(&entry, self.clock.now_millis()) {
            info!("cache entry {key} expired");
            self.remove_key(&key);
            return None;
        }
        debug!("cache hit for {key}");
        Some(entry)
    }

    /// Overwrites the whole entry for the key.
    pub fn set(
        &self,
        tracker_id: &str,
        tab: Option<&str>,
        payload: &TrackerData,
        resolved_urls: &ResolvedUrls,
    ) {
        let key = self.key(tracker_id, tab);
        let entry = CacheEntry {
            tracker_id: tracker_id.to_owned(),
            tab: tab.map(str::to_owned),
            payload: payload.clone(),
            resolved_urls: resolved_urls.clone(),
            timestamp: self.clock.now_millis(),
        };
        let Ok(raw) = serde_json::to_string(&entry)
            .tap_err(|e| warn!("error serializing cache entry {key}: {e}"))
        else {
            return;
        };
        let _ = self
            .store
            .set(&key, &raw)
            .tap_err(|e| warn!("error writing cache entry {key}: {e}"));
    }

    /// The cached resolution for one raw URL: `None` on a miss, `Some(None)` when it was
    /// attempted and found unplayable.
    pub fn lookup(
        &self,
        tracker_id: &str,
        tab: Option<&str>,
        normalized_url: &str,
    ) -> Option<Option<String>> {
        self.get(tracker_id, tab)?
            .resolved_urls
            .get(normalized_url)
            .cloned()
    }

    fn owned_keys(&self) -> Vec<String> {
        self.store
            .keys()
            .tap_err(|e| warn!("error listing cache keys: {e}"))
            .unwrap_or_default()
            .into_iter()
            .filter(|k| k.starts_with(&self.prefix))
            .collect()
    }

    fn remove_key(&self, key: &str) {
        let _ = self
            .store
            .remove(key)
            .tap_err(|e| warn!("error removing cache entry {key}: {e}"));
    }

    /// Removes every entry under this cache's prefix. Returns the number removed.
    pub fn clear(&self) -> usize {
        let keys = self.owned_keys();
        for key in &keys {
            self.remove_key(key);
        }
        keys.len()
    }

    /// Removes expired and unreadable entries. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut removed = 0;
        for key in self.owned_keys() {
            let keep = self
                .store
                .get(&key)
                .ok()
                .flatten()
                .and_then(|raw| serde_json::from_str::<CacheEntry>(&raw).ok())
                .is_some_and(|entry| !self.is_expired(&entry, now));
            if !keep {
                self.remove_key(&key);
                removed += 1;
            }
        }
        removed
    }
}

#[cfg(test)]
#[path = "./cache_test.rs"]
mod cache_test;
