use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::future::join_all;
use itertools::Itertools;
use tracing::info;

use crate::ResolvedUrls;
use crate::cache::ResolutionCache;
use crate::provider::normalize_url;
use crate::resolver::UrlResolver;
use crate::tracker::TrackerData;

pub const BATCH_SIZE: usize = 10;

/// A resolved-URL map that can be read while a resolution pass is still writing to it.
/// Readers must expect keys that haven't been resolved yet.
#[derive(Clone, Debug, Default)]
pub struct SharedResolved {
    inner: Arc<RwLock<ResolvedUrls>>,
}

impl SharedResolved {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, ResolvedUrls> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ResolvedUrls> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// `None` if the URL hasn't been attempted, `Some(None)` if it was attempted and failed.
    pub fn get(&self, raw_url: &str) -> Option<Option<String>> {
        self.read().get(&normalize_url(raw_url)).cloned()
    }

    pub fn playable(&self, raw_url: &str) -> Option<String> {
        self.get(raw_url).flatten()
    }

    pub fn contains(&self, raw_url: &str) -> bool {
        self.read().contains_key(&normalize_url(raw_url))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn snapshot(&self) -> ResolvedUrls {
        self.read().clone()
    }

    pub fn extend(&self, resolved: impl IntoIterator<Item = (String, Option<String>)>) {
        self.write().extend(resolved);
    }

    pub fn clear(&self) {
        self.write().clear();
    }
}

/// Resolves every track URL of a tracker in fixed-size waves, publishing each wave as soon as
/// it completes.
pub struct BatchResolver {
    resolver: Arc<UrlResolver>,
    cache: ResolutionCache,
    shared: SharedResolved,
    batch_size: usize,
}

impl BatchResolver {
    pub fn new(resolver: Arc<UrlResolver>, cache: ResolutionCache) -> Self {
        Self {
            resolver,
            cache,
            shared: SharedResolved::new(),
            batch_size: BATCH_SIZE,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn shared(&self) -> &SharedResolved {
        &self.shared
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Resolves the distinct URLs in `urls` that aren't already known. `on_progress` receives
    /// `(resolved so far, total to resolve)` after every wave.
    pub async fn resolve_all<P>(&self, urls: &[String], mut on_progress: P) -> ResolvedUrls
    where
        P: FnMut(usize, usize),
    {
        let unique: Vec<String> = urls.iter().map(|u| normalize_url(u)).unique().collect();
        let (known, pending): (Vec<_>, Vec<_>) =
            unique.into_iter().partition(|u| self.shared.contains(u));

        let mut results = ResolvedUrls::with_capacity(known.len() + pending.len());
        for url in known {
            if let Some(resolved) = self.shared.get(&url) {
                results.insert(url, resolved);
            }
        }

        let total = pending.len();
        let mut done = 0;
        info!(
            "resolving {total} urls in {} batches",
            total.div_ceil(self.batch_size)
        );
        for batch in pending.chunks(self.batch_size) {
            let resolved = join_all(batch.iter().map(|url| self.resolver.resolve(url))).await;
            let wave: Vec<_> = batch.iter().cloned().zip(resolved).collect();
            done += wave.len();
            self.shared.extend(wave.iter().cloned());
            results.extend(wave);
            on_progress(done, total);
        }
        results
    }

    /// Serves the tracker's resolutions from the cache when possible, otherwise resolves every
    /// URL in the payload and writes the full result through to the cache.
    pub async fn resolve_tracker<P>(
        &self,
        tracker_id: &str,
        tab: Option<&str>,
        payload: &TrackerData,
        on_progress: P,
    ) -> ResolvedUrls
    where
        P: FnMut(usize, usize),
    {
        if let Some(entry) = self.cache.get(tracker_id, tab) {
            info!("using cached resolutions for {tracker_id}");
            self.shared.extend(entry.resolved_urls.clone());
            return entry.resolved_urls;
        }
        let resolved = self.resolve_all(&payload.raw_urls(), on_progress).await;
        self.cache.set(tracker_id, tab, payload, &resolved);
        resolved
    }

    /// Resolves a single URL, answering from the shared map when it's already known.
    pub async fn resolve_one(&self, raw_url: &str) -> Option<String> {
        let url = normalize_url(raw_url);
        if let Some(resolved) = self.shared.get(&url) {
            return resolved;
        }
        let resolved = self.resolver.resolve(&url).await;
        self.shared.extend([(url, resolved.clone())]);
        resolved
    }
}

#[cfg(test)]
#[path = "./batch_test.rs"]
mod batch_test;
