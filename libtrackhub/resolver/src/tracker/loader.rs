use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{TrackerData, TrackerError, TrackerId, TrackerSource};
use crate::{BatchResolver, ResolvedUrls};

#[derive(Debug, Clone)]
pub struct LoadedTracker {
    pub id: TrackerId,
    pub tab: Option<String>,
    pub data: TrackerData,
    pub resolved: ResolvedUrls,
    pub from_cache: bool,
}

/// Fetches a tracker and resolves its tracks. Starting a new load cancels the one in flight so
/// a slow response for a tracker the user already navigated away from never reaches the cache.
pub struct TrackerLoader {
    source: Arc<dyn TrackerSource>,
    batch: Arc<BatchResolver>,
    in_flight: Mutex<Option<CancellationToken>>,
}

impl TrackerLoader {
    pub fn new(source: Arc<dyn TrackerSource>, batch: Arc<BatchResolver>) -> Self {
        Self {
            source,
            batch,
            in_flight: Mutex::new(None),
        }
    }

    pub fn batch(&self) -> &Arc<BatchResolver> {
        &self.batch
    }

    fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = in_flight.replace(token.clone()) {
            info!("cancelling previous tracker load");
            previous.cancel();
        }
        token
    }

    /// Cancels whatever load is currently running.
    pub fn cancel(&self) {
        if let Some(token) = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            token.cancel();
        }
    }

    pub async fn load<P>(
        &self,
        id: &TrackerId,
        tab: Option<&str>,
        on_progress: P,
    ) -> Result<LoadedTracker, TrackerError>
    where
        P: FnMut(usize, usize),
    {
        let token = self.begin();
        let loaded = |data, resolved, from_cache| LoadedTracker {
            id: id.clone(),
            tab: tab.map(str::to_owned),
            data,
            resolved,
            from_cache,
        };

        if let Some(entry) = self.batch.cache().get(id.as_str(), tab) {
            self.batch.shared().extend(entry.resolved_urls.clone());
            return Ok(loaded(entry.payload, entry.resolved_urls, true));
        }

        let data = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(TrackerError::Cancelled),
            data = self.source.fetch(id, tab) => data?,
        };
        let resolved = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(TrackerError::Cancelled),
            resolved = self.batch.resolve_tracker(id.as_str(), tab, &data, on_progress) => resolved,
        };
        Ok(loaded(data, resolved, false))
    }
}
