use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::header;
use tap::TapFallible;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dto::playback_track::PlaybackTrack;

/// Resources held for one upcoming track. Dropping the handle releases them.
#[derive(Debug)]
pub struct PreloadHandle {
    track_id: String,
    token: CancellationToken,
    data: Arc<Mutex<Option<Bytes>>>,
}

impl PreloadHandle {
    pub fn new(track_id: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            token: CancellationToken::new(),
            data: Arc::default(),
        }
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    /// Cancelled as soon as the handle is released.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_released(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The bytes fetched so far, once the preload has finished.
    pub fn data(&self) -> Option<Bytes> {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn slot(&self) -> Arc<Mutex<Option<Bytes>>> {
        self.data.clone()
    }
}

impl Drop for PreloadHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub trait MediaPreloader: Send + Sync {
    /// Starts warming up a track. `None` if the track can't be preloaded.
    fn preload(&self, track: &PlaybackTrack) -> Option<PreloadHandle>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoPreload;

impl MediaPreloader for NoPreload {
    fn preload(&self, _track: &PlaybackTrack) -> Option<PreloadHandle> {
        None
    }
}

/// Fetches the first `bytes` of each upcoming track on a background task.
#[derive(Debug, Clone)]
pub struct HttpPreloader {
    client: reqwest::Client,
    bytes: u64,
}

impl HttpPreloader {
    pub fn new(bytes: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            bytes,
        }
    }
}

async fn fetch_head(client: reqwest::Client, url: String, limit: u64) -> Result<Bytes, reqwest::Error> {
    let res = client
        .get(&url)
        .header(header::RANGE, format!("bytes=0-{}", limit.saturating_sub(1)))
        .send()
        .await?
        .error_for_status()?;
    let mut buf = BytesMut::new();
    let mut stream = res.bytes_stream();
    // servers that ignore Range send the whole file, stop reading once there's enough
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
        if buf.len() as u64 >= limit {
            buf.truncate(limit as usize);
            break;
        }
    }
    Ok(buf.freeze())
}

impl MediaPreloader for HttpPreloader {
    fn preload(&self, track: &PlaybackTrack) -> Option<PreloadHandle> {
        let url = track.playable_url.clone()?;
        let runtime = Handle::try_current()
            .tap_err(|e| warn!("not preloading {}: {e}", track.name))
            .ok()?;
        let handle = PreloadHandle::new(&track.id);
        let token = handle.token().clone();
        let slot = handle.slot();
        let client = self.client.clone();
        let limit = self.bytes;
        let name = track.name.clone();

        runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!("preload of {name} released"),
                res = fetch_head(client, url, limit) => {
                    if let Ok(bytes) = res.tap_err(|e| warn!("error preloading {name}: {e}")) {
                        debug!("preloaded {} bytes of {name}", bytes.len());
                        *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(bytes);
                    }
                }
            }
        });
        Some(handle)
    }
}

/// Keeps preload handles for the next few tracks and nothing else.
pub struct PreloadWindow {
    size: usize,
    preloader: Arc<dyn MediaPreloader>,
    handles: Vec<PreloadHandle>,
}

impl PreloadWindow {
    pub fn new(size: usize, preloader: Arc<dyn MediaPreloader>) -> Self {
        Self {
            size,
            preloader,
            handles: vec![],
        }
    }

    /// Releases handles for tracks that left the window and starts the ones that entered it.
    pub fn sync<'a>(&mut self, upcoming: impl IntoIterator<Item = &'a PlaybackTrack>) {
        // a track queued twice holds one handle
        let mut seen = HashSet::new();
        let wanted: Vec<&PlaybackTrack> = upcoming
            .into_iter()
            .filter(|t| seen.insert(t.id.as_str()))
            .take(self.size)
            .collect();
        self.handles
            .retain(|h| wanted.iter().any(|t| t.id == h.track_id));

        let mut handles = Vec::with_capacity(wanted.len());
        for track in wanted {
            let existing = self
                .handles
                .iter()
                .position(|h| h.track_id == track.id)
                .map(|i| self.handles.swap_remove(i));
            if let Some(handle) = existing.or_else(|| self.preloader.preload(track)) {
                handles.push(handle);
            }
        }
        self.handles = handles;
    }

    pub fn get(&self, track_id: &str) -> Option<&PreloadHandle> {
        self.handles.iter().find(|h| h.track_id == track_id)
    }

    /// Moves a handle out of the window, e.g. when its track starts playing.
    pub fn take(&mut self, track_id: &str) -> Option<PreloadHandle> {
        let index = self.handles.iter().position(|h| h.track_id == track_id)?;
        Some(self.handles.remove(index))
    }

    pub fn track_ids(&self) -> Vec<&str> {
        self.handles.iter().map(|h| h.track_id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }
}
