use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::header;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::RetryTransientMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use thiserror::Error;
use tracing::{info, warn};

use super::{TrackerData, TrackerId};
use crate::settings::ResolverSettings;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("{0} is not a valid tracker id")]
    InvalidId(String),
    #[error("Tracker service redirected to {0:?}")]
    Redirected(Option<String>),
    #[error("Tracker service returned status {0}")]
    Status(u16),
    #[error("Tracker has no eras")]
    Empty,
    #[error("Error contacting tracker service: {0}")]
    Transport(String),
    #[error("Invalid tracker response: {0}")]
    Decode(String),
    #[error("Request was superseded")]
    Cancelled,
}

impl TrackerError {
    /// Whether the UI should offer the non-live fallback source rather than an error.
    pub fn is_fallback(&self) -> bool {
        !matches!(self, TrackerError::InvalidId(_) | TrackerError::Cancelled)
    }
}

/// Where tracker payloads come from.
#[async_trait]
pub trait TrackerSource: Send + Sync {
    async fn fetch(&self, id: &TrackerId, tab: Option<&str>) -> Result<TrackerData, TrackerError>;
}

pub struct TrackerClient {
    client: ClientWithMiddleware,
    base_url: String,
}

impl TrackerClient {
    pub fn new(settings: &ResolverSettings) -> Result<Self, TrackerError> {
        // a redirect means the service is down and bouncing to its status page
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| TrackerError::Transport(e.to_string()))?;
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(2);
        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        Ok(Self {
            client,
            base_url: settings.tracker_base_url.trim_end_matches('/').to_owned(),
        })
    }
}

#[async_trait]
impl TrackerSource for TrackerClient {
    async fn fetch(&self, id: &TrackerId, tab: Option<&str>) -> Result<TrackerData, TrackerError> {
        let mut req = self.client.get(format!("{}/get/{id}", self.base_url));
        if let Some(tab) = tab {
            req = req.query(&[("tab", tab)]);
        }
        info!("fetching tracker {id} tab {tab:?}");
        let res = req
            .send()
            .await
            .map_err(|e| TrackerError::Transport(e.to_string()))?;

        let status = res.status();
        if status.is_redirection() {
            let location = res
                .headers()
                .get(header::LOCATION)
                .and_then(|l| l.to_str().ok())
                .map(str::to_owned);
            warn!("tracker service redirected to {location:?}");
            return Err(TrackerError::Redirected(location));
        }
        if !status.is_success() {
            return Err(TrackerError::Status(status.as_u16()));
        }

        let body = res
            .bytes()
            .await
            .map_err(|e| TrackerError::Transport(e.to_string()))?;
        parse_tracker(&body)
    }
}

pub fn parse_tracker(body: &[u8]) -> Result<TrackerData, TrackerError> {
    let data: TrackerData =
        serde_json::from_slice(body).map_err(|e| TrackerError::Decode(e.to_string()))?;
    if !data.has_eras() {
        return Err(TrackerError::Empty);
    }
    Ok(data)
}
