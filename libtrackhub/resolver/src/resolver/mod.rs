mod lookup;
mod tidal;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::RetryTransientMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use serde_json::Value;
use tap::TapFallible;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;
pub use tidal::MirrorCursor;

use crate::provider::{self, Lookup, Strategy};
use crate::settings::{LookupEndpoints, ResolverSettings};

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Error sending request: {0}")]
    Request(#[from] reqwest_middleware::Error),
    #[error("Error reading response body: {0}")]
    Body(#[from] reqwest::Error),
    #[error("Resolver returned status {0}")]
    Status(u16),
    #[error("Invalid resolver url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Resolver reported failure")]
    Rejected,
    #[error("Response is missing field {0}")]
    MissingField(&'static str),
    #[error("Invalid manifest: {0}")]
    Manifest(String),
    #[error("No mirrors configured")]
    NoMirrors,
    #[error("Could not extract an id from {0}")]
    NoIdentifier(String),
}

/// GETs a URL and parses the body as JSON. Non-2xx responses are errors.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn get_json(&self, url: Url) -> Result<Value, LookupError>;
}

pub struct ReqwestFetcher {
    client: ClientWithMiddleware,
}

impl ReqwestFetcher {
    pub fn new(settings: &ResolverSettings) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()?;
        // one quick retry; mirrors and the batch pass cover anything more persistent
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(1);
        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        Ok(Self { client })
    }
}

#[async_trait]
impl JsonFetcher for ReqwestFetcher {
    async fn get_json(&self, url: Url) -> Result<Value, LookupError> {
        let res = self.client.get(url).send().await?;
        if !res.status().is_success() {
            return Err(LookupError::Status(res.status().as_u16()));
        }
        Ok(res.json().await?)
    }
}

/// Turns raw track URLs into directly fetchable media URLs.
///
/// Every failure mode (pattern mismatch, transport error, bad payload) comes back as `None`, so
/// callers can treat "unplayable" as a value instead of an error path.
pub struct UrlResolver {
    fetcher: Arc<dyn JsonFetcher>,
    endpoints: LookupEndpoints,
    mirrors: MirrorCursor,
}

impl UrlResolver {
    pub fn new(settings: &ResolverSettings) -> Result<Self, LookupError> {
        let fetcher = ReqwestFetcher::new(settings)?;
        Ok(Self::with_fetcher(
            settings,
            Arc::new(fetcher),
            MirrorCursor::new(settings.tidal_mirrors.clone()),
        ))
    }

    pub fn with_fetcher(
        settings: &ResolverSettings,
        fetcher: Arc<dyn JsonFetcher>,
        mirrors: MirrorCursor,
    ) -> Self {
        Self {
            fetcher,
            endpoints: settings.endpoints.clone(),
            mirrors,
        }
    }

    pub fn mirrors(&self) -> &MirrorCursor {
        &self.mirrors
    }

    pub async fn resolve(&self, raw_url: &str) -> Option<String> {
        let url = provider::normalize_url(raw_url);
        let provider = provider::classify_normalized(&url);
        let spec = provider.spec();
        debug!("resolving {url} as {provider}");

        match spec.strategy {
            Strategy::Rewrite(template) => {
                let resolved = spec.identifier(&url).map(|id| template.replace("{id}", id));
                if resolved.is_none() {
                    info!("{url} did not match the {provider} download pattern");
                }
                resolved
            }
            Strategy::Lookup(lookup) => self
                .lookup(lookup, &url, spec.identifier(&url))
                .await
                .tap_err(|e| warn!("error resolving {url} via {provider}: {e}"))
                .ok(),
            Strategy::Passthrough => Some(url),
            Strategy::Unsupported => None,
        }
    }

    async fn lookup(
        &self,
        kind: Lookup,
        url: &str,
        id: Option<&str>,
    ) -> Result<String, LookupError> {
        let id = id.ok_or_else(|| LookupError::NoIdentifier(url.to_owned()))?;
        match kind {
            Lookup::Krakenfiles => {
                let req = Url::parse_with_params(&self.endpoints.krakenfiles, [("id", id)])?;
                lookup::krakenfiles(self.fetcher.get_json(req).await?)
            }
            Lookup::Imgur => {
                let req = Url::parse_with_params(&self.endpoints.imgur, [("id", id)])?;
                lookup::imgur(self.fetcher.get_json(req).await?)
            }
            Lookup::Soundcloud => {
                let req = Url::parse_with_params(&self.endpoints.soundcloud, [("url", url)])?;
                lookup::soundcloud(self.fetcher.get_json(req).await?)
            }
            Lookup::Qobuz => {
                let req = Url::parse_with_params(
                    &self.endpoints.qobuz,
                    [("track_id", id), ("quality", "27")],
                )?;
                lookup::qobuz(self.fetcher.get_json(req).await?)
            }
            Lookup::Tidal => {
                let mirror = self.mirrors.next_mirror().ok_or(LookupError::NoMirrors)?;
                let req = Url::parse_with_params(
                    &format!("{}/track/", mirror.trim_end_matches('/')),
                    [("id", id), ("quality", "LOSSLESS")],
                )?;
                info!("resolving tidal track {id} through {mirror}");
                tidal::first_manifest_url(&self.fetcher.get_json(req).await?)
            }
        }
    }
}
