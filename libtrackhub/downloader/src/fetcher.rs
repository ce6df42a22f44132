use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::header;
use thiserror::Error;
use tracing::debug;

use crate::settings::DownloadSettings;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Error downloading media: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Media host returned status {0}")]
    Status(u16),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Downloads a resolved media URL in full, reporting percentage progress as bytes arrive.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<FetchedMedia, FetchError>;
}

pub struct HttpMediaFetcher {
    client: reqwest::Client,
}

impl HttpMediaFetcher {
    pub fn new(settings: &DownloadSettings) -> Result<Self, FetchError> {
        // no overall timeout; large files legitimately take a while
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()?;
        Ok(Self { client })
    }
}

fn percent(received: u64, total: u64) -> u8 {
    ((received.saturating_mul(100)) / total).min(100) as u8
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(
        &self,
        url: &str,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<FetchedMedia, FetchError> {
        let res = self.client.get(url).send().await?;
        if !res.status().is_success() {
            return Err(FetchError::Status(res.status().as_u16()));
        }
        let content_type = res
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let total = res.content_length().filter(|len| *len > 0);
        debug!("downloading {url} ({total:?} bytes, {content_type:?})");

        let mut buf = BytesMut::with_capacity(total.unwrap_or_default() as usize);
        let mut last = 0;
        let mut stream = res.bytes_stream();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
            if let Some(total) = total {
                let progress = percent(buf.len() as u64, total);
                if progress != last {
                    last = progress;
                    on_progress(progress);
                }
            }
        }
        if last != 100 {
            on_progress(100);
        }

        Ok(FetchedMedia {
            bytes: buf.freeze(),
            content_type,
        })
    }
}
