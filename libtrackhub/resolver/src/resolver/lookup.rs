use serde::Deserialize;
use serde_json::Value;

use super::LookupError;

#[derive(Deserialize)]
struct KrakenfilesResponse {
    #[serde(default)]
    success: bool,
    url: Option<String>,
}

#[derive(Deserialize)]
struct ImgurResponse {
    status: Option<String>,
    download_url: Option<String>,
}

#[derive(Deserialize)]
struct SoundcloudResponse {
    #[serde(default)]
    success: bool,
    stream_url: Option<String>,
}

#[derive(Deserialize)]
struct QobuzResponse {
    #[serde(default)]
    success: bool,
    data: Option<QobuzData>,
}

#[derive(Deserialize)]
struct QobuzData {
    url: Option<String>,
}

fn non_empty(url: Option<String>, field: &'static str) -> Result<String, LookupError> {
    url.filter(|u| !u.is_empty())
        .ok_or(LookupError::MissingField(field))
}

pub(super) fn krakenfiles(body: Value) -> Result<String, LookupError> {
    let res: KrakenfilesResponse = serde_json::from_value(body)?;
    if !res.success {
        return Err(LookupError::Rejected);
    }
    non_empty(res.url, "url")
}

pub(super) fn imgur(body: Value) -> Result<String, LookupError> {
    let res: ImgurResponse = serde_json::from_value(body)?;
    if res.status.as_deref() != Some("ok") {
        return Err(LookupError::Rejected);
    }
    non_empty(res.download_url, "download_url")
}

pub(super) fn soundcloud(body: Value) -> Result<String, LookupError> {
    let res: SoundcloudResponse = serde_json::from_value(body)?;
    if !res.success {
        return Err(LookupError::Rejected);
    }
    non_empty(res.stream_url, "stream_url")
}

pub(super) fn qobuz(body: Value) -> Result<String, LookupError> {
    let res: QobuzResponse = serde_json::from_value(body)?;
    if !res.success {
        return Err(LookupError::Rejected);
    }
    non_empty(res.data.and_then(|d| d.url), "data.url")
}
