use std::sync::atomic::{AtomicUsize, Ordering};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::Value;

use super::LookupError;

/// Round-robin position over a fixed pool of Tidal API mirrors.
///
/// Each call to [`MirrorCursor::next_mirror`] advances the cursor, which spreads load and gives
/// implicit failover: a dead mirror only costs the request that landed on it.
#[derive(Debug)]
pub struct MirrorCursor {
    mirrors: Vec<String>,
    position: AtomicUsize,
}

impl MirrorCursor {
    pub fn new(mirrors: Vec<String>) -> Self {
        Self::starting_at(mirrors, 0)
    }

    pub fn starting_at(mirrors: Vec<String>, position: usize) -> Self {
        Self {
            mirrors,
            position: AtomicUsize::new(position),
        }
    }

    pub fn next_mirror(&self) -> Option<&str> {
        if self.mirrors.is_empty() {
            return None;
        }
        let position = self.position.fetch_add(1, Ordering::Relaxed);
        self.mirrors
            .get(position % self.mirrors.len())
            .map(String::as_str)
    }

    pub fn position(&self) -> usize {
        self.position.load(Ordering::Relaxed)
    }

    pub fn mirrors(&self) -> &[String] {
        &self.mirrors
    }
}

#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    urls: Vec<String>,
}

// Mirrors disagree on where the manifest lives: top level, under `data`, or in one element of
// an array response.
fn find_manifest(body: &Value) -> Option<&str> {
    match body {
        Value::Array(items) => items.iter().find_map(find_manifest),
        Value::Object(obj) => obj
            .get("manifest")
            .and_then(Value::as_str)
            .or_else(|| obj.get("data").and_then(find_manifest)),
        _ => None,
    }
}

pub(super) fn first_manifest_url(body: &Value) -> Result<String, LookupError> {
    let encoded = find_manifest(body).ok_or(LookupError::MissingField("manifest"))?;
    let decoded = BASE64
        .decode(encoded.trim())
        .map_err(|e| LookupError::Manifest(format!("not base64: {e}")))?;
    if decoded.first() != Some(&b'{') {
        // DASH (XML) manifests are segmented and can't be played from a single URL
        return Err(LookupError::Manifest("unsupported manifest format".to_owned()));
    }
    let manifest: Manifest = serde_json::from_slice(&decoded)?;
    manifest
        .urls
        .into_iter()
        .find(|u| !u.is_empty())
        .ok_or(LookupError::MissingField("urls"))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn encode(manifest: &str) -> String {
        BASE64.encode(manifest)
    }

    #[test]
    fn cursor_wraps() {
        let cursor = MirrorCursor::new(vec!["a".into(), "b".into(), "c".into()]);
        let picked: Vec<_> = (0..5).map(|_| cursor.next_mirror().unwrap()).collect();
        assert_eq!(vec!["a", "b", "c", "a", "b"], picked);
        assert_eq!(5, cursor.position());
    }

    #[test]
    fn cursor_starting_position() {
        let cursor = MirrorCursor::starting_at(vec!["a".into(), "b".into()], 3);
        assert_eq!(Some("b"), cursor.next_mirror());
        assert_eq!(Some("a"), cursor.next_mirror());
    }

    #[test]
    fn empty_cursor() {
        assert_eq!(None, MirrorCursor::new(vec![]).next_mirror());
    }

    #[test]
    fn manifest_under_data() {
        let manifest = encode(r#"{"mimeType":"audio/flac","urls":["https://t.example/1.flac","https://t.example/2.flac"]}"#);
        let body = json!({"version": "2.0", "data": {"trackId": 1, "manifest": manifest}});
        assert_eq!("https://t.example/1.flac", first_manifest_url(&body).unwrap());
    }

    #[test]
    fn manifest_in_array() {
        let manifest = encode(r#"{"urls":["https://t.example/x.flac"]}"#);
        let body = json!([{"id": 1}, {"manifest": manifest}]);
        assert_eq!("https://t.example/x.flac", first_manifest_url(&body).unwrap());
    }

    #[test]
    fn dash_manifest_rejected() {
        let body = json!({"manifest": encode("<MPD></MPD>")});
        assert_matches!(first_manifest_url(&body), Err(LookupError::Manifest(_)));
    }

    #[test]
    fn missing_manifest() {
        assert_matches!(
            first_manifest_url(&json!({"data": {}})),
            Err(LookupError::MissingField("manifest"))
        );
    }
}
