use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Stable, non-cryptographic id for a raw track URL.
///
/// A 31-multiplier rolling hash over UTF-16 code units, printed as 8 hex digits. The value is
/// persisted in share links so the algorithm must never change.
pub fn track_id(raw_url: &str) -> String {
    let hash = raw_url
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32));
    format!("{:08x}", hash as u32)
}

/// URL-safe token carrying a raw URL in a share link.
pub fn encode_share_token(raw_url: &str) -> String {
    URL_SAFE_NO_PAD.encode(raw_url)
}

/// Inverse of [`encode_share_token`]. Returns `None` for anything that isn't a token this crate
/// produced.
pub fn decode_share_token(token: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(token.trim().trim_end_matches('=')).ok()?;
    String::from_utf8(bytes).ok()
}
