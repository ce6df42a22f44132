use std::collections::HashSet;

pub const DEFAULT_EXTENSION: &str = "mp3";
pub const UNKNOWN_ERA: &str = "Unknown Era";
const FALLBACK_NAME: &str = "track";

const CONTENT_TYPES: [(&str, &str); 14] = [
    ("audio/mpeg", "mp3"),
    ("audio/mp3", "mp3"),
    ("audio/mp4", "m4a"),
    ("audio/x-m4a", "m4a"),
    ("audio/m4a", "m4a"),
    ("audio/flac", "flac"),
    ("audio/x-flac", "flac"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    ("audio/wave", "wav"),
    ("audio/ogg", "ogg"),
    ("audio/aac", "aac"),
    ("audio/webm", "webm"),
    ("audio/opus", "opus"),
];

const URL_HINTS: [(&str, &str); 8] = [
    (".flac", "flac"),
    (".wav", "wav"),
    (".m4a", "m4a"),
    (".ogg", "ogg"),
    (".opus", "opus"),
    (".aac", "aac"),
    (".webm", "webm"),
    (".mp3", "mp3"),
];

/// Picks a file extension from the response content type, then from the URL, then falls back
/// to mp3.
pub fn extension_for(content_type: Option<&str>, url: &str) -> &'static str {
    let from_type = content_type.and_then(|ct| {
        let mime = ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        CONTENT_TYPES
            .iter()
            .find(|(known, _)| *known == mime)
            .map(|(_, ext)| *ext)
    });
    if let Some(ext) = from_type {
        return ext;
    }
    let url = url.to_ascii_lowercase();
    URL_HINTS
        .iter()
        .find(|(hint, _)| url.contains(hint))
        .map(|(_, ext)| *ext)
        .unwrap_or(DEFAULT_EXTENSION)
}

/// Makes a name safe to use as a single path component on every common filesystem.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_end_matches('.').trim_end();
    if cleaned.is_empty() {
        FALLBACK_NAME.to_owned()
    } else {
        cleaned.to_owned()
    }
}

pub fn era_folder(era_name: Option<&str>) -> String {
    match era_name.map(str::trim).filter(|e| !e.is_empty()) {
        Some(era) => sanitize_file_name(era),
        None => UNKNOWN_ERA.to_owned(),
    }
}

/// Hands out unique archive paths. A second `Song.mp3` in the same folder becomes
/// `Song (2).mp3`. Comparison ignores case.
#[derive(Debug, Default)]
pub(crate) struct PathAllocator {
    used: HashSet<String>,
}

impl PathAllocator {
    pub(crate) fn allocate(&mut self, folder: &str, stem: &str, extension: &str) -> String {
        let mut n = 1;
        loop {
            let candidate = if n == 1 {
                format!("{folder}/{stem}.{extension}")
            } else {
                format!("{folder}/{stem} ({n}).{extension}")
            };
            if self.used.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Some("audio/flac"), "https://a.test/file.mp3", "flac")]
    #[case(Some("audio/mpeg; charset=binary"), "https://a.test/x", "mp3")]
    #[case(Some("Audio/X-M4A"), "https://a.test/x", "m4a")]
    #[case(Some("application/octet-stream"), "https://a.test/song.WAV?dl=1", "wav")]
    #[case(None, "https://a.test/song.opus", "opus")]
    #[case(None, "https://api.pillows.su/api/download/abc", "mp3")]
    #[case(Some(""), "", "mp3")]
    fn picks_extension(#[case] content_type: Option<&str>, #[case] url: &str, #[case] expected: &str) {
        assert_eq!(expected, extension_for(content_type, url));
    }

    #[rstest]
    #[case("Song Name", "Song Name")]
    #[case("What? / Why: \"Now\"", "What_ _ Why_ _Now_")]
    #[case("a<b>c|d*e\\f", "a_b_c_d_e_f")]
    #[case("tab\tname", "tab_name")]
    #[case("  trailing dots... ", "trailing dots")]
    #[case("", "track")]
    #[case("...", "track")]
    fn sanitizes(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(expected, sanitize_file_name(name));
    }

    #[rstest]
    #[case(Some("My Era"), "My Era")]
    #[case(Some("Era: 2"), "Era_ 2")]
    #[case(Some("  "), "Unknown Era")]
    #[case(None, "Unknown Era")]
    fn folders(#[case] era: Option<&str>, #[case] expected: &str) {
        assert_eq!(expected, era_folder(era));
    }

    #[test]
    fn duplicate_names_get_suffixes() {
        let mut paths = PathAllocator::default();
        assert_eq!("Era/Song.mp3", paths.allocate("Era", "Song", "mp3"));
        assert_eq!("Era/Song (2).mp3", paths.allocate("Era", "Song", "mp3"));
        assert_eq!("Era/song (3).mp3", paths.allocate("Era", "song", "mp3"));
        assert_eq!("Era/Song.flac", paths.allocate("Era", "Song", "flac"));
        assert_eq!("Other/Song.mp3", paths.allocate("Other", "Song", "mp3"));
    }
}
