use pretty_assertions::assert_eq;
use rstest::rstest;
use strum::IntoEnumIterator;

use super::*;

#[rstest]
#[case("https://pillows.su/f/0123456789abcdef", Provider::Pillows)]
#[case("https://api.pillows.su/api/download/0123456789abcdef", Provider::Pillows)]
#[case("https://pillowcase.su/f/0123456789abcdef", Provider::Pillows)]
#[case("https://api.pillowcase.su/api/download/0123456789abcdef", Provider::Pillows)]
#[case("http://www.pillowcase.su/f/abc", Provider::Pillows)]
#[case("https://music.froste.lol/song/abc123", Provider::Froste)]
#[case("https://files.yetracker.org/f/abc123", Provider::Yetracker)]
#[case("https://files.yetracker.org/d/abc123", Provider::Yetracker)]
#[case("https://pixeldrain.com/u/AbC123", Provider::Pixeldrain)]
#[case("https://pixeldrain.com/api/file/AbC123", Provider::Pixeldrain)]
#[case("https://krakenfiles.com/view/Xy9aBc/file.html", Provider::Krakenfiles)]
#[case("https://imgur.gg/f/abc123", Provider::Imgur)]
#[case("https://i.imgur.com/abc123.mp4", Provider::Imgur)]
#[case("https://soundcloud.com/artist/track-name", Provider::Soundcloud)]
#[case("https://on.soundcloud.com/AbCd", Provider::Soundcloud)]
#[case("https://m.soundcloud.com/artist/track", Provider::Soundcloud)]
#[case("https://tidal.com/browse/track/12345678", Provider::Tidal)]
#[case("https://listen.tidal.com/track/12345678", Provider::Tidal)]
#[case("https://open.qobuz.com/track/98765", Provider::Qobuz)]
#[case("https://play.qobuz.com/track/98765", Provider::Qobuz)]
#[case("https://juicewrldapi.com/files/song.mp3", Provider::JuiceWrldApi)]
#[case("https://cdn.juicewrldapi.com/files/song.mp3", Provider::JuiceWrldApi)]
#[case("https://example.com/song.mp3", Provider::Unknown)]
#[case("https://pillows.su/about", Provider::Unknown)]
#[case("https://tidal.com/browse/album/123", Provider::Unknown)]
#[case("not a url", Provider::Unknown)]
#[case("", Provider::Unknown)]
fn classifies(#[case] url: &str, #[case] expected: Provider) {
    assert_eq!(expected, classify(url));
}

#[rstest]
#[case("http://pillows.su/f/abc", "https://pillows.su/f/abc")]
#[case("HTTP://pillows.su/f/abc", "https://pillows.su/f/abc")]
#[case("https://www.krakenfiles.com/view/a", "https://krakenfiles.com/view/a")]
#[case("https://pillowcase.su/f/abc", "https://pillows.su/f/abc")]
#[case("https://api.pillowcase.su/api/download/abc", "https://api.pillows.su/api/download/abc")]
#[case("  https://example.com/a  ", "https://example.com/a")]
fn normalizes(#[case] url: &str, #[case] expected: &str) {
    assert_eq!(expected, normalize_url(url));
}

#[rstest]
#[case("https://pillowcase.su/f/abc")]
#[case("http://www.example.com/a")]
#[case("https://tidal.com/browse/track/1")]
fn normalize_is_idempotent(#[case] url: &str) {
    let once = normalize_url(url);
    assert_eq!(once, normalize_url(&once));
}

#[test]
fn aliases_classify_identically() {
    assert_eq!(
        classify("https://pillowcase.su/f/abc"),
        classify("https://pillows.su/f/abc")
    );
    assert_eq!(
        classify("http://www.pixeldrain.com/u/abc"),
        classify("https://pixeldrain.com/u/abc")
    );
}

#[test]
fn every_provider_but_unknown_is_matchable() {
    for provider in Provider::iter() {
        let spec = provider.spec();
        assert_eq!(provider, spec.provider);
        if provider == Provider::Unknown {
            assert_eq!(Strategy::Unsupported, spec.strategy);
            assert!(!spec.matches("https://example.com"));
        } else {
            assert!(MATCH_ORDER.contains(&provider), "{provider} not in match order");
        }
    }
}

#[rstest]
#[case(Provider::Pillows, "https://pillows.su/f/abc123", Some("abc123"))]
#[case(Provider::Krakenfiles, "https://krakenfiles.com/view/Xy9/file.html", Some("Xy9"))]
#[case(Provider::Tidal, "https://tidal.com/browse/track/42", Some("42"))]
#[case(
    Provider::Soundcloud,
    "https://soundcloud.com/artist/track",
    Some("https://soundcloud.com/artist/")
)]
#[case(Provider::Unknown, "https://example.com/a", None)]
fn extracts_identifier(#[case] provider: Provider, #[case] url: &str, #[case] expected: Option<&str>) {
    assert_eq!(expected, provider.spec().identifier(url));
}

#[test]
fn display_names() {
    assert_eq!("SoundCloud", Provider::Soundcloud.display_name());
    assert_eq!("Juice WRLD API", Provider::JuiceWrldApi.display_name());
    assert_eq!("pillows", Provider::Pillows.to_string());
}
