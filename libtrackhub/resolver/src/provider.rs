use lazy_regex::{Lazy, regex};
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// The host a raw track URL belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Pillows,
    Froste,
    Krakenfiles,
    Imgur,
    Pixeldrain,
    Soundcloud,
    Tidal,
    Qobuz,
    Yetracker,
    JuiceWrldApi,
    Unknown,
}

/// Providers whose playable URL comes from a resolver endpoint keyed by an id taken from the
/// raw URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Krakenfiles,
    Imgur,
    Soundcloud,
    Tidal,
    Qobuz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Substitute the extracted id into a download endpoint. `{id}` is the placeholder.
    Rewrite(&'static str),
    Lookup(Lookup),
    /// The raw URL is already playable.
    Passthrough,
    Unsupported,
}

#[derive(Debug)]
pub struct ProviderSpec {
    pub provider: Provider,
    pub display_name: &'static str,
    pub strategy: Strategy,
    pattern: Option<fn() -> &'static Regex>,
}

impl ProviderSpec {
    pub fn matches(&self, normalized_url: &str) -> bool {
        self.pattern.is_some_and(|p| p().is_match(normalized_url))
    }

    /// The first capture group of the provider pattern, or the whole URL when the pattern has
    /// no groups.
    pub fn identifier<'a>(&self, normalized_url: &'a str) -> Option<&'a str> {
        let captures = self.pattern?().captures(normalized_url)?;
        captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str())
    }
}

macro_rules! url_regex {
    ($s:literal) => {
        Lazy::force(regex!($s))
    };
}

fn pillows() -> &'static Regex {
    url_regex!(r"^https://(?:api\.)?pillows\.su/(?:f|api/download)/([0-9A-Za-z]+)")
}

fn froste() -> &'static Regex {
    url_regex!(r"^https://music\.froste\.lol/song/([0-9A-Za-z]+)")
}

fn yetracker() -> &'static Regex {
    url_regex!(r"^https://files\.yetracker\.org/[fd]/([0-9A-Za-z]+)")
}

fn pixeldrain() -> &'static Regex {
    url_regex!(r"^https://pixeldrain\.com/(?:u|api/file)/([0-9A-Za-z]+)")
}

fn krakenfiles() -> &'static Regex {
    url_regex!(r"^https://krakenfiles\.com/view/([0-9A-Za-z]+)")
}

fn imgur() -> &'static Regex {
    url_regex!(r"^https://(?:i\.)?imgur\.(?:gg|com)/(?:f/)?([0-9A-Za-z]+)")
}

fn soundcloud() -> &'static Regex {
    url_regex!(r"^https://(?:m\.|on\.)?soundcloud\.com/[^/?#]+/?")
}

fn tidal() -> &'static Regex {
    url_regex!(r"^https://(?:listen\.)?tidal\.com/(?:browse/)?track/(\d+)")
}

fn qobuz() -> &'static Regex {
    url_regex!(r"^https://(?:open|play)\.qobuz\.com/track/(\d+)")
}

fn juicewrldapi() -> &'static Regex {
    url_regex!(r"^https://(?:[0-9a-z-]+\.)*juicewrldapi\.com/")
}

static PILLOWS: ProviderSpec = ProviderSpec {
    provider: Provider::Pillows,
    display_name: "Pillows",
    strategy: Strategy::Rewrite("https://api.pillows.su/api/download/{id}"),
    pattern: Some(pillows),
};

static FROSTE: ProviderSpec = ProviderSpec {
    provider: Provider::Froste,
    display_name: "Froste",
    strategy: Strategy::Rewrite("https://music.froste.lol/song/{id}/download"),
    pattern: Some(froste),
};

static YETRACKER: ProviderSpec = ProviderSpec {
    provider: Provider::Yetracker,
    display_name: "Yetracker",
    strategy: Strategy::Rewrite("https://files.yetracker.org/d/{id}"),
    pattern: Some(yetracker),
};

static PIXELDRAIN: ProviderSpec = ProviderSpec {
    provider: Provider::Pixeldrain,
    display_name: "Pixeldrain",
    strategy: Strategy::Rewrite("https://pixeldrain.com/api/file/{id}?download"),
    pattern: Some(pixeldrain),
};

static KRAKENFILES: ProviderSpec = ProviderSpec {
    provider: Provider::Krakenfiles,
    display_name: "Krakenfiles",
    strategy: Strategy::Lookup(Lookup::Krakenfiles),
    pattern: Some(krakenfiles),
};

static IMGUR: ProviderSpec = ProviderSpec {
    provider: Provider::Imgur,
    display_name: "Imgur",
    strategy: Strategy::Lookup(Lookup::Imgur),
    pattern: Some(imgur),
};

static SOUNDCLOUD: ProviderSpec = ProviderSpec {
    provider: Provider::Soundcloud,
    display_name: "SoundCloud",
    strategy: Strategy::Lookup(Lookup::Soundcloud),
    pattern: Some(soundcloud),
};

static TIDAL: ProviderSpec = ProviderSpec {
    provider: Provider::Tidal,
    display_name: "Tidal",
    strategy: Strategy::Lookup(Lookup::Tidal),
    pattern: Some(tidal),
};

static QOBUZ: ProviderSpec = ProviderSpec {
    provider: Provider::Qobuz,
    display_name: "Qobuz",
    strategy: Strategy::Lookup(Lookup::Qobuz),
    pattern: Some(qobuz),
};

static JUICEWRLDAPI: ProviderSpec = ProviderSpec {
    provider: Provider::JuiceWrldApi,
    display_name: "Juice WRLD API",
    strategy: Strategy::Passthrough,
    pattern: Some(juicewrldapi),
};

static UNKNOWN: ProviderSpec = ProviderSpec {
    provider: Provider::Unknown,
    display_name: "Unknown",
    strategy: Strategy::Unsupported,
    pattern: None,
};

// First match wins. Host-specific paths go before anything that matches a whole domain.
const MATCH_ORDER: [Provider; 10] = [
    Provider::Pillows,
    Provider::Froste,
    Provider::Yetracker,
    Provider::Pixeldrain,
    Provider::Krakenfiles,
    Provider::Imgur,
    Provider::Tidal,
    Provider::Qobuz,
    Provider::Soundcloud,
    Provider::JuiceWrldApi,
];

impl Provider {
    pub fn spec(self) -> &'static ProviderSpec {
        match self {
            Provider::Pillows => &PILLOWS,
            Provider::Froste => &FROSTE,
            Provider::Krakenfiles => &KRAKENFILES,
            Provider::Imgur => &IMGUR,
            Provider::Pixeldrain => &PIXELDRAIN,
            Provider::Soundcloud => &SOUNDCLOUD,
            Provider::Tidal => &TIDAL,
            Provider::Qobuz => &QOBUZ,
            Provider::Yetracker => &YETRACKER,
            Provider::JuiceWrldApi => &JUICEWRLDAPI,
            Provider::Unknown => &UNKNOWN,
        }
    }

    pub fn display_name(self) -> &'static str {
        self.spec().display_name
    }

    pub fn strategy(self) -> Strategy {
        self.spec().strategy
    }
}

/// Rewrites known spelling variants to the canonical form every provider pattern expects.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let url = regex!(r"^(?i)http://").replace(url, "https://");
    let url = regex!(r"^https://www\.").replace(&url, "https://");
    let url = regex!(r"^https://((?:[0-9a-z-]+\.)*)pillowcase\.su/").replace(&url, "https://${1}pillows.su/");
    url.into_owned()
}

pub fn classify(url: &str) -> Provider {
    classify_normalized(&normalize_url(url))
}

/// Classifies a URL that has already gone through [`normalize_url`].
pub fn classify_normalized(normalized_url: &str) -> Provider {
    MATCH_ORDER
        .into_iter()
        .find(|p| p.spec().matches(normalized_url))
        .unwrap_or(Provider::Unknown)
}

#[cfg(test)]
#[path = "./provider_test.rs"]
mod provider_test;
