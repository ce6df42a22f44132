mod client;
mod loader;
mod ordered_map;

use std::fmt;
use std::str::FromStr;

pub use client::*;
use itertools::Itertools;
use lazy_regex::{regex_captures, regex_is_match};
pub use loader::*;
pub use ordered_map::OrderedMap;
use serde::{Deserialize, Serialize};

/// The payload returned by the tracker service for one tab of an artist's sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerData {
    pub name: String,
    #[serde(default)]
    pub tabs: Vec<String>,
    #[serde(default)]
    pub current_tab: String,
    #[serde(default)]
    pub eras: OrderedMap<Era>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Era {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub extra: Option<String>,
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default, rename = "fileInfo")]
    pub file_info: Vec<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "textColor")]
    pub text_color: Option<String>,
    #[serde(default, rename = "backgroundColor")]
    pub background_color: Option<String>,
    /// Category name -> tracks, in sheet order.
    #[serde(default)]
    pub data: OrderedMap<Vec<Track>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    #[serde(default)]
    pub extra: String,
    pub url: String,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub track_length: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// One track together with the era and category it was listed under.
#[derive(Debug, Clone, Copy)]
pub struct TrackEntry<'a> {
    pub era_key: &'a str,
    pub era: &'a Era,
    pub category: &'a str,
    pub track: &'a Track,
}

impl Era {
    pub fn display_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or(key)
    }

    pub fn tracks(&self) -> impl Iterator<Item = (&str, &Track)> {
        self.data
            .iter()
            .flat_map(|(category, tracks)| tracks.iter().map(move |t| (category, t)))
    }
}

impl TrackerData {
    pub fn tracks(&self) -> impl Iterator<Item = TrackEntry<'_>> {
        self.eras.iter().flat_map(|(era_key, era)| {
            era.tracks().map(move |(category, track)| TrackEntry {
                era_key,
                era,
                category,
                track,
            })
        })
    }

    /// Every distinct, non-empty track URL in first-seen order.
    pub fn raw_urls(&self) -> Vec<String> {
        self.tracks()
            .map(|entry| entry.track.url.trim())
            .filter(|url| !url.is_empty())
            .unique()
            .map(str::to_owned)
            .collect()
    }

    pub fn has_eras(&self) -> bool {
        !self.eras.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackerId(String);

impl TrackerId {
    pub const LEN: usize = 44;

    /// Accepts either a bare sheet id or a Google Sheets URL containing one.
    pub fn parse(input: &str) -> Result<Self, TrackerError> {
        let input = input.trim();
        if let Some((_, id)) = regex_captures!(r"/spreadsheets/d/([A-Za-z0-9_-]{44})", input) {
            return Ok(Self(id.to_owned()));
        }
        if regex_is_match!(r"^[A-Za-z0-9_-]{44}$", input) {
            return Ok(Self(input.to_owned()));
        }
        Err(TrackerError::InvalidId(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TrackerId {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TrackerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
