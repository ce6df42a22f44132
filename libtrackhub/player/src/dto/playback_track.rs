use libtrackhub_resolver::ResolvedUrls;
use libtrackhub_resolver::identity::track_id;
use libtrackhub_resolver::provider::{Provider, classify, normalize_url};
use libtrackhub_resolver::tracker::{TrackEntry, TrackerData};
use serde::{Deserialize, Serialize};

/// A tracker track enriched with everything the player needs to show and play it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackTrack {
    /// Stable hash of the raw URL.
    pub id: String,
    pub name: String,
    pub extra: String,
    pub raw_url: String,
    pub playable_url: Option<String>,
    pub source: Provider,
    pub era_name: String,
    pub era_image: Option<String>,
    pub artist_name: String,
    pub quality: Option<String>,
    pub track_length: Option<String>,
    pub description: Option<String>,
}

impl PlaybackTrack {
    pub fn from_track(entry: &TrackEntry<'_>, artist_name: &str, playable_url: Option<String>) -> Self {
        let track = entry.track;
        let raw_url = track.url.trim().to_owned();
        Self {
            id: track_id(&raw_url),
            name: track.name.clone(),
            extra: track.extra.clone(),
            source: classify(&raw_url),
            raw_url,
            playable_url,
            era_name: entry.era.display_name(entry.era_key).to_owned(),
            era_image: entry.era.image.clone(),
            artist_name: artist_name.to_owned(),
            quality: track.quality.clone(),
            track_length: track.track_length.clone(),
            description: track.description.clone(),
        }
    }

    pub fn is_playable(&self) -> bool {
        self.playable_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

fn playable(entry: &TrackEntry<'_>, artist_name: &str, resolved: &ResolvedUrls) -> Option<PlaybackTrack> {
    let playable_url = resolved.get(&normalize_url(&entry.track.url)).cloned().flatten()?;
    Some(PlaybackTrack::from_track(entry, artist_name, Some(playable_url)))
}

/// Every playable track of one era, in sheet order. Unresolved tracks are skipped.
pub fn queue_from_era(data: &TrackerData, era_key: &str, resolved: &ResolvedUrls) -> Vec<PlaybackTrack> {
    data.tracks()
        .filter(|entry| entry.era_key == era_key)
        .filter_map(|entry| playable(&entry, &data.name, resolved))
        .collect()
}

/// Every playable track of the tracker, in sheet order. Unresolved tracks are skipped.
pub fn queue_from_tracker(data: &TrackerData, resolved: &ResolvedUrls) -> Vec<PlaybackTrack> {
    data.tracks()
        .filter_map(|entry| playable(&entry, &data.name, resolved))
        .collect()
}
