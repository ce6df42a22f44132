use std::collections::VecDeque;
use std::time::Duration;

use super::audio_status::AudioStatus;
use super::playback_track::PlaybackTrack;

#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackState {
    pub current_track: Option<PlaybackTrack>,
    pub status: AudioStatus,
    pub current_time: Duration,
    pub duration: Option<Duration>,
    /// 0.0..=1.0
    pub volume: f32,
    /// Front plays next.
    pub queue: VecDeque<PlaybackTrack>,
}

impl PlaybackState {
    pub(crate) fn new(volume: f32) -> Self {
        Self {
            current_track: None,
            status: AudioStatus::Stopped,
            current_time: Duration::ZERO,
            duration: None,
            volume,
            queue: VecDeque::new(),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.status == AudioStatus::Playing
    }

    pub fn is_idle(&self) -> bool {
        self.current_track.is_none()
    }
}
