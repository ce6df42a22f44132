use std::time::Duration;

use strum::Display;

use super::playback_state::PlaybackState;

#[derive(Clone, Debug, Display)]
pub enum PlayerEvent {
    TrackStarted(PlaybackState),
    QueueUpdated(PlaybackState),
    Stop(PlaybackState),
    Pause(PlaybackState),
    Resume(PlaybackState),
    Ended(PlaybackState),
    Next(PlaybackState),
    Previous(PlaybackState),
    SetVolume(PlaybackState),
    Seek(PlaybackState, Duration),
    QueueEnded(PlaybackState),
}

impl PlayerEvent {
    pub fn state(&self) -> &PlaybackState {
        match self {
            PlayerEvent::TrackStarted(state)
            | PlayerEvent::QueueUpdated(state)
            | PlayerEvent::Stop(state)
            | PlayerEvent::Pause(state)
            | PlayerEvent::Resume(state)
            | PlayerEvent::Ended(state)
            | PlayerEvent::Next(state)
            | PlayerEvent::Previous(state)
            | PlayerEvent::SetVolume(state)
            | PlayerEvent::Seek(state, _)
            | PlayerEvent::QueueEnded(state) => state,
        }
    }
}
