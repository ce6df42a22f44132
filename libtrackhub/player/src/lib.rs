mod controller;
mod dto;
mod preload;
pub mod settings;

pub use controller::{PlaybackController, PlayerError};
pub use dto::audio_status::AudioStatus;
pub use dto::playback_state::PlaybackState;
pub use dto::playback_track::{PlaybackTrack, queue_from_era, queue_from_tracker};
pub use dto::player_event::PlayerEvent;
pub use preload::{HttpPreloader, MediaPreloader, NoPreload, PreloadHandle, PreloadWindow};

#[cfg(test)]
#[path = "./controller_test.rs"]
mod controller_test;
