pub mod audio_status;
pub mod playback_state;
pub mod playback_track;
pub mod player_event;
