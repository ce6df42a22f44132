use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::dto::audio_status::AudioStatus;
use crate::dto::playback_state::PlaybackState;
use crate::dto::playback_track::PlaybackTrack;
use crate::dto::player_event::PlayerEvent;
use crate::preload::{MediaPreloader, PreloadHandle, PreloadWindow};
use crate::settings::PlayerSettings;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    #[error("{0} has no playable url")]
    Unplayable(String),
    #[error("nothing is playing")]
    NothingPlaying,
}

/// Owns the single playback slot, the upcoming queue and the play history.
pub struct PlaybackController {
    state: PlaybackState,
    // the last entry is the current track while one is loaded
    history: Vec<PlaybackTrack>,
    // tracks stepped back over with play_previous, last entry replays first
    forward: Vec<PlaybackTrack>,
    preload: PreloadWindow,
    current_preload: Option<PreloadHandle>,
    event_tx: broadcast::Sender<PlayerEvent>,
    settings: PlayerSettings,
}

impl PlaybackController {
    pub fn new(settings: PlayerSettings, preloader: Arc<dyn MediaPreloader>) -> Self {
        let (event_tx, _) = broadcast::channel(32);
        Self {
            state: PlaybackState::new(settings.initial_volume.clamp(0.0, 1.0)),
            history: vec![],
            forward: vec![],
            preload: PreloadWindow::new(settings.preload_window, preloader),
            current_preload: None,
            event_tx,
            settings,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.event_tx.subscribe()
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.settings
    }

    pub fn history(&self) -> &[PlaybackTrack] {
        &self.history
    }

    /// Everything that plays after the current track, in order.
    pub fn upcoming(&self) -> impl Iterator<Item = &PlaybackTrack> {
        self.forward.iter().rev().chain(self.state.queue.iter())
    }

    pub fn preload_window(&self) -> &PreloadWindow {
        &self.preload
    }

    /// The preload handle carried over from the window when the current track started.
    pub fn current_preload(&self) -> Option<&PreloadHandle> {
        self.current_preload.as_ref()
    }

    /// Replaces the current track immediately. Tracks stepped back over are forgotten.
    pub fn play_track(&mut self, track: PlaybackTrack) -> Result<(), PlayerError> {
        ensure_playable(&track)?;
        self.forward.clear();
        self.push_history(track.clone());
        self.start(track);
        self.emit(PlayerEvent::TrackStarted);
        self.sync_preload();
        Ok(())
    }

    /// Appends to the tail, or inserts at the head when `play_next` is set.
    pub fn add_to_queue(&mut self, track: PlaybackTrack, play_next: bool) -> Result<(), PlayerError> {
        ensure_playable(&track)?;
        if play_next {
            self.state.queue.push_front(track);
        } else {
            self.state.queue.push_back(track);
        }
        self.emit(PlayerEvent::QueueUpdated);
        self.sync_preload();
        Ok(())
    }

    /// Advances to the next track. Goes idle and returns `None` when nothing is left.
    pub fn play_next(&mut self) -> Option<&PlaybackTrack> {
        let next = self.forward.pop().or_else(|| self.state.queue.pop_front());
        match next {
            Some(track) => {
                self.push_history(track.clone());
                self.start(track);
                self.emit(PlayerEvent::Next);
            }
            None => {
                info!("Queue ended");
                self.go_idle();
                self.emit(PlayerEvent::QueueEnded);
            }
        }
        self.sync_preload();
        self.state.current_track.as_ref()
    }

    pub fn can_play_previous(&self) -> bool {
        self.state.current_track.is_some() && self.history.len() >= 2
    }

    /// Steps back through the play history. The current track is replayed by the next `play_next`.
    pub fn play_previous(&mut self) -> Option<&PlaybackTrack> {
        if !self.can_play_previous() {
            return None;
        }
        if let Some(current) = self.history.pop() {
            self.forward.push(current);
        }
        let previous = self.history.last().cloned()?;
        self.start(previous);
        self.emit(PlayerEvent::Previous);
        self.sync_preload();
        self.state.current_track.as_ref()
    }

    pub fn pause(&mut self) {
        if self.state.status == AudioStatus::Playing {
            self.state.status = AudioStatus::Paused;
            self.emit(PlayerEvent::Pause);
        }
    }

    pub fn resume(&mut self) {
        if self.state.status == AudioStatus::Paused {
            self.state.status = AudioStatus::Playing;
            self.emit(PlayerEvent::Resume);
        }
    }

    pub fn toggle_play(&mut self) {
        match self.state.status {
            AudioStatus::Playing => self.pause(),
            AudioStatus::Paused => self.resume(),
            AudioStatus::Stopped => {}
        }
    }

    /// Unloads the current track but keeps the queue.
    pub fn stop(&mut self) {
        self.go_idle();
        self.emit(PlayerEvent::Stop);
        self.sync_preload();
    }

    pub fn clear_queue(&mut self) {
        self.state.queue.clear();
        self.forward.clear();
        self.emit(PlayerEvent::QueueUpdated);
        self.sync_preload();
    }

    /// Stops playback and forgets the queue and the history.
    pub fn clear(&mut self) {
        self.go_idle();
        self.state.queue.clear();
        self.forward.clear();
        self.history.clear();
        self.preload.clear();
        self.emit(PlayerEvent::Stop);
    }

    pub fn remove_from_queue(&mut self, index: usize) -> Option<PlaybackTrack> {
        let removed = self.state.queue.remove(index)?;
        self.emit(PlayerEvent::QueueUpdated);
        self.sync_preload();
        Some(removed)
    }

    /// Moves the play head, clamped to the track duration when it is known.
    pub fn seek_to(&mut self, time: Duration) -> Result<Duration, PlayerError> {
        if self.state.current_track.is_none() {
            return Err(PlayerError::NothingPlaying);
        }
        let time = match self.state.duration {
            Some(duration) => time.min(duration),
            None => time,
        };
        self.state.current_time = time;
        self.event_tx
            .send(PlayerEvent::Seek(self.state.clone(), time))
            .unwrap_or_default();
        Ok(time)
    }

    /// Sets the volume, clamped to `0.0..=1.0`.
    pub fn set_volume(&mut self, volume: f32) {
        if volume.is_nan() {
            warn!("Ignoring NaN volume");
            return;
        }
        self.state.volume = volume.clamp(0.0, 1.0);
        self.emit(PlayerEvent::SetVolume);
    }

    /// Position reports from the audio element.
    pub fn on_time_update(&mut self, time: Duration, duration: Option<Duration>) {
        if self.state.current_track.is_none() {
            return;
        }
        self.state.current_time = time;
        if duration.is_some() {
            self.state.duration = duration;
        }
    }

    /// The current track played to the end.
    pub fn on_ended(&mut self) -> Option<&PlaybackTrack> {
        info!("Received ended event");
        self.emit(PlayerEvent::Ended);
        self.play_next()
    }

    fn start(&mut self, track: PlaybackTrack) {
        info!("Starting {}", track.name);
        self.current_preload = self.preload.take(&track.id);
        self.state.current_track = Some(track);
        self.state.status = AudioStatus::Playing;
        self.state.current_time = Duration::ZERO;
        self.state.duration = None;
    }

    fn go_idle(&mut self) {
        self.current_preload = None;
        self.state.current_track = None;
        self.state.status = AudioStatus::Stopped;
        self.state.current_time = Duration::ZERO;
        self.state.duration = None;
    }

    fn push_history(&mut self, track: PlaybackTrack) {
        self.history.push(track);
        if self.history.len() > self.settings.history_limit.max(2) {
            self.history.remove(0);
        }
    }

    fn sync_preload(&mut self) {
        let upcoming = self.forward.iter().rev().chain(self.state.queue.iter());
        self.preload.sync(upcoming);
    }

    fn emit(&self, event: fn(PlaybackState) -> PlayerEvent) {
        self.event_tx
            .send(event(self.state.clone()))
            .unwrap_or_default();
    }
}

fn ensure_playable(track: &PlaybackTrack) -> Result<(), PlayerError> {
    if track.is_playable() {
        Ok(())
    } else {
        warn!("{} has no playable url", track.name);
        Err(PlayerError::Unplayable(track.name.clone()))
    }
}
