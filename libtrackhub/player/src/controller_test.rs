use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use libtrackhub_resolver::provider::Provider;
use pretty_assertions::assert_eq;
use rstest::rstest;
use tokio_util::sync::CancellationToken;

use crate::settings::PlayerSettings;
use crate::{
    AudioStatus, MediaPreloader, NoPreload, PlaybackController, PlaybackTrack, PlayerError,
    PlayerEvent, PreloadHandle,
};

#[ctor::ctor]
fn init() {
    tracing_subscriber::fmt()
        .pretty()
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_test_writer()
        .init();
}

fn track(name: &str) -> PlaybackTrack {
    PlaybackTrack {
        id: format!("id-{name}"),
        name: name.to_owned(),
        extra: String::new(),
        raw_url: format!("https://pillows.su/f/{name}"),
        playable_url: Some(format!("https://api.pillows.su/api/download/{name}")),
        source: Provider::Pillows,
        era_name: "Era".to_owned(),
        era_image: None,
        artist_name: "Artist".to_owned(),
        quality: None,
        track_length: None,
        description: None,
    }
}

fn unplayable(name: &str) -> PlaybackTrack {
    PlaybackTrack {
        playable_url: None,
        ..track(name)
    }
}

#[derive(Default)]
struct RecordingPreloader {
    started: Mutex<Vec<(String, CancellationToken)>>,
}

impl RecordingPreloader {
    fn started(&self) -> Vec<String> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn released(&self) -> Vec<String> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, token)| token.is_cancelled())
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl MediaPreloader for RecordingPreloader {
    fn preload(&self, track: &PlaybackTrack) -> Option<PreloadHandle> {
        let handle = PreloadHandle::new(&track.id);
        self.started
            .lock()
            .unwrap()
            .push((track.id.clone(), handle.token().clone()));
        Some(handle)
    }
}

fn controller() -> PlaybackController {
    PlaybackController::new(PlayerSettings::default(), Arc::new(NoPreload))
}

fn with_preloader() -> (PlaybackController, Arc<RecordingPreloader>) {
    let preloader = Arc::new(RecordingPreloader::default());
    let controller = PlaybackController::new(PlayerSettings::default(), preloader.clone());
    (controller, preloader)
}

fn current(controller: &PlaybackController) -> Option<&str> {
    controller
        .state()
        .current_track
        .as_ref()
        .map(|t| t.name.as_str())
}

fn upcoming(controller: &PlaybackController) -> Vec<&str> {
    controller.upcoming().map(|t| t.name.as_str()).collect()
}

#[test]
fn starts_idle() {
    let controller = controller();
    let state = controller.state();

    assert!(state.is_idle());
    assert_eq!(AudioStatus::Stopped, state.status);
    assert_eq!(1.0, state.volume);
    assert!(!controller.can_play_previous());
}

#[test]
fn play_track_replaces_current() {
    let mut controller = controller();
    controller.play_track(track("a")).unwrap();
    controller.play_track(track("b")).unwrap();

    assert_eq!(Some("b"), current(&controller));
    assert!(controller.state().is_playing());
    assert_eq!(2, controller.history().len());
}

#[test]
fn unplayable_track_is_rejected() {
    let mut controller = controller();
    controller.play_track(track("a")).unwrap();

    assert_matches!(
        controller.play_track(unplayable("b")),
        Err(PlayerError::Unplayable(name)) if name == "b"
    );
    assert_matches!(
        controller.add_to_queue(unplayable("c"), false),
        Err(PlayerError::Unplayable(_))
    );
    assert_eq!(Some("a"), current(&controller));
    assert!(controller.state().queue.is_empty());
}

#[test]
fn play_next_inserts_at_head() {
    let mut controller = controller();
    controller.add_to_queue(track("a"), false).unwrap();
    controller.add_to_queue(track("b"), false).unwrap();
    controller.add_to_queue(track("c"), true).unwrap();

    assert_eq!(vec!["c", "a", "b"], upcoming(&controller));
}

#[test]
fn queue_drains_then_goes_idle() {
    let mut controller = controller();
    let mut events = controller.subscribe();
    controller.add_to_queue(track("a"), false).unwrap();
    controller.add_to_queue(track("b"), false).unwrap();

    assert_eq!(Some("a"), controller.play_next().map(|t| t.name.as_str()));
    assert_eq!(Some("b"), controller.on_ended().map(|t| t.name.as_str()));
    assert_eq!(None, controller.on_ended());

    let state = controller.state();
    assert!(state.is_idle());
    assert_eq!(AudioStatus::Stopped, state.status);

    let mut names = vec![];
    while let Ok(event) = events.try_recv() {
        names.push(event.to_string());
    }
    assert_eq!(
        vec![
            "QueueUpdated",
            "QueueUpdated",
            "Next",
            "Ended",
            "Next",
            "Ended",
            "QueueEnded"
        ],
        names
    );
}

#[test]
fn previous_needs_two_history_entries() {
    let mut controller = controller();
    controller.play_track(track("a")).unwrap();
    assert!(!controller.can_play_previous());
    assert_eq!(None, controller.play_previous());
    assert_eq!(Some("a"), current(&controller));

    controller.play_track(track("b")).unwrap();
    assert!(controller.can_play_previous());
}

#[test]
fn previous_then_next_walks_history() {
    let mut controller = controller();
    controller.add_to_queue(track("d"), false).unwrap();
    controller.play_track(track("a")).unwrap();
    controller.play_track(track("b")).unwrap();
    controller.play_track(track("c")).unwrap();

    assert_eq!(Some("b"), controller.play_previous().map(|t| t.name.as_str()));
    assert_eq!(Some("a"), controller.play_previous().map(|t| t.name.as_str()));
    assert!(!controller.can_play_previous());
    assert_eq!(vec!["b", "c", "d"], upcoming(&controller));

    assert_eq!(Some("b"), controller.play_next().map(|t| t.name.as_str()));
    assert_eq!(Some("c"), controller.play_next().map(|t| t.name.as_str()));
    assert_eq!(Some("d"), controller.play_next().map(|t| t.name.as_str()));
}

#[test]
fn play_track_forgets_forward_history() {
    let mut controller = controller();
    controller.play_track(track("a")).unwrap();
    controller.play_track(track("b")).unwrap();
    controller.play_previous();
    assert_eq!(vec!["b"], upcoming(&controller));

    controller.play_track(track("c")).unwrap();

    assert!(upcoming(&controller).is_empty());
    assert_eq!(Some("a"), controller.play_previous().map(|t| t.name.as_str()));
}

#[test]
fn pause_resume_toggle() {
    let mut controller = controller();
    controller.toggle_play();
    assert_eq!(AudioStatus::Stopped, controller.state().status);

    controller.play_track(track("a")).unwrap();
    controller.pause();
    assert_eq!(AudioStatus::Paused, controller.state().status);
    controller.toggle_play();
    assert_eq!(AudioStatus::Playing, controller.state().status);
    controller.toggle_play();
    assert_eq!(AudioStatus::Paused, controller.state().status);
    controller.resume();
    assert!(controller.state().is_playing());
}

#[test]
fn stop_keeps_queue() {
    let mut controller = controller();
    controller.play_track(track("a")).unwrap();
    controller.add_to_queue(track("b"), false).unwrap();
    controller.stop();

    assert!(controller.state().is_idle());
    assert_eq!(vec!["b"], upcoming(&controller));
    assert!(!controller.can_play_previous());
}

#[test]
fn clear_forgets_everything() {
    let (mut controller, preloader) = with_preloader();
    controller.play_track(track("a")).unwrap();
    controller.add_to_queue(track("b"), false).unwrap();
    controller.clear();

    assert!(controller.state().is_idle());
    assert!(upcoming(&controller).is_empty());
    assert!(controller.history().is_empty());
    assert!(controller.preload_window().is_empty());
    assert_eq!(vec!["id-b"], preloader.released());
}

#[test]
fn clear_queue_and_remove() {
    let mut controller = controller();
    for name in ["a", "b", "c"] {
        controller.add_to_queue(track(name), false).unwrap();
    }

    assert_eq!(Some("b".to_owned()), controller.remove_from_queue(1).map(|t| t.name));
    assert_eq!(None, controller.remove_from_queue(5));
    assert_eq!(vec!["a", "c"], upcoming(&controller));

    controller.clear_queue();
    assert!(upcoming(&controller).is_empty());
}

#[rstest]
#[case(Duration::from_secs(30), Duration::from_secs(30))]
#[case(Duration::from_secs(500), Duration::from_secs(180))]
#[case(Duration::ZERO, Duration::ZERO)]
fn seek_clamps_to_duration(#[case] requested: Duration, #[case] expected: Duration) {
    let mut controller = controller();
    controller.play_track(track("a")).unwrap();
    controller.on_time_update(Duration::from_secs(10), Some(Duration::from_secs(180)));

    assert_eq!(Ok(expected), controller.seek_to(requested));
    assert_eq!(expected, controller.state().current_time);
    assert_eq!(Some("a"), current(&controller));
}

#[test]
fn seek_without_track_fails() {
    let mut controller = controller();
    assert_eq!(
        Err(PlayerError::NothingPlaying),
        controller.seek_to(Duration::from_secs(1))
    );
}

#[test]
fn seek_emits_position() {
    let mut controller = controller();
    controller.play_track(track("a")).unwrap();
    let mut events = controller.subscribe();
    controller.seek_to(Duration::from_secs(42)).unwrap();

    assert_matches!(
        events.try_recv(),
        Ok(PlayerEvent::Seek(state, time)) if time == Duration::from_secs(42)
            && state.current_time == time
    );
}

#[rstest]
#[case(0.5, 0.5)]
#[case(1.5, 1.0)]
#[case(-0.2, 0.0)]
fn volume_is_clamped(#[case] requested: f32, #[case] expected: f32) {
    let mut controller = controller();
    controller.set_volume(requested);
    assert_eq!(expected, controller.state().volume);
}

#[test]
fn nan_volume_is_ignored() {
    let mut controller = controller();
    controller.set_volume(0.3);
    controller.set_volume(f32::NAN);
    assert_eq!(0.3, controller.state().volume);
}

#[test]
fn time_updates_ignored_when_idle() {
    let mut controller = controller();
    controller.on_time_update(Duration::from_secs(5), Some(Duration::from_secs(10)));
    assert_eq!(Duration::ZERO, controller.state().current_time);
    assert_eq!(None, controller.state().duration);
}

#[test]
fn new_track_resets_position() {
    let mut controller = controller();
    controller.play_track(track("a")).unwrap();
    controller.on_time_update(Duration::from_secs(5), Some(Duration::from_secs(10)));
    controller.play_track(track("b")).unwrap();

    assert_eq!(Duration::ZERO, controller.state().current_time);
    assert_eq!(None, controller.state().duration);
}

#[test]
fn preload_window_covers_next_three() {
    let (mut controller, preloader) = with_preloader();
    for name in ["a", "b", "c", "d", "e"] {
        controller.add_to_queue(track(name), false).unwrap();
    }

    assert_eq!(
        vec!["id-a", "id-b", "id-c"],
        controller.preload_window().track_ids()
    );
    assert_eq!(vec!["id-a", "id-b", "id-c"], preloader.started());
}

#[test]
fn preload_window_slides_as_queue_advances() {
    let (mut controller, preloader) = with_preloader();
    for name in ["a", "b", "c", "d", "e"] {
        controller.add_to_queue(track(name), false).unwrap();
    }
    controller.play_next();
    controller.play_next();

    assert_eq!(
        vec!["id-c", "id-d", "id-e"],
        controller.preload_window().track_ids()
    );
    // handles are reused, not recreated
    assert_eq!(
        vec!["id-a", "id-b", "id-c", "id-d", "id-e"],
        preloader.started()
    );
    // "a" was handed to the slot and released when "b" started
    assert_eq!(vec!["id-a"], preloader.released());
    assert_eq!(
        Some("id-b"),
        controller.current_preload().map(|h| h.track_id())
    );
}

#[test]
fn track_queued_twice_is_preloaded_once() {
    let (mut controller, preloader) = with_preloader();
    for name in ["a", "a", "b", "c"] {
        controller.add_to_queue(track(name), false).unwrap();
    }

    assert_eq!(
        vec!["id-a", "id-b", "id-c"],
        controller.preload_window().track_ids()
    );
    assert_eq!(vec!["id-a", "id-b", "id-c"], preloader.started());
    assert!(preloader.released().is_empty());
}

#[test]
fn inserted_track_pushes_last_out_of_window() {
    let (mut controller, preloader) = with_preloader();
    for name in ["a", "b", "c"] {
        controller.add_to_queue(track(name), false).unwrap();
    }
    controller.add_to_queue(track("x"), true).unwrap();

    assert_eq!(
        vec!["id-x", "id-a", "id-b"],
        controller.preload_window().track_ids()
    );
    assert_eq!(vec!["id-c"], preloader.released());
}

#[test]
fn window_size_is_configurable() {
    let preloader = Arc::new(RecordingPreloader::default());
    let settings = PlayerSettings {
        preload_window: 1,
        ..Default::default()
    };
    let mut controller = PlaybackController::new(settings, preloader.clone());
    controller.add_to_queue(track("a"), false).unwrap();
    controller.add_to_queue(track("b"), false).unwrap();

    assert_eq!(vec!["id-a"], controller.preload_window().track_ids());
}

#[test]
fn history_is_bounded() {
    let settings = PlayerSettings {
        history_limit: 3,
        ..Default::default()
    };
    let mut controller = PlaybackController::new(settings, Arc::new(NoPreload));
    for name in ["a", "b", "c", "d", "e"] {
        controller.play_track(track(name)).unwrap();
    }

    let history: Vec<_> = controller.history().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(vec!["c", "d", "e"], history);
}
