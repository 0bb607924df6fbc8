//! Playback controller tests
//!
//! Drives the state machine with a recording fake backend, no real player.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clipreel::api::board::ClipMatcher;
use clipreel::models::{ClipOrigin, GraphState, PlayerState, Track, TrackKind, VideoReference};
use clipreel::playback::{
    BackendEvent, BackendSignal, Controller, ControllerOptions, GraphHandle, LocalCache,
    MediaBackend, PlaybackError, RetentionPolicy, Step,
};
use tempfile::TempDir;

// =============================================================================
// Fake Backend
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Prepare(String, Option<PathBuf>),
    SetState(GraphHandle, GraphState),
    Link(GraphHandle, Track),
    Release(GraphHandle),
    Fullscreen(bool),
}

/// Records every call; URIs containing "broken" fail to prepare. Save sinks
/// get a file written as if the stream had been recorded.
#[derive(Default)]
struct FakeBackend {
    calls: Arc<Mutex<Vec<Call>>>,
    next_id: u64,
}

impl FakeBackend {
    fn new() -> (Self, Arc<Mutex<Vec<Call>>>) {
        let backend = Self::default();
        let calls = backend.calls.clone();
        (backend, calls)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl MediaBackend for FakeBackend {
    fn prepare(&mut self, uri: &str, save_sink: Option<&Path>) -> Result<GraphHandle, PlaybackError> {
        self.record(Call::Prepare(uri.to_string(), save_sink.map(Path::to_path_buf)));
        if uri.contains("broken") {
            return Err(PlaybackError::Backend("no decoder".into()));
        }
        if let Some(path) = save_sink {
            std::fs::write(path, b"clip").map_err(PlaybackError::Spawn)?;
        }
        self.next_id += 1;
        Ok(GraphHandle(self.next_id))
    }

    fn set_state(&mut self, graph: GraphHandle, state: GraphState) -> Result<(), PlaybackError> {
        self.record(Call::SetState(graph, state));
        Ok(())
    }

    fn link_track(&mut self, graph: GraphHandle, track: &Track) -> Result<(), PlaybackError> {
        self.record(Call::Link(graph, track.clone()));
        Ok(())
    }

    fn release(&mut self, graph: GraphHandle) {
        self.record(Call::Release(graph));
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        self.record(Call::Fullscreen(fullscreen));
    }
}

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    controller: Controller<FakeBackend>,
    calls: Arc<Mutex<Vec<Call>>>,
    cache: TempDir,
}

impl Harness {
    fn new(retain: bool) -> Self {
        let cache = tempfile::tempdir().unwrap();
        let (backend, calls) = FakeBackend::new();
        let local = LocalCache::new(cache.path(), ClipMatcher::default());
        let retention = if retain {
            RetentionPolicy::enabled(cache.path())
        } else {
            RetentionPolicy::disabled()
        };
        let controller = Controller::new(backend, local, retention, ControllerOptions::default());
        Self {
            controller,
            calls,
            cache,
        }
    }

    fn enqueue(&mut self, uris: &[&str]) {
        self.controller
            .enqueue_all(uris.iter().map(|u| VideoReference::queued(*u)));
    }

    fn graph(&self) -> GraphHandle {
        self.controller.session().unwrap().graph()
    }

    fn current_uri(&self) -> String {
        self.controller.current().unwrap().uri().to_string()
    }

    fn signal(&mut self, signal: BackendSignal) -> Step {
        let graph = self.graph();
        self.controller.handle_event(BackendEvent::new(graph, signal))
    }

    fn prepared(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::Prepare(uri, _) => Some(uri.clone()),
                _ => None,
            })
            .collect()
    }

    fn state_calls(&self) -> Vec<GraphState> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::SetState(_, s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

// =============================================================================
// Clip Lifecycle
// =============================================================================

#[test]
fn test_plays_queue_in_order() {
    let mut h = Harness::new(false);
    h.enqueue(&["http://b/1.webm", "http://b/2.webm", "http://b/3.webm"]);

    assert_eq!(h.controller.start(), Step::Continue);
    assert_eq!(*h.controller.state(), PlayerState::Playing);

    assert_eq!(h.signal(BackendSignal::EndOfStream), Step::Continue);
    assert_eq!(h.signal(BackendSignal::EndOfStream), Step::Continue);
    assert_eq!(
        h.prepared(),
        vec!["http://b/1.webm", "http://b/2.webm", "http://b/3.webm"]
    );
    assert!(h.controller.queue().is_empty());
    assert!(!h.controller.take_refill_request());
}

#[test]
fn test_start_only_from_idle() {
    let mut h = Harness::new(false);
    h.enqueue(&["http://b/1.webm", "http://b/2.webm"]);
    h.controller.start();
    h.controller.start();
    assert_eq!(h.prepared().len(), 1);
}

#[test]
fn test_empty_queue_falls_back_to_cache_and_requests_refill() {
    let mut h = Harness::new(false);
    std::fs::write(h.cache.path().join("saved.webm"), b"x").unwrap();

    h.enqueue(&["http://b/1.webm"]);
    h.controller.start();
    assert!(!h.controller.take_refill_request());

    h.signal(BackendSignal::EndOfStream);
    let current = h.controller.current().unwrap();
    assert_eq!(current.origin(), ClipOrigin::LocalRandom);
    assert!(current.uri().ends_with("saved.webm"));
    assert!(h.controller.take_refill_request());
    // The flag is consumed
    assert!(!h.controller.take_refill_request());

    // Newly discovered clips take over from the cache
    h.enqueue(&["http://b/2.webm"]);
    h.signal(BackendSignal::EndOfStream);
    assert_eq!(h.current_uri(), "http://b/2.webm");
}

#[test]
fn test_nothing_to_play_backs_off() {
    let mut h = Harness::new(false);

    assert_eq!(h.controller.start(), Step::RetryAfter(Duration::from_secs(1)));
    assert!(matches!(h.controller.state(), PlayerState::Error(_)));
    assert!(h.controller.take_refill_request());

    assert_eq!(h.controller.retry(), Step::RetryAfter(Duration::from_secs(2)));
    assert_eq!(h.controller.retry(), Step::RetryAfter(Duration::from_secs(4)));

    h.enqueue(&["http://b/1.webm"]);
    assert_eq!(h.controller.retry(), Step::Continue);
    assert_eq!(*h.controller.state(), PlayerState::Playing);
}

#[test]
fn test_cooldown_is_capped() {
    let mut h = Harness::new(false);
    let mut step = h.controller.start();
    for _ in 0..10 {
        step = h.controller.retry();
    }
    assert_eq!(step, Step::RetryAfter(Duration::from_secs(30)));
}

#[test]
fn test_backend_error_then_retry_advances() {
    let mut h = Harness::new(false);
    h.enqueue(&["http://b/1.webm", "http://b/2.webm"]);
    h.controller.start();
    let failed = h.graph();

    let step = h.signal(BackendSignal::Error("decoder crashed".into()));
    assert_eq!(step, Step::RetryAfter(Duration::from_secs(1)));
    assert!(matches!(h.controller.state(), PlayerState::Error(msg) if msg.contains("decoder crashed")));
    assert!(h.controller.session().is_none());
    assert!(h.calls.lock().unwrap().contains(&Call::Release(failed)));

    assert_eq!(h.controller.retry(), Step::Continue);
    assert_eq!(h.current_uri(), "http://b/2.webm");
}

#[test]
fn test_prepare_failure_goes_to_error() {
    let mut h = Harness::new(false);
    h.enqueue(&["http://b/broken.webm", "http://b/ok.webm"]);

    assert!(matches!(h.controller.start(), Step::RetryAfter(_)));
    assert!(matches!(h.controller.state(), PlayerState::Error(_)));

    h.controller.retry();
    assert_eq!(h.current_uri(), "http://b/ok.webm");
}

#[test]
fn test_end_of_stream_resets_backoff() {
    let mut h = Harness::new(false);
    h.enqueue(&["http://b/broken1.webm", "http://b/broken2.webm", "http://b/1.webm"]);
    h.enqueue(&["http://b/broken3.webm"]);

    assert_eq!(h.controller.start(), Step::RetryAfter(Duration::from_secs(1)));
    assert_eq!(h.controller.retry(), Step::RetryAfter(Duration::from_secs(2)));
    assert_eq!(h.controller.retry(), Step::Continue);

    assert_eq!(
        h.signal(BackendSignal::EndOfStream),
        Step::RetryAfter(Duration::from_secs(1))
    );
}

#[test]
fn test_retry_ignored_outside_error() {
    let mut h = Harness::new(false);
    h.enqueue(&["http://b/1.webm", "http://b/2.webm"]);
    h.controller.start();
    assert_eq!(h.controller.retry(), Step::Continue);
    assert_eq!(h.prepared().len(), 1);
}

#[test]
fn test_stale_events_ignored() {
    let mut h = Harness::new(false);
    h.enqueue(&["http://b/1.webm", "http://b/2.webm", "http://b/3.webm"]);
    h.controller.start();
    let old = h.graph();

    h.controller.skip();
    assert_eq!(h.current_uri(), "http://b/2.webm");

    let step = h
        .controller
        .handle_event(BackendEvent::new(old, BackendSignal::EndOfStream));
    assert_eq!(step, Step::Continue);
    assert_eq!(h.current_uri(), "http://b/2.webm");

    let step = h
        .controller
        .handle_event(BackendEvent::new(old, BackendSignal::Error("late".into())));
    assert_eq!(step, Step::Continue);
    assert_eq!(*h.controller.state(), PlayerState::Playing);
}

// =============================================================================
// Buffering
// =============================================================================

#[test]
fn test_buffering_hysteresis() {
    let mut h = Harness::new(false);
    h.enqueue(&["http://b/1.webm"]);
    h.controller.start();
    h.clear_calls();

    h.signal(BackendSignal::Buffering(15));
    assert_eq!(*h.controller.state(), PlayerState::Buffering);
    h.signal(BackendSignal::Buffering(50));
    assert_eq!(*h.controller.state(), PlayerState::Buffering);
    h.signal(BackendSignal::Buffering(85));
    assert_eq!(*h.controller.state(), PlayerState::Playing);

    assert_eq!(h.state_calls(), vec![GraphState::Paused, GraphState::Playing]);
}

#[test]
fn test_buffering_above_low_mark_keeps_playing() {
    let mut h = Harness::new(false);
    h.enqueue(&["http://b/1.webm"]);
    h.controller.start();
    h.clear_calls();

    h.signal(BackendSignal::Buffering(20));
    h.signal(BackendSignal::Buffering(100));
    assert_eq!(*h.controller.state(), PlayerState::Playing);
    assert!(h.state_calls().is_empty());
}

#[test]
fn test_user_pause_survives_buffering() {
    let mut h = Harness::new(false);
    h.enqueue(&["http://b/1.webm"]);
    h.controller.start();

    h.controller.toggle_play();
    assert_eq!(*h.controller.state(), PlayerState::Paused);
    h.clear_calls();

    h.signal(BackendSignal::Buffering(5));
    h.signal(BackendSignal::Buffering(95));
    assert_eq!(*h.controller.state(), PlayerState::Paused);
    assert!(h.state_calls().is_empty());

    h.controller.toggle_play();
    assert_eq!(*h.controller.state(), PlayerState::Playing);
    assert_eq!(h.state_calls(), vec![GraphState::Playing]);
}

#[test]
fn test_user_pause_during_buffering_takes_over() {
    let mut h = Harness::new(false);
    h.enqueue(&["http://b/1.webm"]);
    h.controller.start();

    h.signal(BackendSignal::Buffering(10));
    h.controller.toggle_play();
    assert_eq!(*h.controller.state(), PlayerState::Paused);

    // Refilled buffer does not resume a user pause
    h.signal(BackendSignal::Buffering(90));
    assert_eq!(*h.controller.state(), PlayerState::Paused);
}

// =============================================================================
// Skipping
// =============================================================================

#[test]
fn test_skip_batch_drops_nine() {
    let mut h = Harness::new(false);
    let uris: Vec<String> = (0..20).map(|i| format!("http://b/{}.webm", i)).collect();
    h.controller
        .enqueue_all(uris.iter().map(|u| VideoReference::queued(u.as_str())));

    h.controller.start();
    assert_eq!(h.controller.queue().len(), 19);

    h.controller.skip_batch();
    assert_eq!(h.current_uri(), "http://b/10.webm");
    assert_eq!(h.controller.queue().len(), 9);
}

#[test]
fn test_skip_batch_with_short_queue_uses_cache() {
    let mut h = Harness::new(false);
    std::fs::write(h.cache.path().join("saved.webm"), b"x").unwrap();
    h.enqueue(&["http://b/0.webm", "http://b/1.webm", "http://b/2.webm"]);

    h.controller.start();
    h.controller.skip_batch();
    assert!(h.controller.queue().is_empty());
    assert_eq!(h.controller.current().unwrap().origin(), ClipOrigin::LocalRandom);
    assert!(h.controller.take_refill_request());
}

// =============================================================================
// Retention
// =============================================================================

#[test]
fn test_completed_clip_is_kept() {
    let mut h = Harness::new(true);
    h.enqueue(&["http://b/src/1/keep.webm", "http://b/src/1/next.webm"]);
    h.controller.start();

    let target = h.cache.path().join("keep.webm");
    assert_eq!(h.controller.session().unwrap().retained_path(), Some(target.as_path()));

    h.signal(BackendSignal::EndOfStream);
    assert!(target.exists());
}

#[test]
fn test_skipped_clip_is_discarded() {
    let mut h = Harness::new(true);
    h.enqueue(&["http://b/src/1/partial.webm", "http://b/src/1/next.webm"]);
    h.controller.start();

    let target = h.cache.path().join("partial.webm");
    assert!(target.exists());

    h.controller.skip();
    assert!(!target.exists());
}

#[test]
fn test_cached_and_local_clips_are_not_saved_again() {
    let mut h = Harness::new(true);
    std::fs::write(h.cache.path().join("known.webm"), b"x").unwrap();
    h.enqueue(&["http://b/src/1/known.webm"]);
    h.controller.start();
    assert!(h.controller.session().unwrap().retained_path().is_none());

    // Queue is now empty, so the next clip comes from the cache
    h.signal(BackendSignal::EndOfStream);
    assert_eq!(h.controller.current().unwrap().origin(), ClipOrigin::LocalRandom);
    assert!(h.controller.session().unwrap().retained_path().is_none());
}

// =============================================================================
// Tracks
// =============================================================================

#[test]
fn test_default_tracks_linked_immediately() {
    let mut h = Harness::new(false);
    h.enqueue(&["http://b/1.webm"]);
    h.controller.start();
    let graph = h.graph();
    h.clear_calls();

    h.signal(BackendSignal::TrackDiscovered(Track::new(0, TrackKind::Video, false)));
    h.signal(BackendSignal::TrackDiscovered(Track::new(1, TrackKind::Video, true)));
    h.signal(BackendSignal::TrackDiscovered(Track::new(2, TrackKind::Audio, true)));
    h.signal(BackendSignal::TrackDiscovered(Track::new(3, TrackKind::Audio, true)));
    h.signal(BackendSignal::NoMoreTracks);

    let calls = h.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            Call::Link(graph, Track::new(1, TrackKind::Video, true)),
            Call::Link(graph, Track::new(2, TrackKind::Audio, true)),
        ]
    );
}

#[test]
fn test_first_track_linked_when_no_default() {
    let mut h = Harness::new(false);
    h.enqueue(&["http://b/1.webm"]);
    h.controller.start();
    let graph = h.graph();
    h.clear_calls();

    h.signal(BackendSignal::TrackDiscovered(Track::new(0, TrackKind::Audio, false)));
    h.signal(BackendSignal::TrackDiscovered(Track::new(1, TrackKind::Video, false)));
    h.signal(BackendSignal::TrackDiscovered(Track::new(2, TrackKind::Other, true)));
    assert!(h.calls.lock().unwrap().is_empty());

    h.signal(BackendSignal::NoMoreTracks);
    let calls = h.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            Call::Link(graph, Track::new(1, TrackKind::Video, false)),
            Call::Link(graph, Track::new(0, TrackKind::Audio, false)),
        ]
    );
}

// =============================================================================
// Controls
// =============================================================================

#[test]
fn test_fullscreen_toggle() {
    let mut h = Harness::new(false);
    assert!(!h.controller.is_fullscreen());
    h.controller.toggle_fullscreen();
    h.controller.toggle_fullscreen();
    assert!(!h.controller.is_fullscreen());
    assert_eq!(
        *h.calls.lock().unwrap(),
        vec![Call::Fullscreen(true), Call::Fullscreen(false)]
    );
}

#[test]
fn test_shutdown_is_terminal() {
    let mut h = Harness::new(true);
    h.enqueue(&["http://b/src/1/a.webm", "http://b/src/1/b.webm"]);
    h.controller.start();
    let graph = h.graph();

    assert_eq!(h.controller.shutdown(), Step::Exit);
    assert_eq!(*h.controller.state(), PlayerState::Stopped);
    assert!(h.controller.session().is_none());
    assert!(h.calls.lock().unwrap().contains(&Call::Release(graph)));
    assert!(!h.cache.path().join("a.webm").exists());

    assert_eq!(
        h.controller
            .handle_event(BackendEvent::new(graph, BackendSignal::EndOfStream)),
        Step::Exit
    );
    assert_eq!(h.controller.skip(), Step::Exit);
    assert_eq!(h.controller.retry(), Step::Exit);
    assert_eq!(h.controller.shutdown(), Step::Exit);
    assert_eq!(h.prepared().len(), 1);
}
