//! Playback controller - the state machine
//!
//! ```text
//! Idle → Preparing → Playing ⇄ Paused
//!                    Playing ⇄ Buffering
//!                    → EndOfStream | Error → Preparing → ...
//! ```
//!
//! `Stopped` is terminal. Every transition runs on the single controlling
//! task; backend workers only deliver [`BackendEvent`]s.

use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::backend::{BackendEvent, BackendSignal, GraphHandle, MediaBackend, PlaybackError};
use super::local::LocalCache;
use super::queue::PlaybackQueue;
use super::retention::RetentionPolicy;
use super::tracks::TrackLinker;
use crate::models::{GraphState, PlayerState, Track, VideoReference};

/// Queued clips dropped by a batch skip
pub const SKIP_BATCH_SIZE: usize = 9;

/// Pause below `low`, resume at or above `high`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferingThresholds {
    pub low: u8,
    pub high: u8,
}

impl Default for BufferingThresholds {
    fn default() -> Self {
        Self { low: 20, high: 80 }
    }
}

/// Tunables for the controller
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub buffering: BufferingThresholds,
    /// Wait after the first error before advancing
    pub error_cooldown: Duration,
    /// Cooldown doubles per consecutive error up to this value
    pub max_error_cooldown: Duration,
    /// Whether the backend starts in fullscreen
    pub fullscreen: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            buffering: BufferingThresholds::default(),
            error_cooldown: Duration::from_secs(1),
            max_error_cooldown: Duration::from_secs(30),
            fullscreen: false,
        }
    }
}

/// What the driver should do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// Call [`Controller::retry`] after this delay
    RetryAfter(Duration),
    /// The controller stopped; leave the event loop
    Exit,
}

/// The clip currently attached to a graph
#[derive(Debug)]
pub struct PlaybackSession {
    reference: VideoReference,
    graph: GraphHandle,
    retained_path: Option<PathBuf>,
    tracks: TrackLinker,
}

impl PlaybackSession {
    pub fn reference(&self) -> &VideoReference {
        &self.reference
    }

    pub fn graph(&self) -> GraphHandle {
        self.graph
    }

    pub fn retained_path(&self) -> Option<&std::path::Path> {
        self.retained_path.as_deref()
    }

    pub fn tracks(&self) -> &TrackLinker {
        &self.tracks
    }
}

pub struct Controller<B: MediaBackend> {
    backend: B,
    queue: PlaybackQueue,
    local: LocalCache,
    retention: RetentionPolicy,
    options: ControllerOptions,
    state: PlayerState,
    session: Option<PlaybackSession>,
    refill_requested: bool,
    consecutive_errors: u32,
    fullscreen: bool,
}

impl<B: MediaBackend> Controller<B> {
    pub fn new(
        backend: B,
        local: LocalCache,
        retention: RetentionPolicy,
        options: ControllerOptions,
    ) -> Self {
        Self {
            backend,
            queue: PlaybackQueue::new(),
            local,
            retention,
            state: PlayerState::Idle,
            session: None,
            refill_requested: false,
            consecutive_errors: 0,
            fullscreen: options.fullscreen,
            options,
        }
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn current(&self) -> Option<&VideoReference> {
        self.session.as_ref().map(|s| &s.reference)
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn enqueue_all(&mut self, references: impl IntoIterator<Item = VideoReference>) {
        self.queue.extend(references);
    }

    /// True once after the queue ran dry; the driver should run discovery
    pub fn take_refill_request(&mut self) -> bool {
        std::mem::take(&mut self.refill_requested)
    }

    // -------------------------------------------------------------------------
    // Clip lifecycle
    // -------------------------------------------------------------------------

    /// Begin playback from `Idle`
    pub fn start(&mut self) -> Step {
        if self.state != PlayerState::Idle {
            return Step::Continue;
        }
        self.advance()
    }

    /// Called by the driver once an error cooldown has elapsed
    pub fn retry(&mut self) -> Step {
        match self.state {
            PlayerState::Error(_) => self.advance(),
            PlayerState::Stopped => Step::Exit,
            _ => Step::Continue,
        }
    }

    /// Prepare and start the next clip
    fn advance(&mut self) -> Step {
        if self.state == PlayerState::Stopped {
            return Step::Exit;
        }
        self.state = PlayerState::Preparing;

        let local = &self.local;
        let mut ran_dry = false;
        let next = self
            .queue
            .dequeue_or_fallback(|| local.pick_random(), || ran_dry = true);
        if ran_dry {
            info!("Queue is empty, requesting refill");
            self.refill_requested = true;
        }

        let Some(reference) = next else {
            return self.fail(PlaybackError::NothingToPlay);
        };

        let retained_path = self.retention.plan(&reference);
        let graph = match self.backend.prepare(reference.uri(), retained_path.as_deref()) {
            Ok(graph) => graph,
            Err(e) => {
                if let Some(path) = retained_path.as_deref() {
                    self.retention.discard(path);
                }
                return self.fail(e);
            }
        };

        self.session = Some(PlaybackSession {
            reference,
            graph,
            retained_path,
            tracks: TrackLinker::new(),
        });

        if let Err(e) = self.backend.set_state(graph, GraphState::Playing) {
            return self.fail(e);
        }

        self.state = PlayerState::Playing;
        if let Some(session) = &self.session {
            info!(
                clip = %session.reference,
                %graph,
                saving = session.retained_path.is_some(),
                queued = self.queue.len(),
                "Playing"
            );
        }
        Step::Continue
    }

    /// Stop and release the current graph. Partial copies are removed unless
    /// the clip completed.
    fn teardown(&mut self, completed: bool) {
        let Some(session) = self.session.take() else {
            return;
        };
        if let Err(e) = self.backend.set_state(session.graph, GraphState::Stopped) {
            debug!(graph = %session.graph, error = %e, "Stop failed during teardown");
        }
        self.backend.release(session.graph);

        if let Some(path) = session.retained_path.as_deref() {
            if completed {
                info!(path = %path.display(), "Clip saved");
            } else {
                self.retention.discard(path);
            }
        }
    }

    fn fail(&mut self, err: PlaybackError) -> Step {
        error!(error = %err, "Playback error");
        self.teardown(false);
        self.state = PlayerState::Error(err.to_string());
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        Step::RetryAfter(self.cooldown())
    }

    /// Base cooldown doubled for every consecutive error, capped
    fn cooldown(&self) -> Duration {
        let exponent = self.consecutive_errors.saturating_sub(1).min(16);
        self.options
            .error_cooldown
            .saturating_mul(1u32 << exponent)
            .min(self.options.max_error_cooldown.max(self.options.error_cooldown))
    }

    fn end_of_stream(&mut self) -> Step {
        debug!("End of stream");
        self.teardown(true);
        self.consecutive_errors = 0;
        self.state = PlayerState::EndOfStream;
        self.advance()
    }

    // -------------------------------------------------------------------------
    // Backend signals
    // -------------------------------------------------------------------------

    /// Apply a backend signal. Signals from graphs other than the current one
    /// are stale and ignored.
    pub fn handle_event(&mut self, event: BackendEvent) -> Step {
        if self.state == PlayerState::Stopped {
            return Step::Exit;
        }
        let current = self.session.as_ref().map(|s| s.graph);
        if current != Some(event.graph) {
            debug!(graph = %event.graph, signal = ?event.signal, "Ignoring stale backend event");
            return Step::Continue;
        }

        match event.signal {
            BackendSignal::TrackDiscovered(track) => {
                self.on_track_discovered(event.graph, track);
                Step::Continue
            }
            BackendSignal::NoMoreTracks => {
                self.on_no_more_tracks(event.graph);
                Step::Continue
            }
            BackendSignal::Buffering(percent) => {
                self.on_buffering(percent);
                Step::Continue
            }
            BackendSignal::EndOfStream => self.end_of_stream(),
            BackendSignal::Error(message) => self.fail(PlaybackError::Backend(message)),
        }
    }

    fn on_track_discovered(&mut self, graph: GraphHandle, track: Track) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        debug!(index = track.index, kind = ?track.kind, default = track.is_default, "Track discovered");
        if let Some(link) = session.tracks.on_track_discovered(&track) {
            self.link(graph, &link);
        }
    }

    fn on_no_more_tracks(&mut self, graph: GraphHandle) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let links = session.tracks.on_no_more_tracks();
        let has_video = session.tracks.linked_video().is_some();
        for link in links {
            self.link(graph, &link);
        }
        if !has_video {
            warn!(%graph, "Clip has no video track");
        }
    }

    fn link(&mut self, graph: GraphHandle, track: &Track) {
        match self.backend.link_track(graph, track) {
            Ok(()) => debug!(index = track.index, kind = ?track.kind, "Linked track"),
            Err(e) => warn!(index = track.index, error = %e, "Failed to link track"),
        }
    }

    /// Hysteresis: pause below the low mark, resume at the high mark. User
    /// pauses are never overridden.
    fn on_buffering(&mut self, percent: u8) {
        let Some(graph) = self.session.as_ref().map(|s| s.graph) else {
            return;
        };
        let thresholds = self.options.buffering;

        match self.state {
            PlayerState::Playing if percent < thresholds.low => {
                info!(percent, "Buffer low, pausing");
                if let Err(e) = self.backend.set_state(graph, GraphState::Paused) {
                    warn!(error = %e, "Failed to pause for buffering");
                }
                self.state = PlayerState::Buffering;
            }
            PlayerState::Buffering if percent >= thresholds.high => {
                info!(percent, "Buffer refilled, resuming");
                if let Err(e) = self.backend.set_state(graph, GraphState::Playing) {
                    warn!(error = %e, "Failed to resume after buffering");
                }
                self.state = PlayerState::Playing;
            }
            _ => debug!(percent, state = %self.state, "Buffering"),
        }
    }

    // -------------------------------------------------------------------------
    // Manual controls
    // -------------------------------------------------------------------------

    pub fn toggle_play(&mut self) -> Step {
        let Some(graph) = self.session.as_ref().map(|s| s.graph) else {
            return Step::Continue;
        };
        match self.state {
            PlayerState::Playing => {
                if let Err(e) = self.backend.set_state(graph, GraphState::Paused) {
                    warn!(error = %e, "Failed to pause");
                    return Step::Continue;
                }
                self.state = PlayerState::Paused;
            }
            PlayerState::Paused => {
                if let Err(e) = self.backend.set_state(graph, GraphState::Playing) {
                    warn!(error = %e, "Failed to resume");
                    return Step::Continue;
                }
                self.state = PlayerState::Playing;
            }
            // Graph is already paused; the user now owns the pause
            PlayerState::Buffering => self.state = PlayerState::Paused,
            _ => {}
        }
        Step::Continue
    }

    /// Abandon the current clip and play the next one
    pub fn skip(&mut self) -> Step {
        if self.state == PlayerState::Stopped {
            return Step::Exit;
        }
        info!("Skipping clip");
        self.teardown(false);
        self.advance()
    }

    /// Drop a batch of queued clips, then skip the current one
    pub fn skip_batch(&mut self) -> Step {
        if self.state == PlayerState::Stopped {
            return Step::Exit;
        }
        let dropped = self.queue.drain_up_to(SKIP_BATCH_SIZE);
        info!(dropped, remaining = self.queue.len(), "Skipping batch");
        self.skip()
    }

    pub fn toggle_fullscreen(&mut self) -> Step {
        self.fullscreen = !self.fullscreen;
        self.backend.set_fullscreen(self.fullscreen);
        Step::Continue
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// Stop playback for good
    pub fn shutdown(&mut self) -> Step {
        if self.state != PlayerState::Stopped {
            info!("Shutting down playback");
            self.teardown(false);
            self.state = PlayerState::Stopped;
        }
        Step::Exit
    }
}
