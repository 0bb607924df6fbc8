//! Media backend contract
//!
//! A backend builds one playback graph per clip and reports what happens to
//! it as [`BackendEvent`]s on a channel. All decisions (which tracks to link,
//! when to pause for buffering, what plays next) stay in the controller.

use std::fmt;
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::{GraphState, Track};

/// Capacity of the backend → controller event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Opaque id of a playback graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphHandle(pub u64);

impl fmt::Display for GraphHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph#{}", self.0)
    }
}

/// What a graph reported
#[derive(Debug, Clone, PartialEq)]
pub enum BackendSignal {
    TrackDiscovered(Track),
    NoMoreTracks,
    /// Buffer fill level, 0-100
    Buffering(u8),
    EndOfStream,
    Error(String),
}

/// A signal tagged with the graph that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct BackendEvent {
    pub graph: GraphHandle,
    pub signal: BackendSignal,
}

impl BackendEvent {
    pub fn new(graph: GraphHandle, signal: BackendSignal) -> Self {
        Self { graph, signal }
    }
}

pub type EventSender = mpsc::Sender<BackendEvent>;
pub type EventReceiver = mpsc::Receiver<BackendEvent>;

/// Bounded channel carrying backend events to the controlling task
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Errors from playback operations
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Player '{0}' not found. Install it first.")]
    NotFound(String),
    #[error("Failed to start player: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Unknown playback graph: {0}")]
    UnknownGraph(GraphHandle),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("No clip available: queue is empty and the local cache has nothing to play")]
    NothingToPlay,
}

/// A playback backend driven by the controller
pub trait MediaBackend {
    /// Build a fresh graph for `uri`. When `save_sink` is set, the raw stream
    /// is also written to that path while it downloads.
    fn prepare(&mut self, uri: &str, save_sink: Option<&Path>) -> Result<GraphHandle, PlaybackError>;

    fn set_state(&mut self, graph: GraphHandle, state: GraphState) -> Result<(), PlaybackError>;

    /// Connect a discovered track to the matching output
    fn link_track(&mut self, graph: GraphHandle, track: &Track) -> Result<(), PlaybackError>;

    /// Stop and drop the graph. Unknown handles are ignored.
    fn release(&mut self, graph: GraphHandle);

    fn set_fullscreen(&mut self, fullscreen: bool);
}
