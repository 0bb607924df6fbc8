//! Playback engine
//!
//! - Queue: FIFO of clips waiting to play
//! - Local: random fallback picks from the clip cache
//! - Retention: saving remote clips while they play
//! - Tracks: default-first output linking policy
//! - Backend: the media backend contract and its event channel
//! - Ipc: control connections to running players
//! - Process: external player (mpv/VLC) backend
//! - Controller: the playback state machine

pub mod backend;
pub mod controller;
pub mod ipc;
pub mod local;
pub mod process;
pub mod queue;
pub mod retention;
pub mod tracks;

pub use backend::{
    event_channel, BackendEvent, BackendSignal, EventReceiver, EventSender, GraphHandle,
    MediaBackend, PlaybackError, EVENT_CHANNEL_CAPACITY,
};
pub use controller::{BufferingThresholds, Controller, ControllerOptions, Step, SKIP_BATCH_SIZE};
pub use ipc::{IpcEndpoint, PlayerCommand, SessionEnd};
pub use local::LocalCache;
pub use process::{PlayerType, ProcessBackend, ProcessOptions};
pub use queue::PlaybackQueue;
pub use retention::RetentionPolicy;
pub use tracks::TrackLinker;
