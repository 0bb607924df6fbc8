//! clipreel - endless imageboard clip player
//!
//! Watches an imageboard for clip threads, plays their attachments back to
//! back through an external player, and falls back to a local clip cache
//! when there is nothing new.
//!
//! # Modules
//!
//! - `models` - Clip references, threads, player and track types
//! - `api` - Board JSON client
//! - `discovery` - Thread tracking and the delivery cursor
//! - `playback` - Queue, controller state machine, media backends
//! - `app` - The controlling task that drives everything
//! - `cli`, `commands`, `config`, `input`, `logging` - Binary plumbing

pub mod api;
pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod discovery;
pub mod input;
pub mod logging;
pub mod models;
pub mod playback;

// Re-export commonly used types
pub use models::{
    ClipOrigin, GraphState, PlayerState, Thread, Track, TrackKind, VideoReference,
};

pub use api::{BoardClient, BoardError};
pub use app::App;
pub use config::{Config, ConfigError};
pub use discovery::{Board, FeedFilter};
pub use playback::{Controller, MediaBackend, PlaybackError};
