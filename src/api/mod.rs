//! API clients for external services
//!
//! - Board: imageboard index and thread JSON

pub mod board;

pub use board::{BoardClient, BoardError, BoardPage, ClipMatcher};
