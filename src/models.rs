//! Data structures and types for clipreel
//!
//! Shared models organized by domain:
//! - **Clips**: playable references and where they came from
//! - **Board**: tracked threads and their delivery cursor
//! - **Playback**: player states, graph states and discovered tracks

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Clip Models
// =============================================================================

/// Where a clip reference was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipOrigin {
    /// Discovered on the board and queued for playback
    Queued,
    /// Picked at random from the local cache directory
    LocalRandom,
}

impl fmt::Display for ClipOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipOrigin::Queued => write!(f, "queued"),
            ClipOrigin::LocalRandom => write!(f, "local"),
        }
    }
}

/// A playable clip: remote URL or local file path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoReference {
    uri: String,
    origin: ClipOrigin,
}

impl VideoReference {
    pub fn new(uri: impl Into<String>, origin: ClipOrigin) -> Self {
        Self {
            uri: uri.into(),
            origin,
        }
    }

    /// Reference discovered on the board
    pub fn queued(uri: impl Into<String>) -> Self {
        Self::new(uri, ClipOrigin::Queued)
    }

    /// Reference picked from the local cache
    pub fn local(uri: impl Into<String>) -> Self {
        Self::new(uri, ClipOrigin::LocalRandom)
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn origin(&self) -> ClipOrigin {
        self.origin
    }

    /// True for http(s) sources
    pub fn is_remote(&self) -> bool {
        let lower = self.uri.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }

    /// Last path segment, without query string or fragment
    pub fn basename(&self) -> Option<&str> {
        let path = self
            .uri
            .split(['?', '#'])
            .next()
            .unwrap_or(&self.uri);
        path.rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
    }
}

impl fmt::Display for VideoReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.uri, self.origin)
    }
}

// =============================================================================
// Board Models
// =============================================================================

/// A tracked board thread and its delivery cursor
///
/// `videos` only ever grows, so `delivered <= videos.len()` always holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    url: String,
    videos: Vec<VideoReference>,
    delivered: usize,
}

impl Thread {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            videos: Vec::new(),
            delivered: 0,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn videos(&self) -> &[VideoReference] {
        &self.videos
    }

    /// Number of clips already handed out
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Merge a fresh extraction of the thread's clips.
    ///
    /// Only URIs past the previously known count are appended. Returns the
    /// number of new clips.
    pub fn merge_extracted(&mut self, extracted: Vec<String>) -> usize {
        let known = self.videos.len();
        if extracted.len() <= known {
            return 0;
        }
        let fresh = extracted.len() - known;
        self.videos
            .extend(extracted.into_iter().skip(known).map(VideoReference::queued));
        fresh
    }

    /// Clips added since the last call; advances the cursor to the end.
    pub fn take_undelivered(&mut self) -> Vec<VideoReference> {
        let fresh = self.videos[self.delivered..].to_vec();
        self.delivered = self.videos.len();
        fresh
    }
}

impl PartialEq for Thread {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Thread {}

impl fmt::Display for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} clips, {} delivered)",
            self.url,
            self.videos.len(),
            self.delivered
        )
    }
}

// =============================================================================
// Playback Models
// =============================================================================

/// Controller state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlayerState {
    /// Nothing prepared yet
    #[default]
    Idle,
    /// Building the graph for the next clip
    Preparing,
    Playing,
    /// Paused by the user
    Paused,
    /// Paused by the controller until the buffer refills
    Buffering,
    /// Clip finished normally
    EndOfStream,
    /// Clip failed; waiting for the cooldown before advancing
    Error(String),
    /// Terminal
    Stopped,
}

impl PlayerState {
    /// Graph is not advancing (user pause or buffer underrun)
    pub fn is_paused(&self) -> bool {
        matches!(self, PlayerState::Paused | PlayerState::Buffering)
    }

    /// A graph is attached and running or paused
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PlayerState::Playing | PlayerState::Paused | PlayerState::Buffering
        )
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerState::Idle => write!(f, "idle"),
            PlayerState::Preparing => write!(f, "preparing"),
            PlayerState::Playing => write!(f, "playing"),
            PlayerState::Paused => write!(f, "paused"),
            PlayerState::Buffering => write!(f, "buffering"),
            PlayerState::EndOfStream => write!(f, "end of stream"),
            PlayerState::Error(msg) => write!(f, "error: {}", msg),
            PlayerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Target state requested from a playback graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Playing,
    Paused,
    Stopped,
}

/// Elementary stream type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
    /// Subtitles, data streams; never linked
    Other,
}

/// A track reported by the backend while demuxing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Backend-assigned stream index
    pub index: u32,
    pub kind: TrackKind,
    /// Container marks this as the default/selected track
    pub is_default: bool,
}

impl Track {
    pub fn new(index: u32, kind: TrackKind, is_default: bool) -> Self {
        Self {
            index,
            kind,
            is_default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_remote_detection() {
        assert!(VideoReference::queued("https://2ch.hk/b/src/1/2.webm").is_remote());
        assert!(VideoReference::queued("HTTP://example.org/a.webm").is_remote());
        assert!(!VideoReference::local("/home/user/webm/a.webm").is_remote());
    }

    #[test]
    fn test_reference_basename() {
        let r = VideoReference::queued("https://2ch.hk/b/src/1/1449.webm?t=3");
        assert_eq!(r.basename(), Some("1449.webm"));

        let r = VideoReference::local("webm/clip.mp4");
        assert_eq!(r.basename(), Some("clip.mp4"));

        let r = VideoReference::queued("https://2ch.hk/b/");
        assert_eq!(r.basename(), None);
    }

    #[test]
    fn test_thread_merge_appends_only_new() {
        let mut thread = Thread::new("/res/1.json");
        assert_eq!(thread.merge_extracted(vec!["a".into(), "b".into()]), 2);
        assert_eq!(
            thread.merge_extracted(vec!["a".into(), "b".into(), "c".into()]),
            1
        );
        assert_eq!(thread.merge_extracted(vec!["a".into()]), 0);

        let uris: Vec<_> = thread.videos().iter().map(|v| v.uri()).collect();
        assert_eq!(uris, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_thread_cursor_advances() {
        let mut thread = Thread::new("/res/1.json");
        thread.merge_extracted(vec!["a".into(), "b".into()]);

        assert_eq!(thread.take_undelivered().len(), 2);
        assert_eq!(thread.delivered(), 2);
        assert!(thread.take_undelivered().is_empty());

        thread.merge_extracted(vec!["a".into(), "b".into(), "c".into()]);
        let fresh = thread.take_undelivered();
        assert_eq!(fresh, vec![VideoReference::queued("c")]);
        assert!(thread.delivered() <= thread.videos().len());
    }

    #[test]
    fn test_thread_equality_by_url() {
        let mut a = Thread::new("/res/1.json");
        a.merge_extracted(vec!["x".into()]);
        let b = Thread::new("/res/1.json");
        assert_eq!(a, b);
        assert_ne!(a, Thread::new("/res/2.json"));
    }

    #[test]
    fn test_player_state_flags() {
        assert!(PlayerState::Paused.is_paused());
        assert!(PlayerState::Buffering.is_paused());
        assert!(!PlayerState::Playing.is_paused());
        assert!(PlayerState::Playing.is_active());
        assert!(!PlayerState::Stopped.is_active());
    }
}
