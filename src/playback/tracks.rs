//! Output linking policy for tracks discovered while demuxing
//!
//! Tracks arrive in any order. Per kind (video, audio), the first track
//! flagged default is linked right away. Containers that never flag a default
//! get their first track of that kind linked once the backend reports that no
//! more tracks are coming. At most one track per kind is ever linked.

use crate::models::{Track, TrackKind};

#[derive(Debug, Default, Clone)]
struct Slot {
    linked: Option<Track>,
    first_seen: Option<Track>,
}

impl Slot {
    fn offer(&mut self, track: &Track) -> Option<Track> {
        if self.linked.is_some() {
            return None;
        }
        if track.is_default {
            self.linked = Some(track.clone());
            return self.linked.clone();
        }
        if self.first_seen.is_none() {
            self.first_seen = Some(track.clone());
        }
        None
    }

    fn settle(&mut self) -> Option<Track> {
        if self.linked.is_some() {
            return None;
        }
        self.linked = self.first_seen.take();
        self.linked.clone()
    }
}

/// Per-session linking state
#[derive(Debug, Default, Clone)]
pub struct TrackLinker {
    video: Slot,
    audio: Slot,
    settled: bool,
}

impl TrackLinker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A track was discovered; returns it if it should be linked now
    pub fn on_track_discovered(&mut self, track: &Track) -> Option<Track> {
        if self.settled {
            return None;
        }
        match track.kind {
            TrackKind::Video => self.video.offer(track),
            TrackKind::Audio => self.audio.offer(track),
            TrackKind::Other => None,
        }
    }

    /// Backend will report no more tracks; returns fallback links to make
    pub fn on_no_more_tracks(&mut self) -> Vec<Track> {
        if self.settled {
            return Vec::new();
        }
        self.settled = true;
        [self.video.settle(), self.audio.settle()]
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn linked_video(&self) -> Option<&Track> {
        self.video.linked.as_ref()
    }

    pub fn linked_audio(&self) -> Option<&Track> {
        self.audio.linked.as_ref()
    }
}
