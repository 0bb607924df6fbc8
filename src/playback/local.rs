//! Local clip cache used when the board has nothing new

use rand::seq::IndexedRandom;
use std::path::{Path, PathBuf};
use tracing::error;

use crate::api::board::ClipMatcher;
use crate::models::VideoReference;

/// Directory of previously saved clips
#[derive(Debug, Clone)]
pub struct LocalCache {
    dir: PathBuf,
    matcher: ClipMatcher,
}

impl LocalCache {
    pub fn new(dir: impl Into<PathBuf>, matcher: ClipMatcher) -> Self {
        Self {
            dir: dir.into(),
            matcher,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Clip files in the cache directory, sorted by name
    pub fn clips(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut clips = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let is_clip = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| self.matcher.is_clip(n))
                .unwrap_or(false);
            if is_clip {
                clips.push(path);
            }
        }
        clips.sort();
        Ok(clips)
    }

    /// Uniform random pick; `None` if the directory is empty or unreadable
    pub fn pick_random(&self) -> Option<VideoReference> {
        let clips = match self.clips() {
            Ok(clips) => clips,
            Err(e) => {
                error!(dir = %self.dir.display(), error = %e, "Cannot read clip cache directory");
                return None;
            }
        };

        let Some(path) = clips.choose(&mut rand::rng()) else {
            error!(dir = %self.dir.display(), "Clip cache directory is empty");
            return None;
        };

        let path = std::path::absolute(path).unwrap_or_else(|_| path.clone());
        Some(VideoReference::local(path.to_string_lossy()))
    }

    /// True if a file with this name already exists in the cache
    pub fn contains(&self, basename: &str) -> bool {
        self.dir.join(basename).is_file()
    }
}
