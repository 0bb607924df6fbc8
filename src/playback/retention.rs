//! Saving remote clips into the local cache while they play
//!
//! A save path is planned only for remote clips whose basename is not cached
//! yet. Abandoned clips (skip, error, quit) have their partial file removed;
//! clips that play to the end keep it.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::models::VideoReference;

#[derive(Debug, Clone, Default)]
pub struct RetentionPolicy {
    dir: Option<PathBuf>,
}

impl RetentionPolicy {
    /// Retain clips into `dir`
    pub fn enabled(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Where the backend should write the raw stream for this clip, if anywhere
    pub fn plan(&self, reference: &VideoReference) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        if !reference.is_remote() {
            return None;
        }
        let name = reference.basename()?;
        let target = dir.join(name);
        if target.exists() {
            debug!(path = %target.display(), "Clip already cached");
            return None;
        }
        Some(target)
    }

    /// Remove a partially written copy. Missing files are fine.
    pub fn discard(&self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed partial clip"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial clip"),
        }
    }
}
