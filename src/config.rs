//! Configuration management for clipreel
//!
//! Handles config file loading and validation.
//! Config is stored at ~/.config/clipreel/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::api::board::ClipMatcher;
use crate::discovery::{FeedFilter, DEFAULT_INCLUDE_PATTERN};
use crate::playback::{BufferingThresholds, ControllerOptions, PlayerType, ProcessOptions};

/// Default board base URL
pub const DEFAULT_BOARD_URL: &str = "https://2ch.hk/b/";

/// Configuration errors; fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid {field} pattern: {source}")]
    InvalidPattern {
        field: &'static str,
        source: regex::Error,
    },
    #[error("Clip cache directory is not set")]
    MissingCacheDir,
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Board base URL; index is `<board_url>index.json`
    pub board_url: String,
    /// Directory with cached clips for the random fallback
    pub cache_dir: PathBuf,
    /// Save every fully played remote clip into `cache_dir`
    pub retain_clips: bool,
    /// Regex the opening post must match
    pub include_pattern: String,
    /// Regex the opening post must not match
    pub exclude_pattern: Option<String>,
    /// Attachment extensions treated as clips
    pub clip_extensions: Vec<String>,
    /// Cloudflare "cf_clearance" cookie value
    pub cookie: Option<String>,
    /// User-Agent the cookie was issued for
    pub user_agent: Option<String>,
    /// External player: mpv or vlc
    pub backend: PlayerType,
    /// Player executable, when it is not on PATH under its usual name
    pub player_path: Option<PathBuf>,
    /// Compress audio to even out volume between clips
    pub audio_normalization: bool,
    pub video_sink: Option<String>,
    pub audio_sink: Option<String>,
    /// Native window id to render into
    pub window_id: Option<u64>,
    pub fullscreen: bool,
    pub request_timeout_secs: u64,
    pub error_cooldown_ms: u64,
    pub max_error_cooldown_ms: u64,
    /// Pause below this buffer level (percent)
    pub buffer_low: u8,
    /// Resume at or above this buffer level (percent)
    pub buffer_high: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            board_url: DEFAULT_BOARD_URL.to_string(),
            cache_dir: PathBuf::from("webm"),
            retain_clips: true,
            include_pattern: DEFAULT_INCLUDE_PATTERN.to_string(),
            exclude_pattern: None,
            clip_extensions: vec!["webm".into(), "mp4".into()],
            cookie: None,
            user_agent: None,
            backend: PlayerType::default(),
            player_path: None,
            audio_normalization: true,
            video_sink: None,
            audio_sink: None,
            window_id: None,
            fullscreen: false,
            request_timeout_secs: 15,
            error_cooldown_ms: 1000,
            max_error_cooldown_ms: 30_000,
            buffer_low: 20,
            buffer_high: 80,
        }
    }
}

impl Config {
    /// Get config file path (~/.config/clipreel/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("clipreel").join("config.toml"))
    }

    /// Load from the default path; defaults if the file does not exist
    pub fn load() -> Result<Self, ConfigError> {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from `path`; defaults if the file does not exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check everything that would otherwise fail later at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.feed_filter()?;
        if self.cache_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingCacheDir);
        }
        if self.clip_extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "clip_extensions",
                reason: "at least one extension is required".into(),
            });
        }
        if self.buffer_low > self.buffer_high || self.buffer_high > 100 {
            return Err(ConfigError::InvalidValue {
                field: "buffer_low/buffer_high",
                reason: format!(
                    "need 0 <= low <= high <= 100, got {} and {}",
                    self.buffer_low, self.buffer_high
                ),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_secs",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Compiled include/exclude patterns
    pub fn feed_filter(&self) -> Result<FeedFilter, ConfigError> {
        let include = regex::Regex::new(&self.include_pattern).map_err(|source| {
            ConfigError::InvalidPattern {
                field: "include",
                source,
            }
        })?;
        let exclude = self
            .exclude_pattern
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(regex::Regex::new)
            .transpose()
            .map_err(|source| ConfigError::InvalidPattern {
                field: "exclude",
                source,
            })?;
        Ok(FeedFilter::new(include, exclude))
    }

    pub fn clip_matcher(&self) -> ClipMatcher {
        ClipMatcher::new(&self.clip_extensions)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            buffering: BufferingThresholds {
                low: self.buffer_low,
                high: self.buffer_high,
            },
            error_cooldown: Duration::from_millis(self.error_cooldown_ms),
            max_error_cooldown: Duration::from_millis(self.max_error_cooldown_ms),
            fullscreen: self.fullscreen,
        }
    }

    pub fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            player: self.backend,
            program: self.player_path.clone(),
            user_agent: self.user_agent.clone(),
            cookie: self.cookie.clone(),
            audio_normalization: self.audio_normalization,
            video_sink: self.video_sink.clone(),
            audio_sink: self.audio_sink.clone(),
            window_id: self.window_id,
            fullscreen: self.fullscreen,
        }
    }
}
