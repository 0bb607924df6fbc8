//! Logging setup
//!
//! While the player owns the terminal (raw mode) log lines would corrupt it,
//! so interactive runs log to a daily rolling file instead of stderr.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "clipreel=info";

/// Where log output goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// Daily rolling files in this directory
    File(PathBuf),
}

impl LogTarget {
    /// `<data_dir>/clipreel/logs`, or stderr if there is no data dir
    pub fn for_interactive() -> Self {
        match dirs::data_dir() {
            Some(dir) => LogTarget::File(dir.join("clipreel").join("logs")),
            None => LogTarget::Stderr,
        }
    }
}

fn env_filter(quiet: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("clipreel=warn")
        } else {
            EnvFilter::new(DEFAULT_FILTER)
        }
    })
}

/// Install the global subscriber. Keep the returned guard alive until exit
/// so buffered file output is flushed.
pub fn init(target: &LogTarget, quiet: bool) -> Result<Option<WorkerGuard>> {
    match target {
        LogTarget::Stderr => {
            tracing_subscriber::registry()
                .with(env_filter(quiet))
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .context("Failed to install logger")?;
            Ok(None)
        }
        LogTarget::File(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "clipreel.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(env_filter(quiet))
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .try_init()
                .context("Failed to install logger")?;
            Ok(Some(guard))
        }
    }
}
