//! CLI - Command Line Interface for clipreel
//!
//! Run without a subcommand to start the endless player. The subcommands
//! are one-shot and scriptable; their output is JSON-parseable.
//!
//! # Examples
//!
//! ```bash
//! # Play forever, saving clips into ./webm
//! clipreel
//!
//! # What would be played right now
//! clipreel scan --json
//!
//! # Clips available for the offline fallback
//! clipreel cache --cache-dir ~/clips
//! ```

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::config::Config;
use crate::playback::PlayerType;

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments
    InvalidArgs = 2,
    /// Network error
    NetworkError = 3,
    /// Invalid or unreadable configuration
    ConfigError = 4,
    /// External player not installed
    PlayerNotFound = 5,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// clipreel - endless imageboard clip player
///
/// Run without arguments to start playing.
/// Use subcommands for inspection and scripting.
#[derive(Parser, Debug)]
#[command(
    name = "clipreel",
    version,
    about = "Endless imageboard clip player",
    long_about = "Finds clip threads on an imageboard, plays their attachments \
                  back to back and falls back to a local clip cache when the \
                  feed runs dry.\n\n\
                  Keys while playing: s skip, d skip batch, space pause, \
                  f fullscreen, q quit.",
    after_help = "EXAMPLES:\n\
                  clipreel                          Start the endless player\n\
                  clipreel --backend vlc            Play through VLC\n\
                  clipreel scan --json              List matching threads and clips\n\
                  clipreel cache                    List cached clips"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Local clip cache directory
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Board base URL
    #[arg(long, global = true)]
    pub board: Option<String>,

    /// External player (mpv, vlc)
    #[arg(long, short = 'b', global = true)]
    pub backend: Option<PlayerType>,

    /// Do not save played clips into the cache
    #[arg(long, global = true)]
    pub no_retain: bool,

    /// Start in fullscreen
    #[arg(long, short = 'f')]
    pub fullscreen: bool,

    /// Subcommand to run (omit to play)
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Check if running in CLI mode (has subcommand)
    pub fn is_cli_mode(&self) -> bool {
        self.command.is_some()
    }

    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }

    /// Command-line flags take precedence over the config file
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = dir.clone();
        }
        if let Some(board) = &self.board {
            config.board_url = board.clone();
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if self.no_retain {
            config.retain_clips = false;
        }
        if self.fullscreen {
            config.fullscreen = true;
        }
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Poll the board once and list matching threads with their clips
    Scan(ScanCmd),

    /// List clips in the local cache
    Cache(CacheCmd),
}

#[derive(Args, Debug)]
pub struct ScanCmd {
    /// Print at most this many clips per thread
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct CacheCmd {}

// =============================================================================
// JSON Output Types
// =============================================================================

/// Generic JSON output wrapper with status
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub exit_code: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl<T: Serialize> JsonOutput<T> {
    /// Create success output with data
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            exit_code: 0,
        }
    }

    /// Create error output (no data)
    pub fn error_msg(msg: impl Into<String>, code: ExitCode) -> JsonOutput<()> {
        JsonOutput::<()> {
            data: None,
            error: Some(msg.into()),
            exit_code: code.into(),
        }
    }
}

/// One matching thread and the clips found in it
#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadReport {
    pub url: String,
    pub clips: Vec<String>,
}

/// Result of `clipreel scan`
#[derive(Debug, Serialize, Deserialize)]
pub struct ScanReport {
    pub board: String,
    pub threads: Vec<ThreadReport>,
    pub total_clips: usize,
}

/// Result of `clipreel cache`
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheReport {
    pub dir: PathBuf,
    pub clips: Vec<PathBuf>,
    pub count: usize,
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Output handler for consistent formatting
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Print success data
    pub fn print<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        if self.json {
            let output = JsonOutput::success(data);
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            // For non-JSON, caller should handle formatting
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Ok(())
    }

    /// Print a plain line (suppressed in JSON mode)
    pub fn line(&self, msg: impl std::fmt::Display) {
        if !self.json {
            println!("{}", msg);
        }
    }

    /// Print error and return exit code
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            let output = JsonOutput::<()>::error_msg(&msg, code);
            if let Ok(json) = serde_json::to_string_pretty(&output) {
                eprintln!("{}", json);
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Print info message (suppressed in quiet mode)
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        // Verify CLI structure is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_args_is_play_mode() {
        let cli = Cli::parse_from(["clipreel"]);
        assert!(!cli.is_cli_mode());
        assert!(!cli.no_retain);
    }

    #[test]
    fn test_scan_command() {
        let cli = Cli::parse_from(["clipreel", "scan", "-n", "3"]);
        assert!(cli.is_cli_mode());
        if let Some(Command::Scan(cmd)) = cli.command {
            assert_eq!(cmd.limit, Some(3));
        } else {
            panic!("Expected Scan command");
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "clipreel",
            "cache",
            "--json",
            "--quiet",
            "--cache-dir",
            "/tmp/clips",
        ]);
        assert!(cli.json);
        assert!(cli.quiet);
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/clips")));
        assert!(matches!(cli.command, Some(Command::Cache(_))));
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "clipreel",
            "--backend",
            "vlc",
            "--no-retain",
            "--board",
            "http://localhost:8080/b/",
            "-f",
        ]);
        let mut config = Config::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.backend, PlayerType::Vlc);
        assert!(!config.retain_clips);
        assert!(config.fullscreen);
        assert_eq!(config.board_url, "http://localhost:8080/b/");
        assert_eq!(config.cache_dir, PathBuf::from("webm"));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(Cli::try_parse_from(["clipreel", "--backend", "winamp"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::Error), 1);
        assert_eq!(i32::from(ExitCode::InvalidArgs), 2);
        assert_eq!(i32::from(ExitCode::NetworkError), 3);
        assert_eq!(i32::from(ExitCode::ConfigError), 4);
        assert_eq!(i32::from(ExitCode::PlayerNotFound), 5);
    }

    #[test]
    fn test_json_error_envelope() {
        let out = JsonOutput::<()>::error_msg("boom", ExitCode::NetworkError);
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["error"], "boom");
        assert_eq!(json["exit_code"], 3);
        assert!(json.get("data").is_none());
    }
}
