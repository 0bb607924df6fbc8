//! clipreel - endless imageboard clip player
//!
//! # Usage
//!
//! ```bash
//! # Start playing (keys: s skip, d skip batch, space pause, f fullscreen, q quit)
//! clipreel
//!
//! # CLI mode (for automation)
//! clipreel scan --json
//! clipreel cache
//! ```

use std::io::IsTerminal;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};

use clipreel::app::App;
use clipreel::cli::{Cli, Command, ExitCode, Output};
use clipreel::commands;
use clipreel::config::Config;
use clipreel::input::{self, RawModeGuard, ACTION_CHANNEL_CAPACITY};
use clipreel::logging::{self, LogTarget};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let output = Output::new(&cli);

    // Keys are only read when a person is at the terminal
    let interactive = !cli.is_cli_mode() && std::io::stdin().is_terminal();
    let target = if interactive {
        LogTarget::for_interactive()
    } else {
        LogTarget::Stderr
    };
    let _log_guard = match logging::init(&target, cli.quiet) {
        Ok(guard) => guard,
        Err(e) => return output.error(format!("{:#}", e), ExitCode::Error).into(),
    };

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => return output.error(e.to_string(), ExitCode::ConfigError).into(),
    };

    let code = match cli.command {
        Some(Command::Scan(cmd)) => commands::scan_cmd(cmd, &config, &output).await,
        Some(Command::Cache(cmd)) => commands::cache_cmd(cmd, &config, &output).await,
        None => play(&config, interactive, &target, &output).await,
    };
    code.into()
}

/// Config file (explicit path or default location), then flags, then checks
fn load_config(cli: &Cli) -> Result<Config, clipreel::config::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    cli.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

// =============================================================================
// Play Mode
// =============================================================================

async fn play(
    config: &Config,
    interactive: bool,
    target: &LogTarget,
    output: &Output,
) -> ExitCode {
    if config.retain_clips {
        if let Err(e) = std::fs::create_dir_all(&config.cache_dir) {
            return output.error(
                format!("Cannot create {}: {}", config.cache_dir.display(), e),
                ExitCode::Error,
            );
        }
    }

    let (tx, rx) = mpsc::channel(ACTION_CHANNEL_CAPACITY);
    let mut app = match App::from_config(config, rx) {
        Ok(app) => app,
        Err(e) => return output.error(format!("{:#}", e), ExitCode::ConfigError),
    };

    let backend = app.controller().backend();
    if !backend.is_available().await {
        return output.error(
            format!(
                "{} not found. Install it or pick another with --backend",
                backend.options().player.display_name()
            ),
            ExitCode::PlayerNotFound,
        );
    }

    info!(
        board = %config.board_url,
        cache = %config.cache_dir.display(),
        backend = %config.backend,
        retain = config.retain_clips,
        "Starting clipreel"
    );

    let _raw_mode = if interactive {
        if let LogTarget::File(dir) = target {
            output.info(format!("Logging to {}", dir.display()));
        }
        output.info("s skip | d skip batch | space pause | f fullscreen | q quit");

        let guard = match RawModeGuard::enable() {
            Ok(guard) => guard,
            Err(e) => {
                return output.error(format!("Cannot set up terminal: {}", e), ExitCode::Error)
            }
        };
        if let Err(e) = input::spawn_key_reader(tx) {
            return output.error(format!("Cannot read keys: {}", e), ExitCode::Error);
        }
        Some(guard)
    } else {
        // Headless: only Ctrl-C stops playback
        drop(tx);
        None
    };

    match app.run().await {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Player failed");
            output.error(format!("{:#}", e), ExitCode::Error)
        }
    }
}
