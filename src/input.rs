//! Keyboard input
//!
//! Maps terminal keys to player actions. Key polling runs on its own thread
//! because crossterm's reader blocks.

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Pending actions beyond this are dropped while the controller is busy
pub const ACTION_CHANNEL_CAPACITY: usize = 16;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// User commands for the playback controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Skip,
    SkipBatch,
    Quit,
    ToggleFullscreen,
    TogglePlay,
}

/// Map a key press to an action
pub fn action_for_key(key: KeyEvent) -> Option<Action> {
    // Only handle key press events (ignore releases on Windows)
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Action::Quit);
    }

    match key.code {
        KeyCode::Char('s') | KeyCode::Char('S') => Some(Action::Skip),
        KeyCode::Char('d') | KeyCode::Char('D') => Some(Action::SkipBatch),
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(Action::Quit),
        KeyCode::Char('f') | KeyCode::Char('F') => Some(Action::ToggleFullscreen),
        KeyCode::Char(' ') => Some(Action::TogglePlay),
        _ => None,
    }
}

/// Raw terminal mode for the lifetime of the guard
pub struct RawModeGuard;

impl RawModeGuard {
    pub fn enable() -> std::io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!(error = %e, "Failed to restore terminal");
        }
    }
}

/// Read keys on a dedicated thread until the receiver goes away
pub fn spawn_key_reader(tx: mpsc::Sender<Action>) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("key-reader".into())
        .spawn(move || {
            while !tx.is_closed() {
                match event::poll(POLL_INTERVAL) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        warn!(error = %e, "Terminal poll failed, key input disabled");
                        break;
                    }
                }
                let key = match event::read() {
                    Ok(Event::Key(key)) => key,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(error = %e, "Terminal read failed, key input disabled");
                        break;
                    }
                };
                let Some(action) = action_for_key(key) else {
                    continue;
                };
                debug!(?action, "Key action");
                match tx.try_send(action) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(?action, "Action dropped, controller busy")
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        })
}
