//! Application driver
//!
//! The single controlling task: owns the board and the playback controller,
//! and feeds them backend events, key actions and retry timers.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::api::board::BoardClient;
use crate::config::Config;
use crate::discovery::Board;
use crate::input::Action;
use crate::playback::{
    event_channel, BackendEvent, Controller, EventReceiver, LocalCache, MediaBackend,
    ProcessBackend, RetentionPolicy, Step,
};

/// What woke the driver loop
enum Wake {
    Backend(BackendEvent),
    Action(Option<Action>),
    Retry,
    Interrupt,
}

pub struct App<B: MediaBackend> {
    controller: Controller<B>,
    board: Board,
    events: EventReceiver,
    actions: mpsc::Receiver<Action>,
}

impl App<ProcessBackend> {
    /// Wire up the external-player backend and the board client from config
    pub fn from_config(config: &Config, actions: mpsc::Receiver<Action>) -> Result<Self> {
        let filter = config.feed_filter()?;
        let matcher = config.clip_matcher();
        let client = BoardClient::builder(&config.board_url)
            .cookie(config.cookie.clone())
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create board client")?;

        let (tx, events) = event_channel();
        let backend = ProcessBackend::new(config.process_options(), tx);
        let retention = if config.retain_clips {
            RetentionPolicy::enabled(&config.cache_dir)
        } else {
            RetentionPolicy::disabled()
        };
        let local = LocalCache::new(&config.cache_dir, matcher.clone());
        let controller = Controller::new(backend, local, retention, config.controller_options());

        Ok(Self::new(
            controller,
            Board::new(client, matcher, filter),
            events,
            actions,
        ))
    }
}

impl<B: MediaBackend> App<B> {
    pub fn new(
        controller: Controller<B>,
        board: Board,
        events: EventReceiver,
        actions: mpsc::Receiver<Action>,
    ) -> Self {
        Self {
            controller,
            board,
            events,
            actions,
        }
    }

    pub fn controller(&self) -> &Controller<B> {
        &self.controller
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Run a discovery cycle and queue what it found
    pub async fn refill(&mut self) -> usize {
        let videos = self.board.refill().await;
        let count = videos.len();
        self.controller.enqueue_all(videos);
        count
    }

    /// Apply a user action to the controller
    pub fn apply(&mut self, action: Action) -> Step {
        debug!(?action, state = %self.controller.state(), "Applying action");
        match action {
            Action::Skip => self.controller.skip(),
            Action::SkipBatch => self.controller.skip_batch(),
            Action::Quit => self.controller.shutdown(),
            Action::ToggleFullscreen => self.controller.toggle_fullscreen(),
            Action::TogglePlay => self.controller.toggle_play(),
        }
    }

    /// Play until the user quits or the process is interrupted
    pub async fn run(&mut self) -> Result<()> {
        let found = self.refill().await;
        info!(clips = found, "Starting playback");

        let mut step = self.controller.start();
        let mut retry_at: Option<Instant> = None;
        let mut actions_open = true;
        let interrupt = tokio::signal::ctrl_c();
        tokio::pin!(interrupt);

        loop {
            match step {
                Step::Exit => break,
                Step::RetryAfter(delay) => {
                    debug!(?delay, "Retrying after cooldown");
                    retry_at = Some(Instant::now() + delay);
                }
                Step::Continue => {}
            }

            if self.controller.take_refill_request() {
                self.refill().await;
            }

            let deadline = retry_at.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            let wake = tokio::select! {
                Some(event) = self.events.recv() => Wake::Backend(event),
                action = self.actions.recv(), if actions_open => Wake::Action(action),
                _ = tokio::time::sleep_until(deadline), if retry_at.is_some() => Wake::Retry,
                _ = &mut interrupt => Wake::Interrupt,
            };

            step = match wake {
                Wake::Backend(event) => self.controller.handle_event(event),
                Wake::Action(Some(action)) => self.apply(action),
                Wake::Action(None) => {
                    actions_open = false;
                    Step::Continue
                }
                Wake::Retry => {
                    retry_at = None;
                    self.controller.retry()
                }
                Wake::Interrupt => {
                    info!("Interrupted");
                    self.controller.shutdown()
                }
            };
        }

        self.controller.shutdown();
        info!("Player stopped");
        Ok(())
    }
}
