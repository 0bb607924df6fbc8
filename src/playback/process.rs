//! External player backend - VLC/mpv subprocesses
//!
//! Every clip gets its own player process (one process = one graph). A
//! watcher task owns the child and its control connection: it relays what
//! the player reports, forwards controller commands, and once the process
//! exits sends a single end-of-stream or error. A clip only counts as
//! finished when the player said it reached the end; any other exit is an
//! error, so partial recordings get discarded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::backend::{
    BackendEvent, BackendSignal, EventSender, GraphHandle, MediaBackend, PlaybackError,
};
use super::ipc::{
    self, IpcEndpoint, MpvProtocol, PlayerCommand, SessionEnd, VlcProtocol,
    COMMAND_CHANNEL_CAPACITY,
};
use crate::models::{GraphState, Track};

/// How long to wait for the last player messages after the process exits
const SESSION_DRAIN: Duration = Duration::from_millis(500);

/// Supported external players
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerType {
    /// mpv media player (default)
    #[default]
    Mpv,
    /// VLC media player
    Vlc,
}

impl PlayerType {
    /// Get the command name for this player
    pub fn command(&self) -> &'static str {
        match self {
            PlayerType::Vlc => {
                // On macOS, VLC is an app bundle - check for it
                #[cfg(target_os = "macos")]
                if std::path::Path::new("/Applications/VLC.app").exists() {
                    return "/Applications/VLC.app/Contents/MacOS/VLC";
                }
                "vlc"
            }
            PlayerType::Mpv => "mpv",
        }
    }

    /// Get a display name for this player
    pub fn display_name(&self) -> &'static str {
        match self {
            PlayerType::Vlc => "VLC",
            PlayerType::Mpv => "mpv",
        }
    }
}

impl std::fmt::Display for PlayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for PlayerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mpv" => Ok(PlayerType::Mpv),
            "vlc" => Ok(PlayerType::Vlc),
            other => Err(format!("unknown backend '{}', expected mpv or vlc", other)),
        }
    }
}

/// How player processes are launched
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub player: PlayerType,
    /// Executable to run instead of the player's usual command
    pub program: Option<PathBuf>,
    pub user_agent: Option<String>,
    /// `cf_clearance` cookie value
    pub cookie: Option<String>,
    pub audio_normalization: bool,
    pub video_sink: Option<String>,
    pub audio_sink: Option<String>,
    /// Native window to render into
    pub window_id: Option<u64>,
    pub fullscreen: bool,
}

impl ProcessOptions {
    pub fn program(&self) -> PathBuf {
        self.program
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.player.command()))
    }

    /// Where the player for `graph` should listen for control connections
    pub fn endpoint(&self, graph: GraphHandle) -> std::io::Result<IpcEndpoint> {
        match self.player {
            PlayerType::Mpv => Ok(IpcEndpoint::socket_for(graph)),
            PlayerType::Vlc => IpcEndpoint::loopback(),
        }
    }

    /// Command-line arguments for one clip
    pub fn args(&self, uri: &str, save_sink: Option<&Path>, ipc: &IpcEndpoint) -> Vec<String> {
        match self.player {
            PlayerType::Mpv => self.mpv_args(uri, save_sink, ipc),
            PlayerType::Vlc => self.vlc_args(uri, save_sink, ipc),
        }
    }

    fn mpv_args(&self, uri: &str, save_sink: Option<&Path>, ipc: &IpcEndpoint) -> Vec<String> {
        let mut args = vec![
            "--no-terminal".to_string(),
            "--force-window=immediate".to_string(),
            "--keep-open=no".to_string(),
            // Keys only reach mpv through clipreel
            "--no-input-default-bindings".to_string(),
        ];
        if let IpcEndpoint::Socket(path) = ipc {
            args.push(format!("--input-ipc-server={}", path.display()));
        }
        if self.fullscreen {
            args.push("--fs".into());
        }
        if let Some(wid) = self.window_id {
            args.push(format!("--wid={}", wid));
        }
        if let Some(agent) = &self.user_agent {
            args.push(format!("--user-agent={}", agent));
        }
        if let Some(cookie) = &self.cookie {
            args.push(format!("--http-header-fields=Cookie: cf_clearance={}", cookie));
        }
        if self.audio_normalization {
            args.push(
                "--af=lavfi=[acompressor=ratio=5:threshold=-10dB:attack=5:release=120],lavfi=[alimiter]"
                    .into(),
            );
        }
        if let Some(vo) = &self.video_sink {
            args.push(format!("--vo={}", vo));
        }
        if let Some(ao) = &self.audio_sink {
            args.push(format!("--ao={}", ao));
        }
        if let Some(path) = save_sink {
            args.push(format!("--stream-record={}", path.display()));
        }
        args.push("--".into());
        args.push(uri.to_string());
        args
    }

    fn vlc_args(&self, uri: &str, save_sink: Option<&Path>, ipc: &IpcEndpoint) -> Vec<String> {
        let mut args = vec![
            "--intf=dummy".to_string(),
            "--play-and-exit".to_string(),
            "--no-video-title-show".to_string(),
            "--no-keyboard-events".to_string(),
            "--no-mouse-events".to_string(),
        ];
        if let IpcEndpoint::Tcp(addr) = ipc {
            args.push("--extraintf=rc".into());
            args.push(format!("--rc-host={}", addr));
        }
        if self.fullscreen {
            args.push("--fullscreen".into());
        }
        if let Some(wid) = self.window_id {
            args.push(format!("--drawable-xid={}", wid));
        }
        if let Some(agent) = &self.user_agent {
            args.push(format!("--http-user-agent={}", agent));
        }
        if self.audio_normalization {
            args.extend([
                "--audio-filter=compressor,normvol".to_string(),
                "--compressor-ratio=5".to_string(),
                "--compressor-threshold=-10".to_string(),
                "--norm-max-level=-3".to_string(),
            ]);
        }
        if let Some(vout) = &self.video_sink {
            args.push(format!("--vout={}", vout));
        }
        if let Some(aout) = &self.audio_sink {
            args.push(format!("--aout={}", aout));
        }
        if let Some(path) = save_sink {
            args.push(format!(
                "--sout=#duplicate{{dst=display,dst=std{{access=file,dst='{}'}}}}",
                path.display()
            ));
        }
        args.push(uri.to_string());
        args
    }
}

/// A running player process
struct RunningPlayer {
    commands: mpsc::Sender<PlayerCommand>,
    kill: Option<oneshot::Sender<()>>,
}

impl RunningPlayer {
    /// The command receiver lives in the watcher and is dropped before the
    /// exit is reported, so a closed channel means the process is gone
    fn send(&self, command: PlayerCommand) -> Result<(), PlaybackError> {
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Closed(_) => PlaybackError::Backend("player process has exited".into()),
            TrySendError::Full(_) => PlaybackError::Backend("player is not responding".into()),
        })
    }

    fn stop(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }
}

/// [`MediaBackend`] that runs one external player process per clip
pub struct ProcessBackend {
    options: ProcessOptions,
    events: EventSender,
    next_id: u64,
    graphs: HashMap<GraphHandle, RunningPlayer>,
}

impl ProcessBackend {
    pub fn new(options: ProcessOptions, events: EventSender) -> Self {
        if options.player == PlayerType::Vlc && options.cookie.is_some() {
            warn!("VLC backend cannot send the clearance cookie; remote clips may be refused");
        }
        Self {
            options,
            events,
            next_id: 0,
            graphs: HashMap::new(),
        }
    }

    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    /// Check if the player is available on the system
    pub async fn is_available(&self) -> bool {
        let program = self.options.program();

        // If it's a full path (macOS app bundle, configured path), check if it exists
        if program.is_absolute() {
            return program.exists();
        }

        // Otherwise use 'which' to find in PATH
        Command::new("which")
            .arg(&program)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn player(&self, graph: GraphHandle) -> Result<&RunningPlayer, PlaybackError> {
        self.graphs.get(&graph).ok_or(PlaybackError::UnknownGraph(graph))
    }
}

/// Final signal for a player that has exited
fn exit_signal(
    player: PlayerType,
    status: std::io::Result<ExitStatus>,
    end: Option<SessionEnd>,
) -> BackendSignal {
    let status = match status {
        Ok(status) => status,
        Err(e) => return BackendSignal::Error(format!("{} wait failed: {}", player, e)),
    };
    if !status.success() {
        return BackendSignal::Error(format!("{} exited with {}", player, status));
    }
    match end {
        Some(end) if end.finished => BackendSignal::EndOfStream,
        Some(SessionEnd {
            reason: Some(reason),
            ..
        }) => BackendSignal::Error(format!("{} stopped early: {}", player, reason)),
        _ => BackendSignal::Error(format!("{} exited before the end of the clip", player)),
    }
}

/// Owns one player process until it exits or is killed
async fn watch(
    mut child: Child,
    player: PlayerType,
    graph: GraphHandle,
    endpoint: IpcEndpoint,
    events: EventSender,
    mut commands: mpsc::Receiver<PlayerCommand>,
    mut kill: oneshot::Receiver<()>,
) {
    let session_events = events.clone();
    let session_endpoint = endpoint.clone();
    let mut session = Box::pin(async move {
        let stream = session_endpoint.connect_with_retry().await;
        match player {
            PlayerType::Mpv => {
                ipc::drive(MpvProtocol::default(), stream, graph, &session_events, &mut commands)
                    .await
            }
            PlayerType::Vlc => {
                ipc::drive(VlcProtocol::default(), stream, graph, &session_events, &mut commands)
                    .await
            }
        }
    });

    let mut end = None;
    let status = loop {
        tokio::select! {
            status = child.wait() => break Some(status),
            result = &mut session, if end.is_none() => end = Some(result),
            _ = &mut kill => break None,
        }
    };

    let Some(status) = status else {
        let _ = child.kill().await;
        endpoint.cleanup();
        debug!(%graph, "Player stopped");
        return;
    };

    // The player may exit before its last messages were read
    if end.is_none() {
        end = tokio::time::timeout(SESSION_DRAIN, &mut session).await.ok();
    }
    drop(session);
    endpoint.cleanup();

    let signal = exit_signal(player, status, end);
    debug!(%graph, ?signal, "Player exited");
    // Receiver gone means the controller already shut down
    let _ = events.send(BackendEvent::new(graph, signal)).await;
}

impl MediaBackend for ProcessBackend {
    fn prepare(&mut self, uri: &str, save_sink: Option<&Path>) -> Result<GraphHandle, PlaybackError> {
        self.next_id += 1;
        let graph = GraphHandle(self.next_id);
        let player = self.options.player;
        let program = self.options.program();
        let endpoint = self.options.endpoint(graph)?;

        let mut cmd = Command::new(&program);
        cmd.args(self.options.args(uri, save_sink, &endpoint))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PlaybackError::NotFound(program.display().to_string())
            } else {
                PlaybackError::Spawn(e)
            }
        })?;
        debug!(%graph, pid = ?child.id(), player = %player, "Spawned player");

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(watch(
            child,
            player,
            graph,
            endpoint,
            self.events.clone(),
            commands_rx,
            kill_rx,
        ));

        self.graphs.insert(
            graph,
            RunningPlayer {
                commands: commands_tx,
                kill: Some(kill_tx),
            },
        );
        Ok(graph)
    }

    fn set_state(&mut self, graph: GraphHandle, state: GraphState) -> Result<(), PlaybackError> {
        match state {
            GraphState::Playing => self.player(graph)?.send(PlayerCommand::Pause(false)),
            GraphState::Paused => self.player(graph)?.send(PlayerCommand::Pause(true)),
            GraphState::Stopped => {
                let player = self
                    .graphs
                    .get_mut(&graph)
                    .ok_or(PlaybackError::UnknownGraph(graph))?;
                player.stop();
                Ok(())
            }
        }
    }

    fn link_track(&mut self, graph: GraphHandle, track: &Track) -> Result<(), PlaybackError> {
        self.player(graph)?.send(PlayerCommand::Link(track.clone()))
    }

    fn release(&mut self, graph: GraphHandle) {
        if let Some(mut player) = self.graphs.remove(&graph) {
            player.stop();
        }
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        // New players start with the flag; running ones switch now
        self.options.fullscreen = fullscreen;
        for (graph, player) in &self.graphs {
            if let Err(e) = player.send(PlayerCommand::Fullscreen(fullscreen)) {
                debug!(%graph, error = %e, "Fullscreen not applied");
            }
        }
    }
}
