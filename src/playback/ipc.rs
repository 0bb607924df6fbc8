//! Control channels to running players
//!
//! mpv speaks line-delimited JSON on its `--input-ipc-server` socket; VLC's
//! rc interface is a line-oriented text console on `--rc-host`. A session
//! turns player output into [`BackendSignal`]s, forwards [`PlayerCommand`]s
//! from the controller, and records whether the clip actually reached its
//! end. The process watcher makes the final call once the player exits.

use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::backend::{BackendEvent, BackendSignal, EventSender, GraphHandle};
use crate::models::{Track, TrackKind};

/// Capacity of the controller → player command channel
pub const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// Delay between connection attempts while the player starts up
const CONNECT_RETRY: Duration = Duration::from_millis(50);

/// How often position queries go out (VLC only)
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// VLC reports whole seconds and is polled, so the last sample lags the end
const VLC_END_TOLERANCE_SECS: u64 = 2;

/// Something the controller wants a running player to do
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Pause(bool),
    Fullscreen(bool),
    Link(Track),
}

/// What a session learned by the time the player closed its end
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionEnd {
    /// The player reported a real end of file
    pub finished: bool,
    /// Why playback stopped short, when the player said
    pub reason: Option<String>,
}

// =============================================================================
// Endpoints
// =============================================================================

/// Where a player listens for control connections
#[derive(Debug, Clone, PartialEq)]
pub enum IpcEndpoint {
    /// Unix socket path, or a named pipe on Windows
    Socket(PathBuf),
    Tcp(SocketAddr),
}

pub trait IpcStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> IpcStream for T {}

impl IpcEndpoint {
    /// A per-graph socket name that will not collide with other instances
    pub fn socket_for(graph: GraphHandle) -> Self {
        let name = format!("clipreel-{}-{}", std::process::id(), graph.0);
        #[cfg(windows)]
        let path = PathBuf::from(format!(r"\\.\pipe\{}", name));
        #[cfg(not(windows))]
        let path = std::env::temp_dir().join(format!("{}.sock", name));
        IpcEndpoint::Socket(path)
    }

    /// A free loopback port
    pub fn loopback() -> io::Result<Self> {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
        Ok(IpcEndpoint::Tcp(listener.local_addr()?))
    }

    pub async fn connect(&self) -> io::Result<Box<dyn IpcStream>> {
        match self {
            IpcEndpoint::Tcp(addr) => Ok(Box::new(TcpStream::connect(addr).await?)),
            IpcEndpoint::Socket(path) => connect_socket(path).await,
        }
    }

    /// Keep trying until the player opens its end. The caller bounds this by
    /// racing it against the process exiting.
    pub async fn connect_with_retry(&self) -> Box<dyn IpcStream> {
        loop {
            match self.connect().await {
                Ok(stream) => {
                    debug!(endpoint = ?self, "Connected to player");
                    return stream;
                }
                Err(e) => {
                    trace!(endpoint = ?self, error = %e, "Player not listening yet");
                    tokio::time::sleep(CONNECT_RETRY).await;
                }
            }
        }
    }

    /// Remove a leftover socket file
    pub fn cleanup(&self) {
        #[cfg(unix)]
        if let IpcEndpoint::Socket(path) = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(unix)]
async fn connect_socket(path: &Path) -> io::Result<Box<dyn IpcStream>> {
    Ok(Box::new(tokio::net::UnixStream::connect(path).await?))
}

#[cfg(windows)]
async fn connect_socket(path: &Path) -> io::Result<Box<dyn IpcStream>> {
    let pipe = tokio::net::windows::named_pipe::ClientOptions::new().open(path)?;
    Ok(Box::new(pipe))
}

#[cfg(not(any(unix, windows)))]
async fn connect_socket(_path: &Path) -> io::Result<Box<dyn IpcStream>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "socket control is not supported on this platform",
    ))
}

// =============================================================================
// Session driver
// =============================================================================

/// Reaction to one line from the player
#[derive(Debug, Default, PartialEq)]
pub struct Reaction {
    pub signals: Vec<BackendSignal>,
    pub replies: Vec<String>,
}

/// One player's control dialect
pub trait Protocol {
    /// Lines sent right after connecting
    fn handshake(&mut self) -> Vec<String>;

    fn on_line(&mut self, line: &str) -> Reaction;

    fn on_command(&mut self, command: &PlayerCommand) -> Option<String>;

    /// Lines sent on every poll tick
    fn poll(&mut self) -> Vec<String> {
        Vec::new()
    }

    fn end(&self) -> SessionEnd;
}

/// Run a session until the player closes the connection
pub async fn drive<P, S>(
    mut protocol: P,
    stream: S,
    graph: GraphHandle,
    events: &EventSender,
    commands: &mut mpsc::Receiver<PlayerCommand>,
) -> SessionEnd
where
    P: Protocol,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read, mut write) = tokio::io::split(stream);
    let mut lines = BufReader::new(read).lines();
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut commands_open = true;

    if let Err(e) = send_lines(&mut write, protocol.handshake()).await {
        debug!(%graph, error = %e, "Player hung up during handshake");
        return protocol.end();
    }

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    trace!(%graph, %line, "Player said");
                    let reaction = protocol.on_line(&line);
                    for signal in reaction.signals {
                        if events.send(BackendEvent::new(graph, signal)).await.is_err() {
                            return protocol.end();
                        }
                    }
                    if send_lines(&mut write, reaction.replies).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(%graph, error = %e, "Player connection failed");
                    break;
                }
            },
            command = commands.recv(), if commands_open => match command {
                Some(command) => {
                    let Some(line) = protocol.on_command(&command) else {
                        continue;
                    };
                    if send_lines(&mut write, vec![line]).await.is_err() {
                        break;
                    }
                }
                None => commands_open = false,
            },
            _ = ticker.tick() => {
                if send_lines(&mut write, protocol.poll()).await.is_err() {
                    break;
                }
            }
        }
    }
    protocol.end()
}

async fn send_lines<W: AsyncWrite + Unpin>(write: &mut W, lines: Vec<String>) -> io::Result<()> {
    if lines.is_empty() {
        return Ok(());
    }
    for line in lines {
        write.write_all(line.as_bytes()).await?;
        write.write_all(b"\n").await?;
    }
    write.flush().await
}

// =============================================================================
// mpv JSON IPC
// =============================================================================

const OBSERVE_PAUSED_FOR_CACHE: u64 = 1;
const OBSERVE_CACHE_STATE: u64 = 2;
const TRACK_LIST_REQUEST: u64 = 100;

#[derive(Debug, Deserialize)]
struct MpvMessage {
    event: Option<String>,
    name: Option<String>,
    #[serde(default)]
    data: Value,
    request_id: Option<u64>,
    reason: Option<String>,
    file_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MpvTrack {
    id: u64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    default: bool,
}

fn mpv_command(args: Value) -> String {
    json!({ "command": args }).to_string()
}

#[derive(Debug, Default)]
pub struct MpvProtocol {
    paused_for_cache: bool,
    cache_percent: u8,
    end: SessionEnd,
}

impl MpvProtocol {
    fn on_property(&mut self, name: &str, data: &Value) -> Vec<BackendSignal> {
        match name {
            "paused-for-cache" => {
                self.paused_for_cache = data.as_bool().unwrap_or(false);
                if self.paused_for_cache {
                    vec![BackendSignal::Buffering(self.cache_percent)]
                } else {
                    vec![BackendSignal::Buffering(100)]
                }
            }
            "cache-buffering-state" => {
                let Some(percent) = data.as_u64() else {
                    return Vec::new();
                };
                self.cache_percent = percent.min(100) as u8;
                if self.paused_for_cache {
                    vec![BackendSignal::Buffering(self.cache_percent)]
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }

    fn on_track_list(data: Value) -> Vec<BackendSignal> {
        let tracks: Vec<MpvTrack> = serde_json::from_value(data).unwrap_or_default();
        let mut signals: Vec<_> = tracks
            .into_iter()
            .filter_map(|t| {
                let kind = match t.kind.as_str() {
                    "video" => TrackKind::Video,
                    "audio" => TrackKind::Audio,
                    _ => TrackKind::Other,
                };
                let index = u32::try_from(t.id).ok()?;
                Some(BackendSignal::TrackDiscovered(Track::new(index, kind, t.default)))
            })
            .collect();
        signals.push(BackendSignal::NoMoreTracks);
        signals
    }
}

impl Protocol for MpvProtocol {
    fn handshake(&mut self) -> Vec<String> {
        vec![
            mpv_command(json!(["observe_property", OBSERVE_PAUSED_FOR_CACHE, "paused-for-cache"])),
            mpv_command(json!(["observe_property", OBSERVE_CACHE_STATE, "cache-buffering-state"])),
        ]
    }

    fn on_line(&mut self, line: &str) -> Reaction {
        let Ok(message) = serde_json::from_str::<MpvMessage>(line) else {
            return Reaction::default();
        };

        if message.request_id == Some(TRACK_LIST_REQUEST) {
            return Reaction {
                signals: Self::on_track_list(message.data),
                replies: Vec::new(),
            };
        }

        match message.event.as_deref() {
            Some("property-change") => Reaction {
                signals: message
                    .name
                    .as_deref()
                    .map(|name| self.on_property(name, &message.data))
                    .unwrap_or_default(),
                replies: Vec::new(),
            },
            Some("file-loaded") => Reaction {
                signals: Vec::new(),
                replies: vec![json!({
                    "command": ["get_property", "track-list"],
                    "request_id": TRACK_LIST_REQUEST,
                })
                .to_string()],
            },
            Some("end-file") => {
                match message.reason.as_deref() {
                    Some("eof") => self.end.finished = true,
                    other => {
                        self.end.reason = Some(message.file_error.unwrap_or_else(|| {
                            format!("playback ended ({})", other.unwrap_or("unknown"))
                        }))
                    }
                }
                Reaction::default()
            }
            _ => Reaction::default(),
        }
    }

    fn on_command(&mut self, command: &PlayerCommand) -> Option<String> {
        let args = match command {
            PlayerCommand::Pause(pause) => json!(["set_property", "pause", pause]),
            PlayerCommand::Fullscreen(on) => json!(["set_property", "fullscreen", on]),
            PlayerCommand::Link(track) => match track.kind {
                TrackKind::Video => json!(["set_property", "vid", track.index]),
                TrackKind::Audio => json!(["set_property", "aid", track.index]),
                TrackKind::Other => return None,
            },
        };
        Some(mpv_command(args))
    }

    fn end(&self) -> SessionEnd {
        self.end.clone()
    }
}

// =============================================================================
// VLC rc console
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VlcQuery {
    Time,
    Length,
}

/// VLC has no end-of-file event on rc; the position is polled and compared
/// with the length instead
#[derive(Debug, Default)]
pub struct VlcProtocol {
    pending: VecDeque<VlcQuery>,
    time: Option<u64>,
    length: Option<u64>,
    paused: bool,
}

impl Protocol for VlcProtocol {
    fn handshake(&mut self) -> Vec<String> {
        Vec::new()
    }

    fn on_line(&mut self, line: &str) -> Reaction {
        let value = line.trim().trim_start_matches('>').trim();
        if let Ok(seconds) = value.parse::<u64>() {
            match self.pending.pop_front() {
                Some(VlcQuery::Time) => self.time = Some(seconds),
                Some(VlcQuery::Length) => self.length = Some(seconds),
                None => {}
            }
        }
        Reaction::default()
    }

    fn on_command(&mut self, command: &PlayerCommand) -> Option<String> {
        match command {
            // rc's "pause" toggles
            PlayerCommand::Pause(true) if !self.paused => {
                self.paused = true;
                Some("pause".into())
            }
            PlayerCommand::Pause(false) if self.paused => {
                self.paused = false;
                Some("play".into())
            }
            PlayerCommand::Pause(_) => None,
            PlayerCommand::Fullscreen(on) => {
                Some(format!("fullscreen {}", if *on { "on" } else { "off" }))
            }
            PlayerCommand::Link(_) => None,
        }
    }

    fn poll(&mut self) -> Vec<String> {
        self.pending.push_back(VlcQuery::Time);
        let mut lines = vec!["get_time".to_string()];
        if self.length.unwrap_or(0) == 0 {
            self.pending.push_back(VlcQuery::Length);
            lines.push("get_length".into());
        }
        lines
    }

    fn end(&self) -> SessionEnd {
        match (self.time, self.length) {
            (Some(time), Some(length)) if length > 0 && time + VLC_END_TOLERANCE_SECS >= length => {
                SessionEnd {
                    finished: true,
                    reason: None,
                }
            }
            (time, length) => SessionEnd {
                finished: false,
                reason: Some(format!(
                    "stopped at {}s of {}s",
                    time.unwrap_or(0),
                    length.unwrap_or(0)
                )),
            },
        }
    }
}
