/// MPD protocol driver with separated reader/writer tasks.
///
/// Architecture:
///
/// ```text
///   MpdHandle::connect()
///         │
///         ├── writer_task   ← receives PendingRequest via mpsc, queues the
///         │                   reply slot, then writes the command line
///         └── reader_task   ← reads `key: value` lines up to OK / ACK
///                                └── completes the oldest queued reply slot
/// ```
///
/// MPD answers strictly in order, so replies are matched FIFO rather than by
/// id.  `MpdClient` wraps a handle with lazy (re)connection and the command
/// helpers the library and streaming operai use.  The monitor task holds its
/// own connection because `idle` blocks it.
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opuscule_proto::metadata::Metadata;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::core::DaemonEvent;
use crate::playback::Mixer;

pub const SOURCE: &str = "mpd";

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum MpdError {
    #[error("MPD refused {command}: {message}")]
    Ack { command: String, message: String },
    #[error("unexpected MPD greeting: {0:?}")]
    Greeting(String),
    #[error("MPD connection closed")]
    Closed,
    #[error("MPD timeout waiting for {0}")]
    Timeout(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// `key: value` pairs of one response, in the order MPD sent them.
pub type Reply = Vec<(String, String)>;

type ReplySlot = oneshot::Sender<Result<Reply, MpdError>>;

// ── internal channel types ────────────────────────────────────────────────────

struct PendingRequest {
    payload: String, // command line, already has '\n'
    reply: ReplySlot,
}

// ── public handle ─────────────────────────────────────────────────────────────

/// Cloneable handle to one MPD connection.
#[derive(Clone)]
pub struct MpdHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpdHandle {
    pub async fn connect(address: &str) -> Result<Self, MpdError> {
        let stream = TcpStream::connect(address).await?;
        let (read_half, write_half) = stream.into_split();
        Self::start(read_half, write_half).await
    }

    /// Read the greeting and start the io tasks over an arbitrary stream.
    pub async fn start<R, W>(read_half: R, write_half: W) -> Result<Self, MpdError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut reader = BufReader::new(read_half);
        let mut greeting = String::new();
        reader.read_line(&mut greeting).await?;
        let greeting = greeting.trim_end();
        if !greeting.starts_with("OK MPD") {
            return Err(MpdError::Greeting(greeting.to_string()));
        }
        debug!("mpd: connected, {}", greeting);

        let queue: Arc<Mutex<VecDeque<ReplySlot>>> = Arc::new(Mutex::new(VecDeque::new()));
        let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

        tokio::spawn(writer_task(write_half, cmd_rx, queue.clone()));
        tokio::spawn(reader_task(reader, queue));

        Ok(Self { tx: cmd_tx })
    }

    /// Send a command line and wait for its reply.  `timeout` of `None`
    /// waits forever (for `idle`).
    pub async fn send(&self, line: &str, timeout: Option<Duration>) -> Result<Reply, MpdError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                payload: format!("{}\n", line),
                reply: reply_tx,
            })
            .await
            .map_err(|_| MpdError::Closed)?;

        let reply = match timeout {
            Some(limit) => tokio::time::timeout(limit, reply_rx)
                .await
                .map_err(|_| MpdError::Timeout(command_name(line).to_string()))?,
            None => reply_rx.await,
        };
        reply.map_err(|_| MpdError::Closed)?
    }
}

fn command_name(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or(line)
}

/// Quote an argument for the MPD command line.
pub fn quote(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn command_line(command: &str, args: &[&str]) -> String {
    let mut line = command.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&quote(arg));
    }
    line
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(mut reader: BufReader<R>, queue: Arc<Mutex<VecDeque<ReplySlot>>>)
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    let mut fields = Reply::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpd reader: connection closed");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim_end_matches(['\r', '\n']);
                if trimmed == "OK" {
                    let reply = std::mem::take(&mut fields);
                    if let Some(slot) = queue.lock().await.pop_front() {
                        let _ = slot.send(Ok(reply));
                    }
                } else if let Some(ack) = trimmed.strip_prefix("ACK ") {
                    fields.clear();
                    let (command, message) = parse_ack(ack);
                    debug!("mpd reader: ACK {} {}", command, message);
                    if let Some(slot) = queue.lock().await.pop_front() {
                        let _ = slot.send(Err(MpdError::Ack { command, message }));
                    }
                } else if let Some((key, value)) = trimmed.split_once(": ") {
                    fields.push((key.to_string(), value.to_string()));
                } else {
                    debug!("mpd reader: ignoring line {:?}", trimmed);
                }
            }
            Err(e) => {
                warn!("mpd reader: read error: {}", e);
                break;
            }
        }
    }
    // fail whatever is still waiting
    for slot in queue.lock().await.drain(..) {
        let _ = slot.send(Err(MpdError::Closed));
    }
}

/// `[50@0] {play} song doesn't exist: "10"` → ("play", "song doesn't exist: \"10\"")
fn parse_ack(ack: &str) -> (String, String) {
    let rest = ack.split_once("] ").map(|(_, r)| r).unwrap_or(ack);
    match rest.strip_prefix('{').and_then(|r| r.split_once("} ")) {
        Some((command, message)) => (command.to_string(), message.to_string()),
        None => (String::new(), rest.to_string()),
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<PendingRequest>,
    queue: Arc<Mutex<VecDeque<ReplySlot>>>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Queue the reply slot before writing so the reader can match it
        queue.lock().await.push_back(req.reply);
        debug!("mpd writer: {}", req.payload.trim_end());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpd writer: write error: {}", e);
            if let Some(slot) = queue.lock().await.pop_back() {
                let _ = slot.send(Err(MpdError::Io(e)));
            }
            break;
        }
    }
    debug!("mpd writer: task exiting");
}

// ── client ────────────────────────────────────────────────────────────────────

/// Shared MPD client.  Connects on first use and again after the
/// connection drops.
pub struct MpdClient {
    address: String,
    handle: Mutex<Option<MpdHandle>>,
}

impl MpdClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            address: format!("{}:{}", host, port),
            handle: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn handle(&self) -> Result<MpdHandle, MpdError> {
        let mut guard = self.handle.lock().await;
        if let Some(handle) = guard.as_ref() {
            return Ok(handle.clone());
        }
        let handle = MpdHandle::connect(&self.address).await?;
        info!("mpd: connected to {}", self.address);
        *guard = Some(handle.clone());
        Ok(handle)
    }

    pub async fn command(&self, command: &str, args: &[&str]) -> anyhow::Result<Reply> {
        let line = command_line(command, args);
        let handle = self.handle().await?;
        match handle.send(&line, Some(REPLY_TIMEOUT)).await {
            Err(e @ (MpdError::Closed | MpdError::Io(_) | MpdError::Timeout(_))) => {
                // drop the connection so the next call reconnects
                *self.handle.lock().await = None;
                Err(e.into())
            }
            other => Ok(other?),
        }
    }

    /// Check MPD is reachable and put it in the state the daemon expects.
    pub async fn prepare(&self) -> anyhow::Result<()> {
        self.command("ping", &[]).await?;
        self.consume(false).await?;
        self.clear().await
    }

    pub async fn clear(&self) -> anyhow::Result<()> {
        self.command("clear", &[]).await.map(drop)
    }

    pub async fn add(&self, uri: &str) -> anyhow::Result<()> {
        self.command("add", &[uri]).await.map(drop)
    }

    pub async fn load(&self, playlist: &str) -> anyhow::Result<()> {
        self.command("load", &[playlist]).await.map(drop)
    }

    /// `findadd` with tag/value pairs.
    pub async fn findadd(&self, terms: &[(String, String)]) -> anyhow::Result<()> {
        let args: Vec<&str> = terms
            .iter()
            .flat_map(|(tag, value)| [tag.as_str(), value.as_str()])
            .collect();
        self.command("findadd", &args).await.map(drop)
    }

    pub async fn play(&self) -> anyhow::Result<()> {
        self.command("play", &[]).await.map(drop)
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.command("stop", &[]).await.map(drop)
    }

    pub async fn pause(&self, paused: bool) -> anyhow::Result<()> {
        self.command("pause", &[flag(paused)]).await.map(drop)
    }

    pub async fn next(&self) -> anyhow::Result<()> {
        self.command("next", &[]).await.map(drop)
    }

    pub async fn previous(&self) -> anyhow::Result<()> {
        self.command("previous", &[]).await.map(drop)
    }

    pub async fn seekcur(&self, secs: u32) -> anyhow::Result<()> {
        self.command("seekcur", &[&secs.to_string()]).await.map(drop)
    }

    pub async fn random(&self, on: bool) -> anyhow::Result<()> {
        self.command("random", &[flag(on)]).await.map(drop)
    }

    pub async fn repeat(&self, on: bool) -> anyhow::Result<()> {
        self.command("repeat", &[flag(on)]).await.map(drop)
    }

    pub async fn consume(&self, on: bool) -> anyhow::Result<()> {
        self.command("consume", &[flag(on)]).await.map(drop)
    }

    pub async fn setvol(&self, level: u8) -> anyhow::Result<()> {
        self.command("setvol", &[&level.min(100).to_string()]).await.map(drop)
    }

    pub async fn status(&self) -> anyhow::Result<Metadata> {
        Ok(self.command("status", &[]).await?.into_iter().collect())
    }

    pub async fn listplaylists(&self) -> anyhow::Result<Vec<String>> {
        Ok(values_of(self.command("listplaylists", &[]).await?, "playlist"))
    }

    /// Distinct values of `tag`, optionally narrowed by tag/value pairs.
    pub async fn list(&self, tag: &str, filters: &[(&str, &str)]) -> anyhow::Result<Vec<String>> {
        let mut args = vec![tag];
        for &(key, value) in filters {
            args.push(key);
            args.push(value);
        }
        let reply = self.command("list", &args).await?;
        let mut values = values_of(reply, tag);
        values.retain(|v| !v.is_empty());
        Ok(values)
    }
}

fn flag(on: bool) -> &'static str {
    if on {
        "1"
    } else {
        "0"
    }
}

fn values_of(reply: Reply, key: &str) -> Vec<String> {
    reply
        .into_iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
        .collect()
}

/// `currentsong` fields with lowercased keys, matching the now-playing set.
fn song_record(reply: Reply) -> Metadata {
    reply
        .into_iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v))
        .collect()
}

#[async_trait]
impl Mixer for MpdClient {
    async fn set_volume(&self, level: u8) -> anyhow::Result<()> {
        self.setvol(level).await
    }
}

// ── monitor ───────────────────────────────────────────────────────────────────

/// Watch the player subsystem and report what MPD does on its own.
///
/// After every `idle player` wake-up the current song goes to the core as
/// `BackendMetadata`.  A transition from `play` to `stop` that is still in
/// place a moment later is reported as `BackendStopped`.
pub async fn run_monitor(address: String, events: mpsc::UnboundedSender<DaemonEvent>) {
    let mut last_state = String::new();
    loop {
        let handle = match MpdHandle::connect(&address).await {
            Ok(handle) => handle,
            Err(e) => {
                debug!("mpd monitor: connect failed: {}", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };
        info!("mpd monitor: watching {}", address);

        loop {
            if let Err(e) = handle.send("idle player", None).await {
                warn!("mpd monitor: idle failed: {}", e);
                break;
            }
            let state = match player_state(&handle).await {
                Ok(state) => state,
                Err(e) => {
                    warn!("mpd monitor: status failed: {}", e);
                    break;
                }
            };

            if let Ok(song) = handle.send("currentsong", Some(REPLY_TIMEOUT)).await {
                let event = DaemonEvent::BackendMetadata {
                    source: SOURCE,
                    record: song_record(song),
                };
                if events.send(event).is_err() {
                    return;
                }
            }

            if last_state == "play" && state == "stop" {
                // a stop/play pair from the daemon itself passes through here
                tokio::time::sleep(Duration::from_millis(300)).await;
                if matches!(player_state(&handle).await.as_deref(), Ok("stop"))
                    && events.send(DaemonEvent::BackendStopped { source: SOURCE }).is_err()
                {
                    return;
                }
            }
            last_state = state;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

async fn player_state(handle: &MpdHandle) -> Result<String, MpdError> {
    let status = handle.send("status", Some(REPLY_TIMEOUT)).await?;
    Ok(status
        .into_iter()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

    /// Fake MPD over an in-memory pipe.  Answers each command line from
    /// `script` in order and returns the lines it received.
    async fn fake_server(
        script: Vec<&'static str>,
    ) -> (MpdHandle, tokio::task::JoinHandle<Vec<String>>) {
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, mut server_write) = tokio::io::split(server);
        let task = tokio::spawn(async move {
            server_write.write_all(b"OK MPD 0.23.5\n").await.unwrap();
            let mut lines = BufReader::new(server_read).lines();
            let mut received = Vec::new();
            for answer in script {
                let Some(line) = lines.next_line().await.unwrap() else {
                    break;
                };
                received.push(line);
                server_write.write_all(answer.as_bytes()).await.unwrap();
            }
            received
        });
        let (client_read, client_write) = tokio::io::split(client);
        let handle = MpdHandle::start(client_read, client_write).await.unwrap();
        (handle, task)
    }

    #[tokio::test]
    async fn test_replies_are_matched_in_order() {
        let (handle, server) = fake_server(vec![
            "volume: 80\nstate: play\nOK\n",
            "ACK [50@0] {load} No such playlist\n",
            "OK\n",
        ])
        .await;

        let status = handle.send("status", Some(REPLY_TIMEOUT)).await.unwrap();
        assert_eq!(status[1], ("state".to_string(), "play".to_string()));

        match handle.send("load \"nope\"", Some(REPLY_TIMEOUT)).await {
            Err(MpdError::Ack { command, message }) => {
                assert_eq!(command, "load");
                assert_eq!(message, "No such playlist");
            }
            other => panic!("expected ACK, got {:?}", other),
        }

        assert!(handle.send("play", Some(REPLY_TIMEOUT)).await.unwrap().is_empty());
        assert_eq!(server.await.unwrap(), vec!["status", "load \"nope\"", "play"]);
    }

    #[tokio::test]
    async fn test_closed_connection_fails_pending() {
        let (handle, server) = fake_server(vec![]).await;
        server.await.unwrap();
        assert!(handle.send("status", Some(REPLY_TIMEOUT)).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_non_mpd_greeting() {
        let (client, mut server) = tokio::io::duplex(256);
        server.write_all(b"HTTP/1.1 400 Bad Request\n").await.unwrap();
        let (read, write) = tokio::io::split(client);
        assert!(matches!(
            MpdHandle::start(read, write).await,
            Err(MpdError::Greeting(_))
        ));
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote("Kind of Blue"), "\"Kind of Blue\"");
        assert_eq!(quote(r#"12" Mix \ B"#), r#""12\" Mix \\ B""#);
        assert_eq!(
            command_line("findadd", &["artist", "Miles Davis"]),
            "findadd \"artist\" \"Miles Davis\""
        );
    }

    #[test]
    fn test_song_record_lowercases_keys() {
        let record = song_record(vec![
            ("Title".to_string(), "So What".to_string()),
            ("Last-Modified".to_string(), "2020-01-01".to_string()),
        ]);
        assert_eq!(record.get("title").map(String::as_str), Some("So What"));
        assert!(record.contains_key("last-modified"));
    }

    #[test]
    fn test_values_of_and_ack_parsing() {
        let reply = vec![
            ("playlist".to_string(), "Morning".to_string()),
            ("Last-Modified".to_string(), "x".to_string()),
            ("playlist".to_string(), "Evening".to_string()),
        ];
        assert_eq!(values_of(reply, "playlist"), vec!["Morning", "Evening"]);
        assert_eq!(
            parse_ack("[2@0] {setvol} Invalid volume value"),
            ("setvol".to_string(), "Invalid volume value".to_string())
        );
    }
}
