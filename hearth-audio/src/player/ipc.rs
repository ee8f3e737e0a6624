//! Player process and IPC session
//!
//! [`MpvSession`] owns one long-lived player instance, launched idle and
//! audio-only with an IPC socket. A writer task serializes outgoing lines; a
//! reader task routes replies to waiting requests by `request_id` and forwards
//! events to the controller's channel.
//!
//! When the connection drops, the next request reconnects (relaunching the
//! player if needed) and re-subscribes to the observed properties.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PlayerConfig;
use crate::error::{Error, Result};
use crate::player::events::{encode_request, parse_line, Incoming, PlayerEvent, OBSERVED_PROPERTIES};

/// Delay between connection attempts while the player starts up
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Request/response channel to the player
#[async_trait]
pub trait PlayerTransport: Send + Sync {
    /// Send one command and return the reply's `data`
    async fn request(&self, command: Vec<Value>) -> Result<Value>;

    /// Terminate the player instance
    async fn shutdown(&self) -> Result<()>;
}

/// Launch and timing parameters for the player
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub binary: PathBuf,
    pub args: Vec<String>,
    pub socket_path: PathBuf,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub initial_volume: u8,
}

impl SessionSettings {
    pub fn from_config(config: &PlayerConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            args: config.args.clone(),
            socket_path: config.socket_path.clone(),
            request_timeout: config.request_timeout(),
            connect_timeout: config.connect_timeout(),
            initial_volume: config.initial_volume.min(100),
        }
    }
}

type PendingReplies = Arc<std::sync::Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

#[derive(Debug)]
struct Reply {
    error: String,
    data: Value,
}

/// Live IPC connection
struct Connection {
    lines: mpsc::UnboundedSender<String>,
    pending: PendingReplies,
    alive: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.lines.is_closed()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Player instance plus its IPC connection
pub struct MpvSession {
    settings: SessionSettings,
    events: mpsc::UnboundedSender<PlayerEvent>,
    connection: Mutex<Option<Connection>>,
    child: Mutex<Option<Child>>,
    next_request_id: AtomicU64,
}

impl MpvSession {
    /// Create a session; nothing is launched until the first request
    pub fn new(settings: SessionSettings, events: mpsc::UnboundedSender<PlayerEvent>) -> Self {
        Self {
            settings,
            events,
            connection: Mutex::new(None),
            child: Mutex::new(None),
            // Ids below 100 are reserved for property observation
            next_request_id: AtomicU64::new(100),
        }
    }

    /// Writer and reply map of a live connection, connecting if necessary
    async fn channel(&self) -> Result<(mpsc::UnboundedSender<String>, PendingReplies)> {
        let mut guard = self.connection.lock().await;

        if let Some(conn) = guard.as_ref() {
            if conn.is_alive() {
                return Ok((conn.lines.clone(), Arc::clone(&conn.pending)));
            }
            warn!("Player IPC connection lost, reconnecting");
        }
        *guard = None;

        let stream = match self.attach_running().await {
            Some(stream) => stream,
            None => {
                self.launch().await?;
                self.connect_with_retry().await?
            }
        };

        let conn = self.attach(stream);
        let handles = (conn.lines.clone(), Arc::clone(&conn.pending));

        for (id, name) in OBSERVED_PROPERTIES {
            let line = encode_request(id, &[json!("observe_property"), json!(id), json!(name)]);
            if conn.lines.send(line).is_err() {
                return Err(Error::Player("IPC writer closed during setup".to_string()));
            }
        }
        let volume = encode_request(
            self.next_id(),
            &[json!("set_property"), json!("volume"), json!(self.settings.initial_volume)],
        );
        let _ = conn.lines.send(volume);

        *guard = Some(conn);
        Ok(handles)
    }

    /// Connect to an already running player, bounded by the connect timeout
    async fn attach_running(&self) -> Option<UnixStream> {
        let path = &self.settings.socket_path;
        match tokio::time::timeout(self.settings.connect_timeout, UnixStream::connect(path)).await
        {
            Ok(Ok(stream)) => {
                debug!("Attached to running player at {}", path.display());
                Some(stream)
            }
            Ok(Err(e)) => {
                debug!("No player listening at {}: {}", path.display(), e);
                None
            }
            Err(_) => {
                warn!(
                    "Player socket {} did not accept within {:?}",
                    path.display(),
                    self.settings.connect_timeout
                );
                None
            }
        }
    }

    /// Spawn the player process idle with an IPC socket
    async fn launch(&self) -> Result<()> {
        let mut child_guard = self.child.lock().await;

        if let Some(child) = child_guard.as_mut() {
            match child.try_wait() {
                Ok(None) => {
                    // Alive but its socket refused us; replace it
                    warn!("Player process unresponsive on IPC socket, restarting it");
                    let _ = child.kill().await;
                }
                Ok(Some(status)) => info!("Player process exited ({}), relaunching", status),
                Err(e) => warn!("Failed to query player process: {}", e),
            }
        }
        *child_guard = None;

        match tokio::fs::remove_file(&self.settings.socket_path).await {
            Ok(()) => debug!("Removed stale player socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(parent) = self.settings.socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut command = Command::new(&self.settings.binary);
        command
            .arg("--idle=yes")
            .arg("--no-video")
            .arg("--no-terminal")
            .arg(format!(
                "--input-ipc-server={}",
                self.settings.socket_path.display()
            ))
            .args(&self.settings.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| {
            Error::Player(format!(
                "failed to launch {}: {}",
                self.settings.binary.display(),
                e
            ))
        })?;
        info!(
            "Launched player {} (pid {:?})",
            self.settings.binary.display(),
            child.id()
        );
        *child_guard = Some(child);
        Ok(())
    }

    async fn connect_with_retry(&self) -> Result<UnixStream> {
        let path = &self.settings.socket_path;
        let attempt = async {
            loop {
                match UnixStream::connect(path).await {
                    Ok(stream) => return stream,
                    Err(_) => tokio::time::sleep(CONNECT_RETRY_INTERVAL).await,
                }
            }
        };

        tokio::time::timeout(self.settings.connect_timeout, attempt)
            .await
            .map_err(|_| Error::timeout("player IPC connect", self.settings.connect_timeout))
    }

    /// Start reader and writer tasks for a fresh stream
    fn attach(&self, stream: UnixStream) -> Connection {
        let (read_half, mut write_half) = stream.into_split();
        let (lines_tx, mut lines_rx) = mpsc::unbounded_channel::<String>();
        let pending: PendingReplies = Arc::new(std::sync::Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let writer_alive = Arc::clone(&alive);
        let writer = tokio::spawn(async move {
            while let Some(line) = lines_rx.recv().await {
                if let Err(e) = write_half.write_all(line.as_bytes()).await {
                    warn!("Player IPC write failed: {}", e);
                    break;
                }
            }
            writer_alive.store(false, Ordering::SeqCst);
        });

        let reader_pending = Arc::clone(&pending);
        let reader_alive = Arc::clone(&alive);
        let events = self.events.clone();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match parse_line(&line) {
                        Some(Incoming::Reply {
                            request_id,
                            error,
                            data,
                        }) => {
                            let waiter = reader_pending
                                .lock()
                                .ok()
                                .and_then(|mut pending| pending.remove(&request_id));
                            if let Some(waiter) = waiter {
                                let _ = waiter.send(Reply { error, data });
                            }
                        }
                        Some(Incoming::Event(event)) => {
                            debug!("Player event: {:?}", event);
                            let _ = events.send(event);
                        }
                        Some(Incoming::Ignored) => {}
                        None => debug!("Unparseable player IPC line: {}", line),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Player IPC read failed: {}", e);
                        break;
                    }
                }
            }

            reader_alive.store(false, Ordering::SeqCst);
            // Dropping the senders fails every in-flight request
            if let Ok(mut pending) = reader_pending.lock() {
                pending.clear();
            }
            info!("Player IPC connection closed");
            let _ = events.send(PlayerEvent::Disconnected);
        });

        Connection {
            lines: lines_tx,
            pending,
            alive,
            tasks: vec![writer, reader],
        }
    }

    fn next_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl PlayerTransport for MpvSession {
    async fn request(&self, command: Vec<Value>) -> Result<Value> {
        let name = command
            .first()
            .and_then(Value::as_str)
            .unwrap_or("?")
            .to_string();
        let (lines, pending) = self.channel().await?;

        let request_id = self.next_id();
        let (tx, rx) = oneshot::channel();
        pending
            .lock()
            .map_err(|_| Error::Internal("player reply map poisoned".to_string()))?
            .insert(request_id, tx);

        if lines.send(encode_request(request_id, &command)).is_err() {
            if let Ok(mut pending) = pending.lock() {
                pending.remove(&request_id);
            }
            return Err(Error::Player(format!("IPC connection closed before '{}'", name)));
        }

        let reply = match tokio::time::timeout(self.settings.request_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => {
                return Err(Error::Player(format!(
                    "IPC connection closed awaiting '{}'",
                    name
                )))
            }
            Err(_) => {
                if let Ok(mut pending) = pending.lock() {
                    pending.remove(&request_id);
                }
                return Err(Error::timeout(
                    format!("player request '{}'", name),
                    self.settings.request_timeout,
                ));
            }
        };

        if reply.error != "success" {
            return Err(Error::Player(format!("'{}' failed: {}", name, reply.error)));
        }
        debug!("Player request '{}' ok", name);
        Ok(reply.data)
    }

    async fn shutdown(&self) -> Result<()> {
        let connected = self
            .connection
            .lock()
            .await
            .as_ref()
            .map(Connection::is_alive)
            .unwrap_or(false);
        if connected {
            if let Err(e) = self.request(vec![json!("quit")]).await {
                debug!("Player quit request failed: {}", e);
            }
        }
        *self.connection.lock().await = None;

        if let Some(mut child) = self.child.lock().await.take() {
            let exited = tokio::time::timeout(self.settings.request_timeout, child.wait()).await;
            if !matches!(exited, Ok(Ok(_))) {
                warn!("Player did not exit after quit, killing it");
                child.kill().await?;
            }
        }

        info!("Player session shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    fn settings(socket_path: PathBuf) -> SessionSettings {
        SessionSettings {
            binary: PathBuf::from("/nonexistent/player-binary"),
            args: Vec::new(),
            socket_path,
            request_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_millis(300),
            initial_volume: 80,
        }
    }

    /// Minimal IPC peer: answers every request with success and echoes
    /// `loadfile` as a file-loaded event
    async fn serve_one(listener: UnixListener) {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let value: Value = serde_json::from_str(&line).unwrap();
            let id = value["request_id"].as_u64().unwrap();
            let reply = json!({"request_id": id, "error": "success", "data": null});
            write_half
                .write_all(format!("{}\n", reply).as_bytes())
                .await
                .unwrap();
            if value["command"][0] == "loadfile" {
                write_half
                    .write_all(b"{\"event\":\"file-loaded\"}\n")
                    .await
                    .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_request_round_trip_and_events() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("player.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        tokio::spawn(serve_one(listener));

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let session = MpvSession::new(settings(socket), events_tx);

        session
            .request(vec![json!("loadfile"), json!("/music/a.mp3"), json!("replace")])
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), events_rx.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(PlayerEvent::FileLoaded));
    }

    #[tokio::test]
    async fn test_attach_running_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("player.sock");
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let session = MpvSession::new(settings(socket.clone()), events_tx);

        let started = tokio::time::Instant::now();
        assert!(session.attach_running().await.is_none());
        assert!(started.elapsed() <= session.settings.connect_timeout);

        let _listener = UnixListener::bind(&socket).unwrap();
        assert!(session.attach_running().await.is_some());
    }

    #[tokio::test]
    async fn test_unreachable_player_fails_to_launch() {
        let dir = tempfile::tempdir().unwrap();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let session = MpvSession::new(settings(dir.path().join("player.sock")), events_tx);

        let result = session.request(vec![json!("get_property"), json!("volume")]).await;
        assert!(matches!(result, Err(Error::Player(_))));
    }

    #[tokio::test]
    async fn test_error_reply_is_player_error() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("player.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let value: Value = serde_json::from_str(&line).unwrap();
                let id = value["request_id"].as_u64().unwrap();
                let reply = json!({"request_id": id, "error": "property not found"});
                write_half
                    .write_all(format!("{}\n", reply).as_bytes())
                    .await
                    .unwrap();
            }
        });

        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let session = MpvSession::new(settings(socket), events_tx);
        let result = session.request(vec![json!("get_property"), json!("bogus")]).await;
        assert!(matches!(result, Err(Error::Player(msg)) if msg.contains("property not found")));
    }
}
