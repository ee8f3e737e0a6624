//! In-memory collaborators for the audio service
//!
//! Every fake appends to a shared [`EventLog`] so tests can assert the order
//! in which the radio client and the player were touched.

use async_trait::async_trait;
use hearth_audio::error::{Error, Result};
use hearth_audio::player::{EndReason, PlayerEvent, PlayerTransport, StreamResolver};
use hearth_audio::radio::{ProcessControl, RadioCommand, RadioPipe, SpawnSpec};
use nix::sys::signal::Signal;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Ordered record of side effects across fakes
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Index of the first entry equal to `entry`
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    /// Index of the last entry equal to `entry`
    pub fn last_position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().rposition(|e| e == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}

// ============================================================================
// Radio client
// ============================================================================

/// Process table holding only the radio client's PIDs
pub struct FakeProcesses {
    table: Mutex<Vec<u32>>,
    next_pid: AtomicU32,
    spawns: AtomicUsize,
    /// SIGTERM is ignored (client hung in a blocking read)
    pub ignore_term: AtomicBool,
    /// No signal removes the process
    pub unkillable: AtomicBool,
    /// Milliseconds each probe takes (a wedged `pgrep`)
    pub probe_delay_ms: AtomicU64,
    log: EventLog,
}

impl FakeProcesses {
    pub fn new(log: EventLog) -> Self {
        Self {
            table: Mutex::new(Vec::new()),
            next_pid: AtomicU32::new(4000),
            spawns: AtomicUsize::new(0),
            ignore_term: AtomicBool::new(false),
            unkillable: AtomicBool::new(false),
            probe_delay_ms: AtomicU64::new(0),
            log,
        }
    }

    /// A client started outside the service
    pub fn insert_running(&self, pid: u32) {
        self.table.lock().unwrap().push(pid);
    }

    /// The client exits on its own
    pub fn exit_all(&self) {
        self.table.lock().unwrap().clear();
    }

    pub fn pids(&self) -> Vec<u32> {
        self.table.lock().unwrap().clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    fn kill_all(&self) {
        if !self.unkillable.load(Ordering::SeqCst) {
            self.table.lock().unwrap().clear();
        }
    }
}

#[async_trait]
impl ProcessControl for FakeProcesses {
    async fn spawn(&self, _spec: &SpawnSpec) -> Result<Option<u32>> {
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.spawns.fetch_add(1, Ordering::SeqCst);
        self.table.lock().unwrap().push(pid);
        self.log.push("radio:spawn");
        Ok(Some(pid))
    }

    async fn probe(&self, _name: &str) -> Result<Vec<u32>> {
        let delay = self.probe_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(self.pids())
    }

    async fn signal_all(&self, _name: &str, signal: Signal) -> Result<()> {
        self.log.push(format!("radio:{}", signal.as_str()));
        if signal == Signal::SIGTERM && self.ignore_term.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.kill_all();
        Ok(())
    }

    async fn signal_pid(&self, pid: u32, signal: Signal) -> Result<()> {
        self.log.push(format!("radio:{}:{}", signal.as_str(), pid));
        let mut table = self.table.lock().unwrap();
        if !table.contains(&pid) {
            return Err(Error::ProcessNotFound(format!("pid {}", pid)));
        }
        if !self.unkillable.load(Ordering::SeqCst) {
            table.retain(|p| *p != pid);
        }
        Ok(())
    }
}

/// Control pipe recording every delivered command
pub struct FakePipe {
    processes: Arc<FakeProcesses>,
    commands: Mutex<Vec<RadioCommand>>,
    /// The client exits when it reads a quit command
    pub honor_quit: AtomicBool,
    log: EventLog,
}

impl FakePipe {
    pub fn new(processes: Arc<FakeProcesses>, log: EventLog) -> Self {
        Self {
            processes,
            commands: Mutex::new(Vec::new()),
            honor_quit: AtomicBool::new(true),
            log,
        }
    }

    pub fn commands(&self) -> Vec<RadioCommand> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl RadioPipe for FakePipe {
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, command: &RadioCommand) -> Result<()> {
        self.commands.lock().unwrap().push(*command);
        self.log.push(format!("radio:{}", command));
        if *command == RadioCommand::Quit && self.honor_quit.load(Ordering::SeqCst) {
            self.processes.kill_all();
        }
        Ok(())
    }
}

// ============================================================================
// On-demand player
// ============================================================================

/// Player IPC that answers requests with the events a real player would emit
pub struct FakeTransport {
    events: mpsc::UnboundedSender<PlayerEvent>,
    requests: Mutex<Vec<Vec<Value>>>,
    loaded: AtomicBool,
    /// Number of upcoming loads that fail with an end-file error
    pub fail_loads: AtomicUsize,
    log: EventLog,
}

impl FakeTransport {
    pub fn new(events: mpsc::UnboundedSender<PlayerEvent>, log: EventLog) -> Self {
        Self {
            events,
            requests: Mutex::new(Vec::new()),
            loaded: AtomicBool::new(false),
            fail_loads: AtomicUsize::new(0),
            log,
        }
    }

    /// The current file plays to its end
    pub fn finish_track(&self) {
        if self.loaded.swap(false, Ordering::SeqCst) {
            self.end_file(EndReason::Eof, None);
        }
    }

    /// Deliver a raw event as if the player sent it
    pub fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }

    pub fn requests(&self) -> Vec<Vec<Value>> {
        self.requests.lock().unwrap().clone()
    }

    /// Targets of every `loadfile` request, in order
    pub fn loaded_targets(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|r| r.first().and_then(Value::as_str) == Some("loadfile"))
            .filter_map(|r| r.get(1).and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    pub fn load_count(&self) -> usize {
        self.loaded_targets().len()
    }

    fn end_file(&self, reason: EndReason, file_error: Option<String>) {
        self.emit(PlayerEvent::EndFile { reason, file_error });
    }
}

#[async_trait]
impl PlayerTransport for FakeTransport {
    async fn request(&self, command: Vec<Value>) -> Result<Value> {
        self.requests.lock().unwrap().push(command.clone());

        match command.first().and_then(Value::as_str) {
            Some("loadfile") => {
                self.log.push("player:loadfile");
                if self.loaded.swap(false, Ordering::SeqCst) {
                    self.end_file(EndReason::Stop, None);
                }
                let failing = self
                    .fail_loads
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if failing {
                    self.end_file(EndReason::Error, Some("HTTP 403 Forbidden".to_string()));
                } else {
                    self.loaded.store(true, Ordering::SeqCst);
                    self.emit(PlayerEvent::FileLoaded);
                }
            }
            Some("stop") => {
                self.log.push("player:stop");
                if self.loaded.swap(false, Ordering::SeqCst) {
                    self.end_file(EndReason::Stop, None);
                }
            }
            _ => {}
        }
        Ok(Value::Null)
    }

    async fn shutdown(&self) -> Result<()> {
        self.log.push("player:shutdown");
        if self.loaded.swap(false, Ordering::SeqCst) {
            self.end_file(EndReason::Quit, None);
        }
        Ok(())
    }
}

/// Resolver handing out a distinct URL per call
#[derive(Default)]
pub struct FakeResolver {
    resolves: AtomicUsize,
}

impl FakeResolver {
    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamResolver for FakeResolver {
    async fn resolve(&self, id: &str) -> Result<String> {
        let n = self.resolves.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://stream.test/{}?sig={}", id, n))
    }

    async fn download(&self, _id: &str, dir: &Path, stem: &str) -> Result<PathBuf> {
        let target = dir.join(format!("{}.m4a", stem));
        tokio::fs::write(&target, b"downloaded audio").await?;
        Ok(target)
    }
}
