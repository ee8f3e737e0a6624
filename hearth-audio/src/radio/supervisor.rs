//! Radio client process supervisor
//!
//! Owns the lifecycle of the radio client OS process: start (or adopt), verify
//! against the process table, escalate from a graceful quit to per-PID kills on
//! stop, and deliver commands through the [`RadioPipe`].
//!
//! **State machine:** `Unknown -> Stopped -> Starting -> Running -> Stopping -> Stopped`.
//! A lifecycle mutex serializes every mutating operation, so a start issued
//! while a stop is escalating waits for the stop to finish. Status reads come
//! from a `watch` channel and never take the lifecycle lock.
//!
//! Cached belief is only corrected from explicit operations (start, stop,
//! command, reconcile); reading the status never probes.

use async_trait::async_trait;
use hearth_common::events::{PlaybackSource, PlaybackStateSnapshot, Track};
use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::broker::SourceOwner;
use crate::config::RadioConfig;
use crate::error::{Error, Result};
use crate::radio::command::RadioCommand;
use crate::radio::event::{RadioEvent, RadioEventKind};
use crate::radio::fifo::RadioPipe;
use crate::radio::process::{ProcessControl, SpawnSpec};
use crate::radio::status_file::{CachedStatus, StatusFile};

/// Lifecycle state of the radio client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadioState {
    /// No belief yet (fresh start without a status file)
    Unknown,
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Published radio status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioStatus {
    pub state: RadioState,
    #[serde(flatten)]
    pub cached: CachedStatus,
    /// Last song reported by the client's event hook
    pub now_playing: Option<Track>,
    pub station: Option<String>,
}

impl RadioStatus {
    fn initial() -> Self {
        Self {
            state: RadioState::Unknown,
            cached: CachedStatus::default(),
            now_playing: None,
            station: None,
        }
    }

    /// Source-tagged snapshot for observers
    pub fn snapshot(&self) -> PlaybackStateSnapshot {
        let mut snapshot = PlaybackStateSnapshot::idle(PlaybackSource::Radio);
        snapshot.is_running = self.cached.running;
        snapshot.is_playing = self.cached.running && self.cached.playing;
        if self.cached.running {
            snapshot.duration_secs = self
                .now_playing
                .as_ref()
                .and_then(|t| t.duration_secs)
                .unwrap_or(0.0);
            snapshot.current_track = self.now_playing.clone();
        }
        snapshot
    }
}

/// Result of `start()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StartReport {
    /// A new process was launched
    Spawned { pid: Option<u32> },
    /// Matching processes already existed and were adopted
    AlreadyRunning { pids: Vec<u32> },
}

/// Escalation steps of `stop()`, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopStep {
    GracefulQuit,
    Terminate,
    KillAll,
    KillEach,
}

impl StopStep {
    pub const ESCALATION: [StopStep; 4] = [
        StopStep::GracefulQuit,
        StopStep::Terminate,
        StopStep::KillAll,
        StopStep::KillEach,
    ];
}

/// Result of `stop()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StopReport {
    /// Nothing matched the process name
    AlreadyStopped,
    /// The process table was empty after `step`
    Stopped { step: StopStep },
    /// Escalation exhausted or hit the ceiling with processes still present
    Forced { lingering: Vec<u32> },
}

/// Result of `send()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    /// The write to the pipe completed
    Delivered,
    /// The client process is not running; nothing was written
    NotRunning,
}

/// Supervisor timing and launch parameters
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub spawn: SpawnSpec,
    pub process_name: String,
    pub probe_timeout: Duration,
    pub step_wait: Duration,
    pub stop_ceiling: Duration,
}

impl SupervisorSettings {
    pub fn from_config(config: &RadioConfig) -> Self {
        Self {
            spawn: SpawnSpec {
                binary: config.binary.clone(),
                args: config.args.clone(),
                log_file: config.log_file.clone(),
            },
            process_name: config.process_name.clone(),
            probe_timeout: config.probe_timeout(),
            step_wait: config.step_wait(),
            stop_ceiling: config.stop_ceiling(),
        }
    }
}

/// Radio client lifecycle owner
pub struct RadioSupervisor {
    settings: SupervisorSettings,
    processes: Arc<dyn ProcessControl>,
    pipe: Arc<dyn RadioPipe>,
    status_file: StatusFile,
    /// Serializes start/stop/reconcile/send
    lifecycle: Mutex<()>,
    status: watch::Sender<RadioStatus>,
}

impl RadioSupervisor {
    pub fn new(
        settings: SupervisorSettings,
        processes: Arc<dyn ProcessControl>,
        pipe: Arc<dyn RadioPipe>,
        status_file: StatusFile,
    ) -> Self {
        let (status, _) = watch::channel(RadioStatus::initial());
        Self {
            settings,
            processes,
            pipe,
            status_file,
            lifecycle: Mutex::new(()),
            status,
        }
    }

    /// Last published status (no side effects)
    pub fn status(&self) -> RadioStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RadioStatus> {
        self.status.subscribe()
    }

    /// Seed belief from the status file written by a previous run
    ///
    /// The seeded belief is not verified here; the next explicit operation
    /// reconciles it.
    pub async fn restore(&self) {
        let _guard = self.lifecycle.lock().await;
        match self.status_file.load().await {
            Some(cached) => {
                let state = if cached.running {
                    RadioState::Running
                } else {
                    RadioState::Stopped
                };
                info!(
                    "Restored radio status from {}: {:?} (pid {:?})",
                    self.status_file.path().display(),
                    state,
                    cached.pid
                );
                self.status.send_modify(|status| {
                    status.state = state;
                    status.cached = cached;
                });
            }
            None => debug!("No stored radio status, belief is Unknown"),
        }
    }

    /// Start the client, or adopt one that is already running
    pub async fn start(&self) -> Result<StartReport> {
        let _guard = self.lifecycle.lock().await;

        let pids = self.probe().await?;
        if !pids.is_empty() {
            info!("Radio client already running ({:?}), adopting", pids);
            let now = chrono::Utc::now();
            self.transition(|status| {
                if !status.cached.running {
                    status.cached.playing = true;
                }
                status.state = RadioState::Running;
                status.cached.running = true;
                status.cached.pid = pids.first().copied();
                status.cached.last_verified = Some(now);
            })
            .await;
            return Ok(StartReport::AlreadyRunning { pids });
        }

        self.set_state(RadioState::Starting);

        if let Err(e) = self.pipe.prepare().await {
            // The client can still run; commands will fail until the pipe exists
            warn!("Failed to prepare radio command pipe: {}", e);
        }

        let spawned = tokio::time::timeout(
            self.settings.probe_timeout,
            self.processes.spawn(&self.settings.spawn),
        )
        .await
        .unwrap_or_else(|_| {
            Err(Error::timeout(
                format!("spawn {}", self.settings.spawn.binary.display()),
                self.settings.probe_timeout,
            ))
        });

        match spawned {
            Ok(pid) => {
                let now = chrono::Utc::now();
                self.transition(|status| {
                    status.state = RadioState::Running;
                    status.cached.running = true;
                    status.cached.playing = true;
                    status.cached.pid = pid;
                    status.cached.last_write = Some(now);
                })
                .await;
                info!("Radio client started (pid {:?})", pid);
                Ok(StartReport::Spawned { pid })
            }
            Err(e) => {
                warn!("Failed to start radio client: {}", e);
                self.transition(|status| {
                    status.state = RadioState::Stopped;
                    status.cached = status.cached.stopped();
                })
                .await;
                Err(e)
            }
        }
    }

    /// Stop the client, escalating until the process table is clear
    pub async fn stop(&self) -> Result<StopReport> {
        let _guard = self.lifecycle.lock().await;
        self.stop_locked().await
    }

    /// Probe the process table and correct belief; returns whether it runs
    pub async fn reconcile(&self) -> Result<bool> {
        let _guard = self.lifecycle.lock().await;
        Ok(self.reconcile_locked().await)
    }

    /// Reconcile, then deliver `command` to the client
    pub async fn send(&self, command: RadioCommand) -> Result<CommandOutcome> {
        let _guard = self.lifecycle.lock().await;

        if !self.reconcile_locked().await {
            debug!("Radio client not running, dropping {}", command);
            return Ok(CommandOutcome::NotRunning);
        }

        if command == RadioCommand::Quit {
            self.stop_locked().await?;
            return Ok(CommandOutcome::Delivered);
        }

        if let Err(e) = self.pipe.send(&command).await {
            // A vanished client surfaces here as a failed write
            if !self.reconcile_locked().await {
                return Ok(CommandOutcome::NotRunning);
            }
            return Err(e);
        }

        let now = chrono::Utc::now();
        self.transition(|status| {
            status.cached.last_write = Some(now);
            if let Some(playing) = command.playing_after(status.cached.playing) {
                status.cached.playing = playing;
            }
        })
        .await;

        info!("Radio command {} delivered", command);
        Ok(CommandOutcome::Delivered)
    }

    /// Record now-playing metadata from the client's event hook
    pub fn note_event(&self, event: &RadioEvent) {
        self.status.send_modify(|status| match event.kind() {
            RadioEventKind::SongStart => {
                status.now_playing = event.track();
                if event.station_name.is_some() {
                    status.station = event.station_name.clone();
                }
            }
            RadioEventKind::SongFinish => status.now_playing = None,
            RadioEventKind::StationChange => {
                if event.station_name.is_some() {
                    status.station = event.station_name.clone();
                }
            }
            RadioEventKind::Other => {}
        });
        debug!("Radio event '{}' noted", event.event);
    }

    // ========================================
    // Internal helpers (lifecycle lock held)
    // ========================================

    async fn stop_locked(&self) -> Result<StopReport> {
        let deadline = Instant::now() + self.settings.stop_ceiling;

        let pids = match self.probe().await {
            Ok(pids) if pids.is_empty() => {
                self.mark_stopped().await;
                debug!("Radio client already stopped");
                return Ok(StopReport::AlreadyStopped);
            }
            Ok(pids) => pids,
            Err(e) => {
                // Escalate by name; the believed pid is the best guess for per-pid kills
                warn!("Radio probe before stop failed, escalating anyway: {}", e);
                let believed = self.status.borrow().cached.pid;
                believed.into_iter().collect()
            }
        };

        info!("Stopping radio client ({:?})", pids);
        self.set_state(RadioState::Stopping);

        let mut remaining = pids;
        let cleared_by =
            match tokio::time::timeout_at(deadline, self.escalate(&mut remaining)).await {
                Ok(cleared_by) => cleared_by,
                Err(_) => {
                    warn!(
                        "Radio stop ceiling of {:?} reached",
                        self.settings.stop_ceiling
                    );
                    None
                }
            };

        self.mark_stopped().await;

        match cleared_by {
            Some(step) => {
                info!("Radio client stopped by {:?}", step);
                Ok(StopReport::Stopped { step })
            }
            None => {
                warn!(
                    "Radio client processes lingering after stop: {:?}",
                    remaining
                );
                Ok(StopReport::Forced {
                    lingering: remaining,
                })
            }
        }
    }

    /// Run escalation steps until a probe finds the table clear
    ///
    /// `remaining` tracks the last observed PIDs so a caller that abandons
    /// the sequence still knows what lingered.
    async fn escalate(&self, remaining: &mut Vec<u32>) -> Option<StopStep> {
        for step in StopStep::ESCALATION {
            self.run_step(step, remaining).await;
            tokio::time::sleep(self.settings.step_wait).await;

            match self.probe().await {
                Ok(pids) if pids.is_empty() => return Some(step),
                Ok(pids) => {
                    debug!("After {:?}, still running: {:?}", step, pids);
                    *remaining = pids;
                }
                Err(e) => warn!("Probe after {:?} failed: {}", step, e),
            }
        }
        None
    }

    async fn run_step(&self, step: StopStep, pids: &[u32]) {
        let name = self.settings.process_name.as_str();
        let result = match step {
            StopStep::GracefulQuit => self.pipe.send(&RadioCommand::Quit).await,
            StopStep::Terminate => self.signal_all(name, Signal::SIGTERM).await,
            StopStep::KillAll => self.signal_all(name, Signal::SIGKILL).await,
            StopStep::KillEach => {
                for &pid in pids {
                    let kill = self.processes.signal_pid(pid, Signal::SIGKILL);
                    match self.bounded(kill, "kill pid").await {
                        Ok(()) | Err(Error::ProcessNotFound(_)) => {}
                        Err(e) => warn!("SIGKILL to pid {} failed: {}", pid, e),
                    }
                }
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("Radio stop step {:?} failed: {}", step, e);
        }
    }

    /// Probe and correct belief; a failed probe keeps the current belief
    async fn reconcile_locked(&self) -> bool {
        let believed = self.status.borrow().cached.running;

        let pids = match self.probe().await {
            Ok(pids) => pids,
            Err(e) => {
                warn!("Radio reconcile probe failed, keeping belief: {}", e);
                return believed;
            }
        };

        let running = !pids.is_empty();
        let now = chrono::Utc::now();

        if running == believed {
            self.status.send_modify(|status| {
                status.cached.last_verified = Some(now);
                status.state = if running {
                    RadioState::Running
                } else {
                    RadioState::Stopped
                };
                if running && status.cached.pid.is_none() {
                    status.cached.pid = pids.first().copied();
                }
            });
            return running;
        }

        if running {
            info!("Radio client found running ({:?}) against belief, adopting", pids);
        } else {
            warn!("Radio client exited unexpectedly, correcting belief");
        }

        self.transition(|status| {
            if running {
                status.state = RadioState::Running;
                status.cached.running = true;
                status.cached.pid = pids.first().copied();
            } else {
                status.state = RadioState::Stopped;
                status.cached = status.cached.stopped();
                status.now_playing = None;
            }
            status.cached.last_verified = Some(now);
        })
        .await;

        running
    }

    async fn probe(&self) -> Result<Vec<u32>> {
        self.bounded(self.processes.probe(&self.settings.process_name), "process probe")
            .await
    }

    async fn signal_all(&self, name: &str, signal: Signal) -> Result<()> {
        self.bounded(self.processes.signal_all(name, signal), "signal processes")
            .await
    }

    async fn bounded<T>(
        &self,
        operation: impl std::future::Future<Output = Result<T>>,
        label: &str,
    ) -> Result<T> {
        tokio::time::timeout(self.settings.probe_timeout, operation)
            .await
            .unwrap_or_else(|_| Err(Error::timeout(label, self.settings.probe_timeout)))
    }

    async fn mark_stopped(&self) {
        self.transition(|status| {
            status.state = RadioState::Stopped;
            status.cached = status.cached.stopped();
            status.cached.last_verified = Some(chrono::Utc::now());
            status.now_playing = None;
        })
        .await;
    }

    fn set_state(&self, state: RadioState) {
        self.status.send_modify(|status| status.state = state);
    }

    /// Apply a change, publish it, and mirror the cached part to disk
    async fn transition(&self, change: impl FnOnce(&mut RadioStatus)) {
        self.status.send_modify(change);
        let cached = self.status.borrow().cached.clone();
        if let Err(e) = self.status_file.store(&cached).await {
            warn!(
                "Failed to write radio status file {}: {}",
                self.status_file.path().display(),
                e
            );
        }
    }
}

#[async_trait]
impl SourceOwner for RadioSupervisor {
    async fn revoke(&self) -> Result<()> {
        let report = self.stop().await?;
        debug!("Radio revoked: {:?}", report);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_of_stopped_radio_hides_track() {
        let status = RadioStatus {
            state: RadioState::Stopped,
            cached: CachedStatus::default(),
            now_playing: Some(Track::new("radio:x", "X")),
            station: None,
        };
        let snapshot = status.snapshot();
        assert_eq!(snapshot.source, PlaybackSource::Radio);
        assert!(!snapshot.is_running);
        assert!(snapshot.current_track.is_none());
    }

    #[test]
    fn test_snapshot_of_running_radio() {
        let mut track = Track::new("radio:y", "Y");
        track.duration_secs = Some(200.0);
        let status = RadioStatus {
            state: RadioState::Running,
            cached: CachedStatus {
                running: true,
                playing: true,
                ..Default::default()
            },
            now_playing: Some(track),
            station: Some("Jazz".to_string()),
        };
        let snapshot = status.snapshot();
        assert!(snapshot.is_running);
        assert!(snapshot.is_playing);
        assert_eq!(snapshot.duration_secs, 200.0);
        assert_eq!(snapshot.current_track.unwrap().title, "Y");
    }

    #[test]
    fn test_escalation_order() {
        assert_eq!(
            StopStep::ESCALATION,
            [
                StopStep::GracefulQuit,
                StopStep::Terminate,
                StopStep::KillAll,
                StopStep::KillEach
            ]
        );
    }

    #[test]
    fn test_status_serializes_flat() {
        let json = serde_json::to_value(RadioStatus::initial()).unwrap();
        assert_eq!(json["state"], "unknown");
        assert_eq!(json["running"], false);
    }
}
