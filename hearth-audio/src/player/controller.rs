//! Local player controller
//!
//! Drives the single player instance: load (remote or local), play, pause,
//! stop and volume. Also classifies player events, in particular telling a
//! natural end of track apart from a stop the controller caused itself.
//!
//! **Disambiguation:** before any controller-initiated stop or replacement of a
//! loaded file, `suppress_auto_advance` is set, synchronously and before the
//! request goes out. The event handler swaps the flag back to false; an
//! end-of-file counts as a natural end only when the flag was unset.

use async_trait::async_trait;
use hearth_common::events::{PlaybackSource, PlaybackStateSnapshot, QueueSnapshot, Track};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex};
use tracing::{debug, info, warn};

use crate::broker::SourceOwner;
use crate::error::{Error, Result};
use crate::player::events::{EndReason, PlayerEvent};
use crate::player::ipc::PlayerTransport;
use crate::player::resolver::StreamResolver;

/// Controller's view of the player
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerState {
    /// A file is loaded (playing or paused)
    pub loaded: bool,
    pub playing: bool,
    pub track: Option<Track>,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub volume: u8,
}

impl PlayerState {
    fn idle(volume: u8) -> Self {
        Self {
            loaded: false,
            playing: false,
            track: None,
            position_secs: 0.0,
            duration_secs: 0.0,
            volume,
        }
    }

    /// Source-tagged snapshot for observers
    pub fn snapshot(&self, queue: QueueSnapshot) -> PlaybackStateSnapshot {
        PlaybackStateSnapshot {
            source: PlaybackSource::OnDemand,
            is_running: self.loaded,
            is_playing: self.playing,
            current_track: self.track.clone(),
            position_secs: self.position_secs,
            duration_secs: self.duration_secs,
            queue,
        }
    }
}

/// What an event means for the rest of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerSignal {
    /// Nothing observable changed
    None,
    /// Position or duration moved
    Progress,
    /// Loaded/playing state changed
    StateChanged,
    /// Track ended on its own; advance the queue
    NaturalEnd,
    /// A pending load failed before the file loaded
    LoadFailed,
}

#[derive(Debug)]
enum LoadResult {
    Loaded,
    Failed(String),
}

struct PendingLoad {
    track: Track,
    done: oneshot::Sender<LoadResult>,
}

/// Owner of the on-demand source's player instance
pub struct PlayerController {
    transport: Arc<dyn PlayerTransport>,
    resolver: Arc<dyn StreamResolver>,
    load_timeout: Duration,
    /// One-shot: the next end-of-file was caused by the controller
    suppress_auto_advance: AtomicBool,
    /// Serializes loads and stops
    op: Mutex<()>,
    pending_load: std::sync::Mutex<Option<PendingLoad>>,
    state: watch::Sender<PlayerState>,
}

impl PlayerController {
    pub fn new(
        transport: Arc<dyn PlayerTransport>,
        resolver: Arc<dyn StreamResolver>,
        load_timeout: Duration,
        initial_volume: u8,
    ) -> Self {
        let (state, _) = watch::channel(PlayerState::idle(initial_volume.min(100)));
        Self {
            transport,
            resolver,
            load_timeout,
            suppress_auto_advance: AtomicBool::new(false),
            op: Mutex::new(()),
            pending_load: std::sync::Mutex::new(None),
            state,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerState> {
        self.state.subscribe()
    }

    /// Whether the next end-of-file will be treated as controller-initiated
    pub fn auto_advance_suppressed(&self) -> bool {
        self.suppress_auto_advance.load(Ordering::SeqCst)
    }

    /// Resolve `track.id` to a fresh stream URL and load it
    ///
    /// A failure reported by the player before the file loaded is
    /// `StaleResourceExpired`; callers re-resolve once.
    pub async fn load_remote(&self, track: Track) -> Result<()> {
        let url = self.resolver.resolve(&track.id).await?;
        self.load(&url, track, true).await
    }

    /// Load a file from the local library
    pub async fn load_local(&self, path: &Path, track: Track) -> Result<()> {
        let target = path.to_string_lossy().into_owned();
        self.load(&target, track, false).await
    }

    pub async fn play(&self) -> Result<()> {
        self.set_pause(false).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.set_pause(true).await
    }

    /// Stop playback; a no-op when nothing is loaded
    pub async fn stop(&self) -> Result<()> {
        let _op = self.op.lock().await;

        if !self.state.borrow().loaded {
            debug!("Player stop: nothing loaded");
            return Ok(());
        }

        self.suppress_auto_advance.store(true, Ordering::SeqCst);
        if let Err(e) = self.transport.request(vec![json!("stop")]).await {
            self.suppress_auto_advance.store(false, Ordering::SeqCst);
            return Err(e);
        }

        // The end-file event confirms; clear now so snapshots don't lag
        self.state.send_modify(|state| {
            state.loaded = false;
            state.playing = false;
            state.track = None;
            state.position_secs = 0.0;
            state.duration_secs = 0.0;
        });
        info!("Player stopped");
        Ok(())
    }

    /// Set output volume (0..=100)
    pub async fn set_volume(&self, volume: u8) -> Result<()> {
        if volume > 100 {
            return Err(Error::BadRequest(format!(
                "volume must be 0..=100, got {}",
                volume
            )));
        }
        self.transport
            .request(vec![json!("set_property"), json!("volume"), json!(volume)])
            .await?;
        self.state.send_modify(|state| state.volume = volume);
        debug!("Player volume set to {}", volume);
        Ok(())
    }

    /// Terminate the player instance
    pub async fn shutdown(&self) -> Result<()> {
        self.suppress_auto_advance.store(true, Ordering::SeqCst);
        self.transport.shutdown().await
    }

    /// Classify a player event and fold it into the controller state
    pub fn on_event(&self, event: &PlayerEvent) -> PlayerSignal {
        match event {
            PlayerEvent::FileLoaded => {
                let Some(pending) = self.take_pending() else {
                    self.state.send_modify(|state| state.loaded = true);
                    return PlayerSignal::StateChanged;
                };
                self.state.send_modify(|state| {
                    state.loaded = true;
                    state.playing = true;
                    state.position_secs = 0.0;
                    state.duration_secs = pending.track.duration_secs.unwrap_or(0.0);
                    state.track = Some(pending.track.clone());
                });
                let _ = pending.done.send(LoadResult::Loaded);
                PlayerSignal::StateChanged
            }

            PlayerEvent::EndFile {
                reason: EndReason::Error,
                file_error,
            } if self.has_pending() => {
                let reason = file_error.clone().unwrap_or_else(|| "load failed".to_string());
                if let Some(pending) = self.take_pending() {
                    warn!("Player failed to load {}: {}", pending.track.id, reason);
                    let _ = pending.done.send(LoadResult::Failed(reason));
                }
                self.clear_loaded();
                PlayerSignal::LoadFailed
            }

            PlayerEvent::EndFile { reason, file_error } => {
                let suppressed = self.suppress_auto_advance.swap(false, Ordering::SeqCst);
                let had_pending = self.has_pending();
                if !had_pending {
                    self.clear_loaded();
                }

                if suppressed {
                    debug!("End of file ({:?}) caused by controller", reason);
                    return PlayerSignal::StateChanged;
                }

                match reason {
                    EndReason::Eof | EndReason::Stop => {
                        info!("Track ended naturally ({:?})", reason);
                        PlayerSignal::NaturalEnd
                    }
                    EndReason::Error => {
                        warn!(
                            "Track aborted by player error: {}",
                            file_error.as_deref().unwrap_or("unknown")
                        );
                        PlayerSignal::NaturalEnd
                    }
                    EndReason::Quit | EndReason::Redirect | EndReason::Unknown => {
                        PlayerSignal::StateChanged
                    }
                }
            }

            PlayerEvent::TimePos(position) => {
                self.state.send_modify(|state| state.position_secs = position.max(0.0));
                PlayerSignal::Progress
            }

            PlayerEvent::Duration(duration) => {
                self.state.send_modify(|state| state.duration_secs = duration.max(0.0));
                PlayerSignal::Progress
            }

            PlayerEvent::Pause(paused) => {
                let changed = self.state.send_if_modified(|state| {
                    let playing = state.loaded && !paused;
                    if state.playing != playing {
                        state.playing = playing;
                        true
                    } else {
                        false
                    }
                });
                if changed {
                    PlayerSignal::StateChanged
                } else {
                    PlayerSignal::None
                }
            }

            PlayerEvent::Idle => PlayerSignal::None,

            PlayerEvent::Disconnected => {
                self.suppress_auto_advance.store(false, Ordering::SeqCst);
                if let Some(pending) = self.take_pending() {
                    let _ = pending
                        .done
                        .send(LoadResult::Failed("player disconnected".to_string()));
                }
                self.clear_loaded();
                PlayerSignal::StateChanged
            }
        }
    }

    // ========================================
    // Internal helpers
    // ========================================

    /// Load `target`, retrying once when the player does not confirm in time
    async fn load(&self, target: &str, track: Track, remote: bool) -> Result<()> {
        match self.load_once(target, track.clone(), remote).await {
            Err(Error::Timeout { .. }) => {
                warn!("Player did not confirm {} in time, retrying once", track.id);
                self.load_once(target, track, remote).await
            }
            other => other,
        }
    }

    async fn load_once(&self, target: &str, track: Track, remote: bool) -> Result<()> {
        let _op = self.op.lock().await;

        let (done_tx, done_rx) = oneshot::channel();
        self.pending_slot()?.replace(PendingLoad {
            track: track.clone(),
            done: done_tx,
        });

        // Replacing a loaded file produces an end-of-file for the old one
        let replacing = self.state.borrow().loaded;
        if replacing {
            self.suppress_auto_advance.store(true, Ordering::SeqCst);
        }

        if let Err(e) = self
            .transport
            .request(vec![json!("set_property"), json!("pause"), json!(false)])
            .await
        {
            debug!("Unpause before load failed: {}", e);
        }

        let loadfile = vec![json!("loadfile"), json!(target), json!("replace")];
        if let Err(e) = self.transport.request(loadfile).await {
            self.take_pending();
            if replacing {
                self.suppress_auto_advance.store(false, Ordering::SeqCst);
            }
            return Err(e);
        }

        match tokio::time::timeout(self.load_timeout, done_rx).await {
            Ok(Ok(LoadResult::Loaded)) => {
                info!("Loaded {} ({})", track.title, track.id);
                Ok(())
            }
            Ok(Ok(LoadResult::Failed(reason))) if remote => {
                Err(Error::StaleResourceExpired(format!("{}: {}", track.id, reason)))
            }
            Ok(Ok(LoadResult::Failed(reason))) => {
                Err(Error::Player(format!("failed to load {}: {}", target, reason)))
            }
            Ok(Err(_)) => Err(Error::Player("load abandoned".to_string())),
            Err(_) => {
                self.take_pending();
                Err(Error::timeout(
                    format!("player load of {}", track.id),
                    self.load_timeout,
                ))
            }
        }
    }

    async fn set_pause(&self, paused: bool) -> Result<()> {
        if !self.state.borrow().loaded {
            return Err(Error::BadRequest("nothing is loaded".to_string()));
        }
        self.transport
            .request(vec![json!("set_property"), json!("pause"), json!(paused)])
            .await?;
        self.state.send_modify(|state| state.playing = !paused);
        info!("Player {}", if paused { "paused" } else { "resumed" });
        Ok(())
    }

    fn clear_loaded(&self) {
        self.state.send_modify(|state| {
            state.loaded = false;
            state.playing = false;
            state.position_secs = 0.0;
        });
    }

    fn pending_slot(&self) -> Result<std::sync::MutexGuard<'_, Option<PendingLoad>>> {
        self.pending_load
            .lock()
            .map_err(|_| Error::Internal("pending load slot poisoned".to_string()))
    }

    fn take_pending(&self) -> Option<PendingLoad> {
        self.pending_slot().ok().and_then(|mut slot| slot.take())
    }

    fn has_pending(&self) -> bool {
        self.pending_slot()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl SourceOwner for PlayerController {
    async fn revoke(&self) -> Result<()> {
        self.stop().await
    }
}
