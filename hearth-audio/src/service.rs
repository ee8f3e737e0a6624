//! Audio service
//!
//! Entry point for every client action. Each action that can make sound goes
//! through [`AudioBroker::acquire`] first, so the other source is revoked
//! before the owning component starts. Background tasks forward component
//! state to the [`StateBroadcaster`] and advance the queue on natural track
//! ends.

use hearth_common::events::{
    PlaybackSource, PlaybackStateSnapshot, QueueChangeTrigger, QueueSlot, QueueSnapshot, Track,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broadcast::StateBroadcaster;
use crate::broker::AudioBroker;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::library::{track_from_path, Library, LibraryEntry};
use crate::player::{
    MpvSession, PlayerController, PlayerEvent, PlayerSignal, PlayerState, PlayerTransport,
    SessionSettings, StreamResolver, YtDlpResolver,
};
use crate::queue::{QueueEntry, QueueManager};
use crate::radio::{
    CommandChannel, CommandOutcome, ProcessControl, RadioCommand, RadioEvent, RadioPipe,
    RadioStatus, RadioSupervisor, StartReport, StatusFile, StopReport, SupervisorSettings,
    SystemProcesses,
};

/// External collaborators; replaced by fakes in tests
pub struct ServiceParts {
    pub processes: Arc<dyn ProcessControl>,
    pub pipe: Arc<dyn RadioPipe>,
    pub transport: Arc<dyn PlayerTransport>,
    pub resolver: Arc<dyn StreamResolver>,
}

/// Combined status for the REST surface
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub active_source: PlaybackSource,
    pub radio: RadioStatus,
    pub player: PlayerState,
    pub queue: QueueSnapshot,
}

/// Audio arbitration service
pub struct AudioService {
    broker: Arc<AudioBroker>,
    radio: Arc<RadioSupervisor>,
    player: Arc<PlayerController>,
    queue: RwLock<QueueManager>,
    broadcaster: Arc<StateBroadcaster>,
    library: Library,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl AudioService {
    /// Build the service against the real radio client and player
    pub fn from_config(config: &Config) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let parts = ServiceParts {
            processes: Arc::new(SystemProcesses::new(config.radio.probe_timeout())),
            pipe: Arc::new(CommandChannel::new(
                config.radio.fifo_path.clone(),
                config.radio.write_timeout(),
            )),
            transport: Arc::new(MpvSession::new(
                SessionSettings::from_config(&config.player),
                events_tx,
            )),
            resolver: Arc::new(YtDlpResolver::new(&config.resolver)),
        };
        Self::new(config, parts, events_rx)
    }

    /// Build the service from explicit parts and start its background tasks
    ///
    /// `player_events` must be the receiving end of the channel the transport
    /// reports player events on.
    pub fn new(
        config: &Config,
        parts: ServiceParts,
        player_events: mpsc::UnboundedReceiver<PlayerEvent>,
    ) -> Arc<Self> {
        let radio = Arc::new(RadioSupervisor::new(
            SupervisorSettings::from_config(&config.radio),
            parts.processes,
            parts.pipe,
            StatusFile::new(config.radio.status_file.clone()),
        ));
        let player = Arc::new(PlayerController::new(
            parts.transport,
            Arc::clone(&parts.resolver),
            config.player.load_timeout(),
            config.player.initial_volume,
        ));
        let broker = Arc::new(
            AudioBroker::new(config.broker.revoke_timeout())
                .with_owner(PlaybackSource::Radio, radio.clone())
                .with_owner(PlaybackSource::OnDemand, player.clone()),
        );

        let service = Arc::new(Self {
            broker,
            radio,
            player,
            queue: RwLock::new(QueueManager::new()),
            broadcaster: Arc::new(StateBroadcaster::new(&config.broadcast)),
            library: Library::new(&config.library, parts.resolver),
            tasks: std::sync::Mutex::new(Vec::new()),
        });

        service.spawn_background(player_events);
        service
    }

    pub fn broker(&self) -> &AudioBroker {
        &self.broker
    }

    pub fn radio(&self) -> &RadioSupervisor {
        &self.radio
    }

    pub fn player(&self) -> &PlayerController {
        &self.player
    }

    pub fn broadcaster(&self) -> &StateBroadcaster {
        &self.broadcaster
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    /// Resume from the status file left by a previous run
    pub async fn restore(&self) -> Result<()> {
        self.radio.restore().await;
        if self.radio.status().cached.running {
            info!("Radio client believed running from last run, granting Radio");
            self.broker.acquire(PlaybackSource::Radio).await?;
        }
        Ok(())
    }

    pub async fn status(&self) -> ServiceStatus {
        ServiceStatus {
            active_source: self.broker.active(),
            radio: self.radio.status(),
            player: self.player.state(),
            queue: self.queue.read().await.snapshot(),
        }
    }

    /// Current snapshot for one source
    pub async fn snapshot_for(&self, source: PlaybackSource) -> PlaybackStateSnapshot {
        match source {
            PlaybackSource::Radio => self.radio.status().snapshot(),
            PlaybackSource::OnDemand => self
                .player
                .state()
                .snapshot(self.queue.read().await.snapshot()),
            PlaybackSource::None => PlaybackStateSnapshot::idle(PlaybackSource::None),
        }
    }

    // ========================================
    // Radio
    // ========================================

    /// Grant the radio and start (or adopt) the client
    pub async fn start_radio(&self) -> Result<StartReport> {
        let grant = self.broker.acquire(PlaybackSource::Radio).await?;
        if grant.changed(PlaybackSource::Radio) {
            debug!("Radio granted after {} ({:?})", grant.previous, grant.revoke);
        }

        match self.radio.start().await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.broker.release(PlaybackSource::Radio).await;
                Err(e)
            }
        }
    }

    pub async fn stop_radio(&self) -> Result<StopReport> {
        let report = self.radio.stop().await?;
        self.broker.release(PlaybackSource::Radio).await;
        Ok(report)
    }

    /// Deliver a command; commands that resume sound acquire the radio first
    pub async fn radio_command(&self, command: RadioCommand) -> Result<CommandOutcome> {
        if command == RadioCommand::Quit {
            return Ok(match self.stop_radio().await? {
                StopReport::AlreadyStopped => CommandOutcome::NotRunning,
                _ => CommandOutcome::Delivered,
            });
        }

        if !self.radio.reconcile().await? {
            // Belief corrected; drop a stale grant
            self.broker.release(PlaybackSource::Radio).await;
            return Ok(CommandOutcome::NotRunning);
        }

        let resumes_sound = command.playing_after(false) == Some(true);
        if resumes_sound && self.broker.active() != PlaybackSource::Radio {
            self.broker.acquire(PlaybackSource::Radio).await?;
        }

        let outcome = self.radio.send(command).await?;
        if outcome == CommandOutcome::NotRunning {
            self.broker.release(PlaybackSource::Radio).await;
        }
        Ok(outcome)
    }

    /// Radio client event hook
    pub fn radio_event(&self, event: &RadioEvent) {
        self.radio.note_event(event);
    }

    // ========================================
    // On-demand player
    // ========================================

    /// Play a remote track, re-resolving once if its stream URL expired
    pub async fn play_remote(&self, track: Track) -> Result<()> {
        self.broker.acquire(PlaybackSource::OnDemand).await?;

        let result = match self.player.load_remote(track.clone()).await {
            Err(Error::StaleResourceExpired(reason)) => {
                warn!("Stream for {} expired ({}), re-resolving", track.id, reason);
                self.player.load_remote(track).await
            }
            other => other,
        };

        self.release_if_idle(result).await
    }

    /// Play a library file, replacing whatever is loaded
    pub async fn play_local(&self, requested: &str) -> Result<Track> {
        let path = self.library.resolve(requested).await?;
        let track = track_from_path(&path);

        self.broker.acquire(PlaybackSource::OnDemand).await?;
        let result = self.player.load_local(&path, track.clone()).await;
        self.release_if_idle(result).await?;
        Ok(track)
    }

    pub async fn pause(&self) -> Result<()> {
        self.player.pause().await
    }

    /// Resume the loaded track, revoking the radio if it took over
    pub async fn resume(&self) -> Result<()> {
        if !self.player.state().loaded {
            return Err(Error::BadRequest("nothing is loaded".to_string()));
        }
        self.broker.acquire(PlaybackSource::OnDemand).await?;
        self.player.play().await
    }

    /// Stop on-demand playback and give up the source; the queue is kept
    pub async fn stop_on_demand(&self) -> Result<()> {
        self.player.stop().await?;
        self.broker.release(PlaybackSource::OnDemand).await;
        Ok(())
    }

    pub async fn set_volume(&self, volume: u8) -> Result<()> {
        self.player.set_volume(volume).await
    }

    async fn release_if_idle(&self, result: Result<()>) -> Result<()> {
        if result.is_err() && !self.player.state().loaded {
            self.broker.release(PlaybackSource::OnDemand).await;
        }
        result
    }

    // ========================================
    // Queue
    // ========================================

    pub async fn queue(&self) -> QueueSnapshot {
        self.queue.read().await.snapshot()
    }

    /// Add a library file to the look-ahead queue
    pub async fn enqueue(&self, requested: &str) -> Result<(QueueSlot, Track)> {
        let path = self.library.resolve(requested).await?;
        let track = track_from_path(&path);

        let (slot, snapshot) = {
            let mut queue = self.queue.write().await;
            let slot = queue.enqueue(QueueEntry::new(track.clone(), path))?;
            (slot, queue.snapshot())
        };

        info!("Queued {} in {}", track.title, slot);
        self.broadcaster
            .publish_queue(snapshot, QueueChangeTrigger::UserEnqueue);
        self.publish_on_demand().await;
        Ok((slot, track))
    }

    /// Clear a queue slot by name; playback is not touched
    pub async fn remove_slot(&self, slot_name: &str) -> Result<Option<Track>> {
        let (removed, snapshot) = {
            let mut queue = self.queue.write().await;
            let removed = queue.remove_slot(slot_name)?;
            (removed, queue.snapshot())
        };

        if removed.is_some() {
            self.broadcaster
                .publish_queue(snapshot, QueueChangeTrigger::UserRemove);
            self.publish_on_demand().await;
        }
        Ok(removed.map(|entry| entry.track))
    }

    // ========================================
    // Library
    // ========================================

    pub async fn library_list(&self) -> Result<Vec<LibraryEntry>> {
        self.library.list().await
    }

    pub async fn library_save(
        &self,
        id: &str,
        title: &str,
        artist: Option<&str>,
    ) -> Result<LibraryEntry> {
        self.library.save(id, title, artist).await
    }

    /// Delete a library file; queued references to it are dropped
    pub async fn library_delete(&self, requested: &str) -> Result<PathBuf> {
        let path = self.library.delete(requested).await?;

        let snapshot = {
            let mut queue = self.queue.write().await;
            let mut changed = false;
            for slot in [QueueSlot::InTheHole, QueueSlot::OnDeck] {
                let matches = match slot {
                    QueueSlot::OnDeck => queue.on_deck(),
                    QueueSlot::InTheHole => queue.in_the_hole(),
                }
                .map(|entry| entry.file_path == path)
                .unwrap_or(false);
                if matches {
                    queue.remove(slot);
                    changed = true;
                }
            }
            changed.then(|| queue.snapshot())
        };

        if let Some(snapshot) = snapshot {
            self.broadcaster
                .publish_queue(snapshot, QueueChangeTrigger::UserRemove);
            self.publish_on_demand().await;
        }
        Ok(path)
    }

    // ========================================
    // Lifecycle
    // ========================================

    /// Stop the radio client if believed running and terminate the player
    pub async fn shutdown(&self) {
        info!("Audio service shutting down");

        if self.radio.status().cached.running {
            match self.radio.stop().await {
                Ok(report) => info!("Radio stopped for shutdown: {:?}", report),
                Err(e) => warn!("Failed to stop radio during shutdown: {}", e),
            }
        }

        if let Err(e) = self.player.shutdown().await {
            warn!("Failed to shut down player: {}", e);
        }

        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }

    // ========================================
    // Background tasks
    // ========================================

    fn spawn_background(self: &Arc<Self>, mut player_events: mpsc::UnboundedReceiver<PlayerEvent>) {
        let mut tasks = Vec::new();

        // Player events: classify, track position, advance on natural end
        let weak = Arc::downgrade(self);
        tasks.push(tokio::spawn(async move {
            while let Some(event) = player_events.recv().await {
                let Some(service) = weak.upgrade() else { break };
                match service.player.on_event(&event) {
                    PlayerSignal::Progress => {
                        let state = service.player.state();
                        if state.loaded {
                            service.broadcaster.publish_position(
                                PlaybackSource::OnDemand,
                                state.position_secs,
                                state.duration_secs,
                                state.playing,
                            );
                        }
                    }
                    PlayerSignal::NaturalEnd => {
                        // Loading the next track waits on this loop's events
                        tokio::spawn(async move { service.advance_after_natural_end().await });
                    }
                    PlayerSignal::StateChanged | PlayerSignal::LoadFailed => {
                        service.broadcaster.reset_throttle();
                    }
                    PlayerSignal::None => {}
                }
            }
            debug!("Player event loop ended");
        }));

        // Radio status -> snapshots
        let weak = Arc::downgrade(self);
        let mut radio_rx = self.radio.subscribe();
        tasks.push(tokio::spawn(async move {
            while radio_rx.changed().await.is_ok() {
                let snapshot = radio_rx.borrow_and_update().snapshot();
                let Some(service) = weak.upgrade() else { break };
                service.broadcaster.publish_snapshot(snapshot);
            }
        }));

        // Player state -> snapshots
        let weak = Arc::downgrade(self);
        let mut player_rx = self.player.subscribe();
        tasks.push(tokio::spawn(async move {
            while player_rx.changed().await.is_ok() {
                let state = player_rx.borrow_and_update().clone();
                let Some(service) = weak.upgrade() else { break };
                let queue = service.queue.read().await.snapshot();
                service.broadcaster.publish_snapshot(state.snapshot(queue));
            }
        }));

        // Active source changes
        let weak = Arc::downgrade(self);
        let mut active_rx = self.broker.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut previous = *active_rx.borrow_and_update();
            while active_rx.changed().await.is_ok() {
                let current = *active_rx.borrow_and_update();
                let Some(service) = weak.upgrade() else { break };
                if current != previous {
                    service.broadcaster.publish_active_source(previous, current);
                    previous = current;
                }
            }
        }));

        if let Ok(mut slot) = self.tasks.lock() {
            slot.extend(tasks);
        }
    }

    /// Load the next queued track, or release the source when none is left
    ///
    /// Runs under the broker's hold on OnDemand; if another source took over
    /// after the track ended, the queue is left untouched.
    async fn advance_after_natural_end(&self) {
        let Some(hold) = self.broker.hold(PlaybackSource::OnDemand).await else {
            info!(
                "Track ended after {} took over, keeping the queue",
                self.broker.active()
            );
            return;
        };

        loop {
            let (next, snapshot) = {
                let mut queue = self.queue.write().await;
                let next = queue.advance();
                (next, queue.snapshot())
            };

            let Some(entry) = next else {
                info!("Queue empty after track end, releasing on-demand source");
                drop(hold);
                self.broker.release(PlaybackSource::OnDemand).await;
                self.publish_on_demand().await;
                return;
            };

            self.broadcaster
                .publish_queue(snapshot, QueueChangeTrigger::TrackCompletion);

            match self.player.load_local(&entry.file_path, entry.track.clone()).await {
                Ok(()) => {
                    info!("Advanced to {}", entry.track.title);
                    return;
                }
                Err(e) => warn!(
                    "Failed to load queued {}: {}, trying next",
                    entry.file_path.display(),
                    e
                ),
            }
        }
    }

    async fn publish_on_demand(&self) {
        let snapshot = self.snapshot_for(PlaybackSource::OnDemand).await;
        self.broadcaster.publish_snapshot(snapshot);
    }
}
