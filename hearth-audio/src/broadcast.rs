//! State broadcaster
//!
//! Pushes source-tagged snapshots to observers on every transition. Two buses:
//! the state bus carries transitions plus throttled progress and reaches every
//! subscriber; the position bus carries high-frequency position updates and
//! is only subscribed to by clients that opt in.
//!
//! Only the latest snapshot per source is retained, for late joiners.

use hearth_common::events::{
    EventBus, HearthEvent, PlaybackSource, PlaybackStateSnapshot, QueueChangeTrigger,
    QueueSnapshot,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use crate::config::BroadcastConfig;

/// Fan-out point for playback observers
pub struct StateBroadcaster {
    state_bus: EventBus,
    position_bus: EventBus,
    latest: Mutex<HashMap<PlaybackSource, PlaybackStateSnapshot>>,
    progress_interval: Duration,
    position_interval: Duration,
    throttle: Mutex<Throttle>,
}

#[derive(Default)]
struct Throttle {
    last_progress: Option<Instant>,
    last_position: Option<Instant>,
}

impl StateBroadcaster {
    pub fn new(config: &BroadcastConfig) -> Self {
        Self {
            state_bus: EventBus::new(config.capacity.max(1)),
            position_bus: EventBus::new(config.capacity.max(1)),
            latest: Mutex::new(HashMap::new()),
            progress_interval: Duration::from_millis(config.progress_interval_ms),
            position_interval: Duration::from_millis(config.position_interval_ms),
            throttle: Mutex::new(Throttle::default()),
        }
    }

    /// Subscribe to transitions and throttled progress
    pub fn subscribe_state(&self) -> broadcast::Receiver<HearthEvent> {
        self.state_bus.subscribe()
    }

    /// Subscribe to high-frequency position updates
    pub fn subscribe_position(&self) -> broadcast::Receiver<HearthEvent> {
        self.position_bus.subscribe()
    }

    /// Latest snapshot published for `source`
    pub fn latest(&self, source: PlaybackSource) -> Option<PlaybackStateSnapshot> {
        self.latest
            .lock()
            .ok()
            .and_then(|latest| latest.get(&source).cloned())
    }

    /// Events that bring a new subscriber up to date
    pub fn initial_events(&self, active: PlaybackSource) -> Vec<HearthEvent> {
        let timestamp = chrono::Utc::now();
        let mut events = vec![HearthEvent::ActiveSourceChanged {
            old_source: PlaybackSource::None,
            new_source: active,
            timestamp,
        }];
        for source in [PlaybackSource::Radio, PlaybackSource::OnDemand] {
            if let Some(snapshot) = self.latest(source) {
                events.push(HearthEvent::PlaybackStateChanged {
                    snapshot,
                    timestamp,
                });
            }
        }
        events
    }

    /// Record and push a snapshot; identical repeats are dropped
    ///
    /// Position is ignored when comparing, so progress alone never counts as
    /// a transition. Returns whether an event was emitted.
    pub fn publish_snapshot(&self, snapshot: PlaybackStateSnapshot) -> bool {
        let changed = match self.latest.lock() {
            Ok(mut latest) => {
                let changed = latest
                    .get(&snapshot.source)
                    .map(|previous| !same_state(previous, &snapshot))
                    .unwrap_or(true);
                latest.insert(snapshot.source, snapshot.clone());
                changed
            }
            Err(_) => true,
        };

        if changed {
            debug!(
                "Broadcasting {} snapshot (running={}, playing={})",
                snapshot.source, snapshot.is_running, snapshot.is_playing
            );
            self.state_bus.emit_lossy(HearthEvent::PlaybackStateChanged {
                snapshot,
                timestamp: chrono::Utc::now(),
            });
        }
        changed
    }

    pub fn publish_active_source(&self, old_source: PlaybackSource, new_source: PlaybackSource) {
        self.state_bus.emit_lossy(HearthEvent::ActiveSourceChanged {
            old_source,
            new_source,
            timestamp: chrono::Utc::now(),
        });
    }

    pub fn publish_queue(&self, queue: QueueSnapshot, trigger: QueueChangeTrigger) {
        self.state_bus.emit_lossy(HearthEvent::QueueChanged {
            queue,
            trigger,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Report a position sample; each bus applies its own rate limit
    pub fn publish_position(
        &self,
        source: PlaybackSource,
        position_secs: f64,
        duration_secs: f64,
        playing: bool,
    ) {
        let now = Instant::now();
        let (send_position, send_progress) = match self.throttle.lock() {
            Ok(mut throttle) => (
                due(&mut throttle.last_position, now, self.position_interval),
                due(&mut throttle.last_progress, now, self.progress_interval),
            ),
            Err(_) => (false, false),
        };

        if let Ok(mut latest) = self.latest.lock() {
            if let Some(snapshot) = latest.get_mut(&source) {
                snapshot.position_secs = position_secs;
                snapshot.duration_secs = duration_secs;
            }
        }

        let timestamp = chrono::Utc::now();
        if send_position {
            self.position_bus.emit_lossy(HearthEvent::PlaybackPosition {
                source,
                position_secs,
                duration_secs,
                playing,
                timestamp,
            });
        }
        if send_progress {
            self.state_bus.emit_lossy(HearthEvent::PlaybackProgress {
                source,
                position_secs,
                duration_secs,
                timestamp,
            });
        }
    }

    /// Allow the next position sample through on both buses
    pub fn reset_throttle(&self) {
        if let Ok(mut throttle) = self.throttle.lock() {
            *throttle = Throttle::default();
        }
    }
}

fn due(last: &mut Option<Instant>, now: Instant, interval: Duration) -> bool {
    match last {
        Some(at) if now.duration_since(*at) < interval => false,
        _ => {
            *last = Some(now);
            true
        }
    }
}

fn same_state(a: &PlaybackStateSnapshot, b: &PlaybackStateSnapshot) -> bool {
    a.source == b.source
        && a.is_running == b.is_running
        && a.is_playing == b.is_playing
        && a.current_track == b.current_track
        && a.queue == b.queue
}
