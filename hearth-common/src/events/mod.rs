//! Event types for the Hearth real-time channel
//!
//! Provides shared event definitions and the EventBus used by the audio
//! service's state broadcaster.

// Sub-modules (supporting types)
mod playback_types;
mod queue_types;

pub use playback_types::{PlaybackSource, PlaybackStateSnapshot, Track};
pub use queue_types::{QueueChangeTrigger, QueueSlot, QueueSnapshot};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Hearth event types
///
/// Events are broadcast via EventBus and serialized as JSON for SSE
/// transmission. Every variant carries the source it describes so observers
/// can route updates without tracking the active source themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HearthEvent {
    /// A source's consolidated state changed
    ///
    /// Emitted on every transition (start, stop, load, pause, resume,
    /// revoke, queue advance).
    PlaybackStateChanged {
        snapshot: PlaybackStateSnapshot,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The broker granted playback to a different source
    ActiveSourceChanged {
        old_source: PlaybackSource,
        new_source: PlaybackSource,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Look-ahead queue contents changed
    QueueChanged {
        queue: QueueSnapshot,
        trigger: QueueChangeTrigger,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Throttled progress update delivered to every subscriber
    PlaybackProgress {
        source: PlaybackSource,
        position_secs: f64,
        duration_secs: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// High-frequency position update, only delivered to subscribers that
    /// opted in
    PlaybackPosition {
        source: PlaybackSource,
        position_secs: f64,
        duration_secs: f64,
        playing: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl HearthEvent {
    /// Event name used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            HearthEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            HearthEvent::ActiveSourceChanged { .. } => "ActiveSourceChanged",
            HearthEvent::QueueChanged { .. } => "QueueChanged",
            HearthEvent::PlaybackProgress { .. } => "PlaybackProgress",
            HearthEvent::PlaybackPosition { .. } => "PlaybackPosition",
        }
    }

    /// Source the event describes, if it is source-specific
    pub fn source(&self) -> Option<PlaybackSource> {
        match self {
            HearthEvent::PlaybackStateChanged { snapshot, .. } => Some(snapshot.source),
            HearthEvent::ActiveSourceChanged { new_source, .. } => Some(*new_source),
            HearthEvent::QueueChanged { .. } => Some(PlaybackSource::OnDemand),
            HearthEvent::PlaybackProgress { source, .. }
            | HearthEvent::PlaybackPosition { source, .. } => Some(*source),
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HearthEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to future events
    pub fn subscribe(&self) -> broadcast::Receiver<HearthEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns the number of subscribers that received it, or an error when
    /// nobody is listening.
    pub fn emit(
        &self,
        event: HearthEvent,
    ) -> Result<usize, broadcast::error::SendError<HearthEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: HearthEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
