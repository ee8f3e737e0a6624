//! Playback-related type definitions
//!
//! Sources, tracks and the consolidated snapshot pushed to observers.

use serde::{Deserialize, Serialize};

use super::queue_types::QueueSnapshot;

/// Playback source enumeration
///
/// At most one of Radio/OnDemand is active at any instant; the audio broker
/// is the only writer of the active value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackSource {
    /// Nothing is permitted to produce sound
    #[default]
    None,
    /// Supervised streaming-radio client
    Radio,
    /// Locally controlled media player (remote streams and library tracks)
    OnDemand,
}

impl std::fmt::Display for PlaybackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackSource::None => write!(f, "none"),
            PlaybackSource::Radio => write!(f, "radio"),
            PlaybackSource::OnDemand => write!(f, "on_demand"),
        }
    }
}

/// Track metadata
///
/// `id` is either a remote identifier (on-demand streams) or a filesystem
/// path (library tracks). Library tracks carry no other identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Track {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub cover_art: Option<String>,
}

impl Track {
    /// Create a track with only an identifier and title
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Consolidated, source-tagged playback state
///
/// Recomputed on every transition; only the latest value is retained.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PlaybackStateSnapshot {
    /// Which source this snapshot describes
    pub source: PlaybackSource,
    /// Whether the source's process/player is believed to be running
    pub is_running: bool,
    /// Whether the source is believed to be producing sound
    pub is_playing: bool,
    /// Currently loaded track, if known
    pub current_track: Option<Track>,
    /// Position within the current track (seconds)
    pub position_secs: f64,
    /// Duration of the current track (seconds, 0 when unknown)
    pub duration_secs: f64,
    /// Look-ahead queue (only populated for the on-demand source)
    pub queue: QueueSnapshot,
}

impl PlaybackStateSnapshot {
    /// Snapshot of a source that is neither running nor playing
    pub fn idle(source: PlaybackSource) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }
}
