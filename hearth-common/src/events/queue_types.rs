//! Queue type definitions
//!
//! Supporting types for the two-slot look-ahead queue.

use serde::{Deserialize, Serialize};

use super::playback_types::Track;

/// Look-ahead queue slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueSlot {
    /// Plays next
    OnDeck,
    /// Plays after OnDeck
    InTheHole,
}

impl std::fmt::Display for QueueSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueSlot::OnDeck => write!(f, "on_deck"),
            QueueSlot::InTheHole => write!(f, "in_the_hole"),
        }
    }
}

impl std::str::FromStr for QueueSlot {
    type Err = String;

    /// Accepts snake_case, camelCase and hyphenated spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "ondeck" => Ok(QueueSlot::OnDeck),
            "inthehole" => Ok(QueueSlot::InTheHole),
            _ => Err(format!("unknown queue slot '{}'", s)),
        }
    }
}

/// Why the queue changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum QueueChangeTrigger {
    UserEnqueue,
    UserRemove,
    TrackCompletion,
}

impl std::fmt::Display for QueueChangeTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueChangeTrigger::UserEnqueue => write!(f, "UserEnqueue"),
            QueueChangeTrigger::UserRemove => write!(f, "UserRemove"),
            QueueChangeTrigger::TrackCompletion => write!(f, "TrackCompletion"),
        }
    }
}

/// Queue contents as seen by observers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct QueueSnapshot {
    pub on_deck: Option<Track>,
    pub in_the_hole: Option<Track>,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.on_deck.is_none() && self.in_the_hole.is_none()
    }
}
