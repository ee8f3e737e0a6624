//! Queue Manager
//!
//! Two-slot look-ahead for on-demand playback:
//! - OnDeck: plays when the current track ends
//! - InTheHole: promoted to OnDeck when OnDeck is taken
//!
//! Entries live in memory only. The manager never touches playback; the
//! service loads whatever `advance()` hands back.

use hearth_common::events::{QueueSlot, QueueSnapshot, Track};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Queued local track
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    /// Queue entry UUID
    pub queue_entry_id: Uuid,

    /// Track metadata (id is the file path)
    pub track: Track,

    /// Audio file path inside the library
    pub file_path: PathBuf,
}

impl QueueEntry {
    pub fn new(track: Track, file_path: PathBuf) -> Self {
        Self {
            queue_entry_id: Uuid::new_v4(),
            track,
            file_path,
        }
    }
}

/// Look-ahead slot tracking
#[derive(Debug, Default)]
pub struct QueueManager {
    /// Plays next
    on_deck: Option<QueueEntry>,

    /// Plays after OnDeck
    in_the_hole: Option<QueueEntry>,
}

impl QueueManager {
    /// Create new empty queue manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry to the first free slot
    ///
    /// Returns the slot used, or `QueueFull` (queue unchanged) when both are
    /// occupied.
    pub fn enqueue(&mut self, entry: QueueEntry) -> Result<QueueSlot> {
        if self.on_deck.is_none() {
            self.on_deck = Some(entry);
            Ok(QueueSlot::OnDeck)
        } else if self.in_the_hole.is_none() {
            self.in_the_hole = Some(entry);
            Ok(QueueSlot::InTheHole)
        } else {
            Err(Error::QueueFull)
        }
    }

    /// Take OnDeck for loading and promote InTheHole
    ///
    /// None means there is nothing left to play.
    pub fn advance(&mut self) -> Option<QueueEntry> {
        let next = self.on_deck.take()?;
        self.on_deck = self.in_the_hole.take();
        Some(next)
    }

    /// Clear a slot by name; removing OnDeck promotes InTheHole
    pub fn remove_slot(&mut self, slot_name: &str) -> Result<Option<QueueEntry>> {
        let slot = slot_name
            .parse::<QueueSlot>()
            .map_err(|_| Error::InvalidSlot(slot_name.to_string()))?;
        Ok(self.remove(slot))
    }

    /// Clear a slot; removing OnDeck promotes InTheHole
    pub fn remove(&mut self, slot: QueueSlot) -> Option<QueueEntry> {
        match slot {
            QueueSlot::OnDeck => {
                let removed = self.on_deck.take();
                self.on_deck = self.in_the_hole.take();
                removed
            }
            QueueSlot::InTheHole => self.in_the_hole.take(),
        }
    }

    /// Drop both slots
    pub fn clear(&mut self) {
        self.on_deck = None;
        self.in_the_hole = None;
    }

    pub fn on_deck(&self) -> Option<&QueueEntry> {
        self.on_deck.as_ref()
    }

    pub fn in_the_hole(&self) -> Option<&QueueEntry> {
        self.in_the_hole.as_ref()
    }

    pub fn len(&self) -> usize {
        usize::from(self.on_deck.is_some()) + usize::from(self.in_the_hole.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.on_deck.is_none()
    }

    pub fn is_full(&self) -> bool {
        self.on_deck.is_some() && self.in_the_hole.is_some()
    }

    /// Track-level view for observers
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            on_deck: self.on_deck.as_ref().map(|e| e.track.clone()),
            in_the_hole: self.in_the_hole.as_ref().map(|e| e.track.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_entry(name: &str) -> QueueEntry {
        let path = PathBuf::from(format!("/music/{}.mp3", name));
        QueueEntry::new(Track::new(path.to_string_lossy(), name), path)
    }

    #[test]
    fn test_queue_manager_creation() {
        let queue = QueueManager::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert!(queue.on_deck().is_none());
        assert!(queue.in_the_hole().is_none());
    }

    #[test]
    fn test_enqueue_fills_slots_in_order() {
        let mut queue = QueueManager::new();
        assert_eq!(queue.enqueue(create_test_entry("a")).unwrap(), QueueSlot::OnDeck);
        assert_eq!(queue.enqueue(create_test_entry("b")).unwrap(), QueueSlot::InTheHole);
        assert!(queue.is_full());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_enqueue_when_full_is_rejected_without_change() {
        let mut queue = QueueManager::new();
        queue.enqueue(create_test_entry("a")).unwrap();
        queue.enqueue(create_test_entry("b")).unwrap();
        let before = queue.snapshot();

        assert!(matches!(
            queue.enqueue(create_test_entry("c")),
            Err(Error::QueueFull)
        ));
        assert_eq!(queue.snapshot(), before);
    }

    #[test]
    fn test_advance_promotes_in_the_hole() {
        let mut queue = QueueManager::new();
        queue.enqueue(create_test_entry("a")).unwrap();
        queue.enqueue(create_test_entry("b")).unwrap();

        let first = queue.advance().unwrap();
        assert_eq!(first.track.title, "a");
        assert_eq!(queue.on_deck().unwrap().track.title, "b");
        assert!(queue.in_the_hole().is_none());

        let second = queue.advance().unwrap();
        assert_eq!(second.track.title, "b");
        assert!(queue.advance().is_none());
    }

    #[test]
    fn test_remove_on_deck_promotes() {
        let mut queue = QueueManager::new();
        queue.enqueue(create_test_entry("a")).unwrap();
        queue.enqueue(create_test_entry("b")).unwrap();

        let removed = queue.remove_slot("on_deck").unwrap().unwrap();
        assert_eq!(removed.track.title, "a");
        assert_eq!(queue.on_deck().unwrap().track.title, "b");
        assert!(queue.in_the_hole().is_none());
    }

    #[test]
    fn test_remove_in_the_hole() {
        let mut queue = QueueManager::new();
        queue.enqueue(create_test_entry("a")).unwrap();
        queue.enqueue(create_test_entry("b")).unwrap();

        let removed = queue.remove_slot("InTheHole").unwrap().unwrap();
        assert_eq!(removed.track.title, "b");
        assert_eq!(queue.on_deck().unwrap().track.title, "a");
    }

    #[test]
    fn test_remove_empty_slot_returns_none() {
        let mut queue = QueueManager::new();
        assert!(queue.remove_slot("in-the-hole").unwrap().is_none());
    }

    #[test]
    fn test_remove_unknown_slot_is_invalid() {
        let mut queue = QueueManager::new();
        queue.enqueue(create_test_entry("a")).unwrap();
        assert!(matches!(
            queue.remove_slot("bullpen"),
            Err(Error::InvalidSlot(name)) if name == "bullpen"
        ));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_snapshot_reflects_slots() {
        let mut queue = QueueManager::new();
        queue.enqueue(create_test_entry("a")).unwrap();
        let snapshot = queue.snapshot();
        assert_eq!(snapshot.on_deck.unwrap().title, "a");
        assert!(snapshot.in_the_hole.is_none());

        queue.clear();
        assert!(queue.snapshot().is_empty());
    }
}
