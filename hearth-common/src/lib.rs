//! # Hearth Common Library
//!
//! Shared code for the Hearth home-automation audio services:
//! - Playback source, track and snapshot types
//! - Event types (HearthEvent enum) for the real-time channel
//! - Configuration file resolution
//! - SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
pub use events::{HearthEvent, PlaybackSource, PlaybackStateSnapshot, QueueSnapshot, Track};
