//! # Hearth Audio Library (hearth-audio)
//!
//! Arbitrates playback between two mutually exclusive sources:
//! - a radio client process driven through a named pipe
//! - an on-demand player driven over JSON IPC, fed by a two-slot queue
//!
//! **Architecture:** the [`broker::AudioBroker`] grants one source at a time,
//! revoking the other first; [`broadcast::StateBroadcaster`] pushes
//! source-tagged snapshots to SSE clients; [`service::AudioService`] ties the
//! components together behind the REST surface in [`api`].

pub mod api;
pub mod broadcast;
pub mod broker;
pub mod config;
pub mod error;
pub mod library;
pub mod player;
pub mod queue;
pub mod radio;
pub mod service;

pub use config::Config;
pub use error::{Error, Result};
pub use service::AudioService;
