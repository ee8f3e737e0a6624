//! On-demand player
//!
//! One long-lived player process controlled over JSON IPC, plus the resolver
//! that turns remote track ids into playable URLs.

pub mod controller;
pub mod events;
pub mod ipc;
pub mod resolver;

pub use controller::{PlayerController, PlayerSignal, PlayerState};
pub use events::{EndReason, PlayerEvent};
pub use ipc::{MpvSession, PlayerTransport, SessionSettings};
pub use resolver::{StreamResolver, YtDlpResolver};
