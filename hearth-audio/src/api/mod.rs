//! REST API and real-time channel

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, run, AppContext};
