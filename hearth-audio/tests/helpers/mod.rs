//! Test helper modules for hearth-audio integration tests
//!
//! Provides in-memory stand-ins for the service's external collaborators:
//! - FakeProcesses / FakePipe: process table and control pipe of the radio client
//! - FakeTransport: player IPC that answers loads with events
//! - FakeResolver: stream resolver that never touches the network
//! - TestHarness: a wired-up AudioService over the fakes in a temp directory

#![allow(dead_code)]

pub mod fakes;
pub mod harness;

// Re-export commonly used types
pub use fakes::{EventLog, FakePipe, FakeProcesses, FakeResolver, FakeTransport};
pub use harness::{wait_until, TestHarness};
