//! Radio client control
//!
//! The radio client is an external process driven through a named pipe. This
//! module holds the typed command set, the pipe writer, process-table access,
//! the persisted status file and the lifecycle supervisor tying them together.

pub mod command;
pub mod event;
pub mod fifo;
pub mod process;
pub mod status_file;
pub mod supervisor;

pub use command::RadioCommand;
pub use event::RadioEvent;
pub use fifo::{CommandChannel, RadioPipe};
pub use process::{ProcessControl, SpawnSpec, SystemProcesses};
pub use status_file::{CachedStatus, StatusFile};
pub use supervisor::{
    CommandOutcome, RadioState, RadioStatus, RadioSupervisor, StartReport, StopReport, StopStep,
    SupervisorSettings,
};
