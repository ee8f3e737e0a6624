//! Process-table access for the radio client
//!
//! [`ProcessControl`] is the seam between the supervisor's state machine and
//! the operating system. [`SystemProcesses`] implements it with `pgrep`/`pkill`
//! and direct `kill(2)` calls; tests substitute an in-memory table.

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// What to launch for the radio client
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub binary: PathBuf,
    pub args: Vec<String>,
    /// Append stdout/stderr here instead of discarding them
    pub log_file: Option<PathBuf>,
}

/// Operating-system process operations used by the supervisor
///
/// Implementations must not block the runtime; the supervisor additionally
/// bounds every call with its own timeout.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Spawn the process detached from the caller; returns its PID when known
    async fn spawn(&self, spec: &SpawnSpec) -> Result<Option<u32>>;

    /// PIDs of processes whose name matches `name` exactly
    async fn probe(&self, name: &str) -> Result<Vec<u32>>;

    /// Deliver `signal` to every process matching `name`
    async fn signal_all(&self, name: &str, signal: Signal) -> Result<()>;

    /// Deliver `signal` to one PID; `ProcessNotFound` if it no longer exists
    async fn signal_pid(&self, pid: u32, signal: Signal) -> Result<()>;
}

/// ProcessControl backed by the host's process table
#[derive(Debug, Clone)]
pub struct SystemProcesses {
    /// Bound on each pgrep/pkill invocation
    command_timeout: Duration,
}

impl SystemProcesses {
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<std::process::Output> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(self.command_timeout, command.output()).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(Error::timeout(
                format!("{} {}", program, args.join(" ")),
                self.command_timeout,
            )),
        }
    }
}

#[async_trait]
impl ProcessControl for SystemProcesses {
    async fn spawn(&self, spec: &SpawnSpec) -> Result<Option<u32>> {
        let (stdout, stderr) = match &spec.log_file {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                let err_file = file.try_clone()?;
                (Stdio::from(file), Stdio::from(err_file))
            }
            None => (Stdio::null(), Stdio::null()),
        };

        let mut command = Command::new(&spec.binary);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            // Own process group: signals aimed at this service don't reach it
            .process_group(0)
            .kill_on_drop(false);

        let child = command.spawn()?;
        let pid = child.id();
        info!("Spawned {} (pid {:?})", spec.binary.display(), pid);
        // Dropping the handle leaves the process running; tokio reaps it on exit
        drop(child);
        Ok(pid)
    }

    async fn probe(&self, name: &str) -> Result<Vec<u32>> {
        let output = self.run("pgrep", &["-x".to_string(), name.to_string()]).await?;

        // pgrep exits 1 when nothing matched
        match output.status.code() {
            Some(0) | Some(1) => {}
            other => {
                return Err(Error::Internal(format!(
                    "pgrep exited with {:?}: {}",
                    other,
                    String::from_utf8_lossy(&output.stderr).trim()
                )))
            }
        }

        let pids = parse_pid_list(&String::from_utf8_lossy(&output.stdout));
        debug!("Probe for '{}' found {:?}", name, pids);
        Ok(pids)
    }

    async fn signal_all(&self, name: &str, signal: Signal) -> Result<()> {
        let signal_arg = format!("-{}", signal.as_str().trim_start_matches("SIG"));
        let output = self
            .run("pkill", &[signal_arg, "-x".to_string(), name.to_string()])
            .await?;

        match output.status.code() {
            // 1 = nothing matched, which is what we want anyway
            Some(0) | Some(1) => Ok(()),
            other => Err(Error::Internal(format!(
                "pkill exited with {:?}: {}",
                other,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }

    async fn signal_pid(&self, pid: u32, signal: Signal) -> Result<()> {
        let raw = i32::try_from(pid)
            .map_err(|_| Error::BadRequest(format!("PID out of range: {}", pid)))?;
        match kill(Pid::from_raw(raw), signal) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(Error::ProcessNotFound(format!("pid {}", pid))),
            Err(e) => Err(Error::Internal(format!("kill({}, {}) failed: {}", pid, signal, e))),
        }
    }
}

/// Parse newline-separated PIDs, ignoring anything that isn't a number
pub fn parse_pid_list(text: &str) -> Vec<u32> {
    text.lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect()
}
