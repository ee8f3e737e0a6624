//! Named-pipe command channel for the radio client
//!
//! One-way: a command line is written and nothing is read back. A completed
//! write is the only success signal; whether the client acted on it shows up
//! later in the client's own event output.

use async_trait::async_trait;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::io::Write;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::pipe;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::radio::command::RadioCommand;

/// Permissions for a recreated pipe node; the client may run as another user
const FIFO_MODE: u32 = 0o666;

/// Destination for radio commands
#[async_trait]
pub trait RadioPipe: Send + Sync {
    /// Make sure the pipe node exists before the client is started
    async fn prepare(&self) -> Result<()>;

    /// Deliver one command
    async fn send(&self, command: &RadioCommand) -> Result<()>;
}

/// Named pipe (FIFO) writer with a bounded primary and fallback write path
#[derive(Debug, Clone)]
pub struct CommandChannel {
    fifo_path: PathBuf,
    write_timeout: Duration,
}

/// State of the pipe node on disk
#[derive(Debug, PartialEq, Eq)]
enum NodeState {
    Fifo,
    Missing,
    /// Something else (regular file, directory, socket) occupies the path
    Invalid,
}

impl CommandChannel {
    pub fn new(fifo_path: impl Into<PathBuf>, write_timeout: Duration) -> Self {
        Self {
            fifo_path: fifo_path.into(),
            write_timeout,
        }
    }

    pub fn fifo_path(&self) -> &Path {
        &self.fifo_path
    }

    async fn node_state(&self) -> Result<NodeState> {
        match tokio::fs::symlink_metadata(&self.fifo_path).await {
            Ok(meta) if meta.file_type().is_fifo() => Ok(NodeState::Fifo),
            Ok(_) => Ok(NodeState::Invalid),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(NodeState::Missing),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete whatever occupies the path and create a fresh FIFO
    async fn recreate(&self) -> Result<()> {
        match tokio::fs::symlink_metadata(&self.fifo_path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&self.fifo_path).await?,
            Ok(_) => tokio::fs::remove_file(&self.fifo_path).await?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Some(parent) = self.fifo_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        mkfifo(&self.fifo_path, Mode::from_bits_truncate(FIFO_MODE))
            .map_err(|e| Error::Io(std::io::Error::from(e)))?;
        // mkfifo is subject to umask
        tokio::fs::set_permissions(&self.fifo_path, std::fs::Permissions::from_mode(FIFO_MODE))
            .await?;

        info!("Created radio command pipe at {}", self.fifo_path.display());
        Ok(())
    }

    /// Ensure the node is a FIFO; returns true if it had to be recreated
    async fn ensure_fifo(&self) -> Result<bool> {
        match self.node_state().await? {
            NodeState::Fifo => Ok(false),
            state => {
                warn!(
                    "Radio command pipe {} is {:?}, recreating",
                    self.fifo_path.display(),
                    state
                );
                self.recreate().await?;
                Ok(true)
            }
        }
    }

    /// Primary path: async pipe sender; fails fast when no reader is attached
    async fn write_primary(&self, line: &str) -> Result<()> {
        let write = async {
            let mut sender = pipe::OpenOptions::new().open_sender(&self.fifo_path)?;
            sender.write_all(line.as_bytes()).await?;
            sender.flush().await?;
            Ok::<(), std::io::Error>(())
        };

        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Error::timeout("radio pipe write", self.write_timeout)),
        }
    }

    /// Fallback path: read-write, non-blocking open on the blocking pool
    ///
    /// Opening a FIFO read-write never waits for a reader, so this completes
    /// even while the client is between open() calls.
    async fn write_fallback(&self, line: &str) -> Result<()> {
        let path = self.fifo_path.clone();
        let bytes = line.as_bytes().to_vec();
        let write = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut file = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .custom_flags(OFlag::O_NONBLOCK.bits())
                .open(&path)?;
            file.write_all(&bytes)?;
            file.flush()
        });

        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(join_err)) => Err(Error::Internal(format!("pipe write task failed: {}", join_err))),
            Err(_) => Err(Error::timeout("radio pipe fallback write", self.write_timeout)),
        }
    }
}

#[async_trait]
impl RadioPipe for CommandChannel {
    async fn prepare(&self) -> Result<()> {
        self.ensure_fifo().await.map(|_| ())
    }

    async fn send(&self, command: &RadioCommand) -> Result<()> {
        let line = command.to_wire();
        let mut recreated = self.ensure_fifo().await?;

        match self.write_primary(&line).await {
            Ok(()) => {
                debug!("Sent radio command {}", command);
                return Ok(());
            }
            Err(e) => debug!("Primary pipe write failed for {}: {}", command, e),
        }

        loop {
            match self.write_fallback(&line).await {
                Ok(()) => {
                    debug!("Sent radio command {} via fallback path", command);
                    return Ok(());
                }
                Err(Error::Io(e)) if !recreated && e.kind() == std::io::ErrorKind::NotFound => {
                    warn!("Radio command pipe vanished during write, recreating once");
                    self.recreate().await?;
                    recreated = true;
                }
                Err(e) => {
                    warn!("Failed to send radio command {}: {}", command, e);
                    return Err(e);
                }
            }
        }
    }
}
