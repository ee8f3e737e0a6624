//! On-disk mirror of the radio client's cached status
//!
//! A single JSON file, rewritten atomically (temp file then rename) on every
//! explicit transition. It lets a restarted controller resume with the last
//! belief; it is not a multi-writer store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;

/// Cached belief about the radio client process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedStatus {
    /// Believed to have a live process
    pub running: bool,
    /// Believed to be producing sound
    pub playing: bool,
    /// PID of the spawned or adopted process, if known
    #[serde(default)]
    pub pid: Option<u32>,
    /// Last successful command write or spawn
    #[serde(default)]
    pub last_write: Option<DateTime<Utc>>,
    /// Last process-table probe
    #[serde(default)]
    pub last_verified: Option<DateTime<Utc>>,
}

impl CachedStatus {
    /// Belief after the process is gone
    pub fn stopped(&self) -> Self {
        Self {
            running: false,
            playing: false,
            pid: None,
            last_write: self.last_write,
            last_verified: self.last_verified,
        }
    }
}

/// JSON status file
#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "status.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Read the last stored status; missing or unreadable files yield None
    pub async fn load(&self) -> Option<CachedStatus> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read status file {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("Ignoring corrupt status file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Atomically replace the stored status
    pub async fn store(&self, status: &CachedStatus) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(status)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, &json).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!("Stored radio status to {}", self.path.display());
        Ok(())
    }
}
