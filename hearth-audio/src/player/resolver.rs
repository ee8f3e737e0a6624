//! Stream resolution for on-demand tracks
//!
//! Remote tracks are stored by canonical id; the playable URL behind an id
//! expires, so it is resolved right before every load and never cached.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ResolverConfig;
use crate::error::{Error, Result};

/// Maps canonical track ids to playable resources
#[async_trait]
pub trait StreamResolver: Send + Sync {
    /// Fresh stream URL for `id`
    async fn resolve(&self, id: &str) -> Result<String>;

    /// Download the audio for `id` into `dir` as `<stem>.<ext>`; returns the file path
    async fn download(&self, id: &str, dir: &Path, stem: &str) -> Result<PathBuf>;
}

/// Resolver backed by a yt-dlp-compatible command-line tool
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    binary: PathBuf,
    format: String,
    resolve_timeout: Duration,
    download_timeout: Duration,
}

impl YtDlpResolver {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            format: config.format.clone(),
            resolve_timeout: config.resolve_timeout(),
            download_timeout: config.download_timeout(),
        }
    }

    async fn run(&self, args: &[String], timeout: Duration, label: &str) -> Result<String> {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| Error::timeout(label, timeout))?
            .map_err(|e| {
                Error::Resolver(format!("failed to run {}: {}", self.binary.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Resolver(format!(
                "{} failed ({}): {}",
                label,
                output.status,
                last_line(&stderr).unwrap_or("no output")
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl StreamResolver for YtDlpResolver {
    async fn resolve(&self, id: &str) -> Result<String> {
        validate_id(id)?;
        let args = vec![
            "--no-playlist".to_string(),
            "-f".to_string(),
            self.format.clone(),
            "-g".to_string(),
            "--".to_string(),
            id.to_string(),
        ];
        let stdout = self.run(&args, self.resolve_timeout, "stream resolve").await?;

        let url = first_line(&stdout)
            .ok_or_else(|| Error::Resolver(format!("no stream URL returned for {}", id)))?;
        debug!("Resolved {} to a stream URL", id);
        Ok(url.to_string())
    }

    async fn download(&self, id: &str, dir: &Path, stem: &str) -> Result<PathBuf> {
        validate_id(id)?;
        tokio::fs::create_dir_all(dir).await?;

        let template = dir.join(format!("{}.%(ext)s", stem));
        let args = vec![
            "--no-playlist".to_string(),
            "-f".to_string(),
            self.format.clone(),
            "-x".to_string(),
            "-o".to_string(),
            template.to_string_lossy().into_owned(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            "--".to_string(),
            id.to_string(),
        ];
        let stdout = self.run(&args, self.download_timeout, "download").await?;

        let path = last_line(&stdout)
            .map(PathBuf::from)
            .ok_or_else(|| Error::Resolver(format!("download of {} reported no file", id)))?;
        info!("Downloaded {} to {}", id, path.display());
        Ok(path)
    }
}

/// Ids go to a child process argv; reject empty ids and option lookalikes
fn validate_id(id: &str) -> Result<()> {
    let id = id.trim();
    if id.is_empty() {
        return Err(Error::BadRequest("track id is empty".to_string()));
    }
    if id.starts_with('-') {
        return Err(Error::BadRequest(format!("invalid track id '{}'", id)));
    }
    Ok(())
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty()).last()
}
