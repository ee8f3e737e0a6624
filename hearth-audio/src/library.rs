//! Local music library
//!
//! The directory listing is the index: tracks are identified by path, with
//! title and artist taken from `Artist - Title.ext` file names. Every path
//! coming from a client is resolved against the canonical library root and
//! rejected if it escapes it.

use hearth_common::events::Track;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::LibraryConfig;
use crate::error::{Error, Result};
use crate::player::resolver::StreamResolver;

/// A playable file in the library
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibraryEntry {
    /// Path relative to the library root
    pub relative_path: PathBuf,
    pub track: Track,
    pub size_bytes: u64,
}

/// Music directory access
pub struct Library {
    root: PathBuf,
    extensions: Vec<String>,
    resolver: Arc<dyn StreamResolver>,
}

impl Library {
    pub fn new(config: &LibraryConfig, resolver: Arc<dyn StreamResolver>) -> Self {
        Self {
            root: config.music_dir.clone(),
            extensions: config
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            resolver,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All supported audio files, sorted by path
    pub async fn list(&self) -> Result<Vec<LibraryEntry>> {
        let root = self.canonical_root().await?;
        let extensions = self.extensions.clone();

        let entries = tokio::task::spawn_blocking(move || scan(&root, &extensions))
            .await
            .map_err(|e| Error::Internal(format!("library scan task failed: {}", e)))?;

        debug!("Library scan found {} tracks", entries.len());
        Ok(entries)
    }

    /// Resolve a client-supplied path to a playable file inside the library
    ///
    /// Accepts a path relative to the root or an absolute path under it.
    pub async fn resolve(&self, requested: &str) -> Result<PathBuf> {
        let requested = requested.trim();
        if requested.is_empty() {
            return Err(Error::BadRequest("path is empty".to_string()));
        }

        let root = self.canonical_root().await?;
        let candidate = Path::new(requested);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            if candidate
                .components()
                .any(|c| matches!(c, Component::ParentDir))
            {
                return Err(Error::BadRequest(format!(
                    "path escapes the library: {}",
                    requested
                )));
            }
            root.join(candidate)
        };

        let canonical = match tokio::fs::canonicalize(&joined).await {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("no such track: {}", requested)))
            }
            Err(e) => return Err(e.into()),
        };

        if !canonical.starts_with(&root) {
            return Err(Error::BadRequest(format!(
                "path escapes the library: {}",
                requested
            )));
        }
        if !tokio::fs::metadata(&canonical).await?.is_file() {
            return Err(Error::NotFound(format!("not a file: {}", requested)));
        }
        if !has_extension(&canonical, &self.extensions) {
            return Err(Error::BadRequest(format!(
                "unsupported file type: {}",
                requested
            )));
        }

        Ok(canonical)
    }

    /// Entry for an already resolved path
    pub async fn entry(&self, path: &Path) -> Result<LibraryEntry> {
        let root = self.canonical_root().await?;
        let metadata = tokio::fs::metadata(path).await?;
        Ok(LibraryEntry {
            relative_path: path.strip_prefix(&root).unwrap_or(path).to_path_buf(),
            track: track_from_path(path),
            size_bytes: metadata.len(),
        })
    }

    /// Remove a file from the library
    pub async fn delete(&self, requested: &str) -> Result<PathBuf> {
        let path = self.resolve(requested).await?;
        tokio::fs::remove_file(&path).await?;
        info!("Deleted library track {}", path.display());
        Ok(path)
    }

    /// Download a remote track into the library as `Artist - Title.<ext>`
    pub async fn save(&self, id: &str, title: &str, artist: Option<&str>) -> Result<LibraryEntry> {
        let stem = file_stem_for(title, artist)?;
        let root = self.canonical_root().await?;

        let downloaded = self.resolver.download(id, &root, &stem).await?;
        let path = self
            .resolve(&downloaded.to_string_lossy())
            .await
            .map_err(|e| {
                warn!("Downloaded file {} not usable: {}", downloaded.display(), e);
                e
            })?;

        info!("Saved {} to library as {}", id, path.display());
        self.entry(&path).await
    }

    async fn canonical_root(&self) -> Result<PathBuf> {
        match tokio::fs::canonicalize(&self.root).await {
            Ok(root) => Ok(root),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
                "music directory {} does not exist",
                self.root.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

fn scan(root: &Path, extensions: &[String]) -> Vec<LibraryEntry> {
    let mut entries = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    for entry in walker {
        match entry {
            Ok(entry) => {
                if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
                    continue;
                }
                let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
                entries.push(LibraryEntry {
                    relative_path: entry
                        .path()
                        .strip_prefix(root)
                        .unwrap_or(entry.path())
                        .to_path_buf(),
                    track: track_from_path(entry.path()),
                    size_bytes,
                });
            }
            Err(e) => warn!("Error accessing library entry: {}", e),
        }
    }

    entries
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .map(|ext| extensions.iter().any(|allowed| *allowed == ext))
        .unwrap_or(false)
}

/// Track metadata from an `Artist - Title.ext` file name
pub fn track_from_path(path: &Path) -> Track {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (artist, title) = match stem.split_once(" - ") {
        Some((artist, title)) if !artist.trim().is_empty() && !title.trim().is_empty() => {
            (Some(artist.trim().to_string()), title.trim().to_string())
        }
        _ => (None, stem.trim().to_string()),
    };

    let mut track = Track::new(path.to_string_lossy(), title);
    track.artist = artist;
    track
}

/// File stem for a saved track, stripped of path separators and control characters
fn file_stem_for(title: &str, artist: Option<&str>) -> Result<String> {
    let clean = |s: &str| -> String {
        s.chars()
            .map(|c| match c {
                '/' | '\\' | ':' => '_',
                c if c.is_control() => ' ',
                c => c,
            })
            .collect::<String>()
            .trim()
            .trim_start_matches('.')
            .to_string()
    };

    let title = clean(title);
    if title.is_empty() {
        return Err(Error::BadRequest("title is required".to_string()));
    }

    Ok(match artist.map(clean).filter(|a| !a.is_empty()) {
        Some(artist) => format!("{} - {}", artist, title),
        None => title,
    })
}
