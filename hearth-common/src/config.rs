//! Configuration file resolution and platform default locations

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Locate the TOML configuration file for a service.
///
/// Priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. User config directory (`~/.config/hearth/<file_name>`)
/// 4. System config directory (`/etc/hearth/<file_name>`)
///
/// Returns `Ok(None)` when nothing was supplied and no default file exists, so
/// callers fall back to built-in defaults. An explicitly supplied path that does
/// not exist is an error.
pub fn resolve_config_file(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return require_existing(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return require_existing(PathBuf::from(path));
        }
    }

    // Priority 3/4: platform locations
    Ok(default_config_candidates(file_name)
        .into_iter()
        .find(|candidate| candidate.is_file()))
}

fn require_existing(path: PathBuf) -> Result<Option<PathBuf>> {
    if path.is_file() {
        Ok(Some(path))
    } else {
        Err(Error::Config(format!("Config file not found: {:?}", path)))
    }
}

/// Candidate configuration file locations, most specific first
fn default_config_candidates(file_name: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("hearth").join(file_name));
    }
    if cfg!(unix) {
        candidates.push(PathBuf::from("/etc/hearth").join(file_name));
    }
    candidates
}

/// Get OS-dependent default data directory for runtime files
/// (status file, player IPC socket)
pub fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/hearth (or /var/lib/hearth for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("hearth"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/hearth"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("hearth"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/hearth"))
    } else {
        PathBuf::from("./hearth_data")
    }
}

/// Per-user configuration directory (`~/.config` on Linux), used to locate
/// other programs' config files such as the radio client's command pipe
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from("/etc"))
}

/// Get OS-dependent default music library directory
pub fn default_music_dir() -> PathBuf {
    dirs::audio_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Music")))
        .unwrap_or_else(|| PathBuf::from("./music"))
}

/// Load and parse a TOML file into any deserializable config type
pub fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}
