//! Configuration for the hearth-audio service
//!
//! Loaded once at startup from a TOML file. Every section and key is optional;
//! missing values use built-in defaults defined in code.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--port, --music-dir)
//! 2. TOML configuration file (--config, HEARTH_CONFIG, ~/.config/hearth/audio.toml)
//! 3. Built-in defaults (code constants)

use hearth_common::config::{
    default_data_dir, default_music_dir, load_toml, resolve_config_file, user_config_dir,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::Result;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "HEARTH_CONFIG";

/// Default config file name inside the platform config directory
pub const CONFIG_FILE_NAME: &str = "audio.toml";

/// Complete service configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub library: LibraryConfig,
    pub radio: RadioConfig,
    pub player: PlayerConfig,
    pub resolver: ResolverConfig,
    pub broker: BrokerConfig,
    pub broadcast: BroadcastConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Resolve and load the configuration file, falling back to defaults
    /// when none exists
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_file(cli_path, CONFIG_ENV_VAR, CONFIG_FILE_NAME)? {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Ok(load_toml(&path)?)
            }
            None => {
                info!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub bind: String,
    /// HTTP server port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5780,
        }
    }
}

/// Local music library configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Root of the library; the directory listing is the only index
    pub music_dir: PathBuf,
    /// File extensions listed as tracks (lowercase, without dot)
    pub extensions: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            music_dir: default_music_dir(),
            extensions: ["mp3", "m4a", "flac", "ogg", "opus", "wav", "webm", "aac"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Radio client supervision configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Executable to spawn
    pub binary: PathBuf,
    /// Extra arguments
    pub args: Vec<String>,
    /// Exact process name matched in the process table
    pub process_name: String,
    /// Named pipe the client reads commands from
    pub fifo_path: PathBuf,
    /// JSON file mirroring the cached status
    pub status_file: PathBuf,
    /// Optional file receiving the client's stdout/stderr
    pub log_file: Option<PathBuf>,
    /// Bound on a single pipe write attempt
    pub write_timeout_ms: u64,
    /// Bound on a single process-table probe or signal delivery
    pub probe_timeout_ms: u64,
    /// Wait between a stop step and its verification probe
    pub step_wait_ms: u64,
    /// Global ceiling for the whole stop sequence
    pub stop_ceiling_ms: u64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        let pianobar_dir = user_config_dir().join("pianobar");
        Self {
            binary: PathBuf::from("pianobar"),
            args: Vec::new(),
            process_name: "pianobar".to_string(),
            fifo_path: pianobar_dir.join("ctl"),
            status_file: default_data_dir().join("radio_status.json"),
            log_file: None,
            write_timeout_ms: 1_000,
            probe_timeout_ms: 2_000,
            step_wait_ms: 1_000,
            stop_ceiling_ms: 8_000,
        }
    }
}

impl RadioConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn step_wait(&self) -> Duration {
        Duration::from_millis(self.step_wait_ms)
    }

    pub fn stop_ceiling(&self) -> Duration {
        Duration::from_millis(self.stop_ceiling_ms)
    }
}

/// On-demand player configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Player executable (mpv-compatible JSON IPC)
    pub binary: PathBuf,
    /// Extra arguments appended after the built-in ones
    pub args: Vec<String>,
    /// IPC socket path
    pub socket_path: PathBuf,
    /// Bound on a single request/response round trip
    pub request_timeout_ms: u64,
    /// Bound on launching the player and connecting to its socket
    pub connect_timeout_ms: u64,
    /// Bound on waiting for a loaded file to start
    pub load_timeout_ms: u64,
    /// Volume applied when the player starts (0-100)
    pub initial_volume: u8,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("mpv"),
            args: Vec::new(),
            socket_path: default_data_dir().join("player.sock"),
            request_timeout_ms: 3_000,
            connect_timeout_ms: 5_000,
            load_timeout_ms: 15_000,
            initial_volume: 80,
        }
    }
}

impl PlayerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

/// Remote stream resolver configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// yt-dlp compatible executable
    pub binary: PathBuf,
    /// Format selector passed with -f
    pub format: String,
    /// Bound on resolving one id to a stream URL
    pub resolve_timeout_ms: u64,
    /// Bound on downloading one track into the library
    pub download_timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("yt-dlp"),
            format: "bestaudio".to_string(),
            resolve_timeout_ms: 20_000,
            download_timeout_ms: 300_000,
        }
    }
}

impl ResolverConfig {
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }
}

/// Audio broker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// How long acquire waits for the previous owner to release
    pub revoke_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            revoke_timeout_ms: 5_000,
        }
    }
}

impl BrokerConfig {
    pub fn revoke_timeout(&self) -> Duration {
        Duration::from_millis(self.revoke_timeout_ms)
    }
}

/// State broadcaster configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Events buffered per subscriber before it lags
    pub capacity: usize,
    /// Minimum interval between progress events on the main channel
    pub progress_interval_ms: u64,
    /// Minimum interval between opt-in position events
    pub position_interval_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            progress_interval_ms: 5_000,
            position_interval_ms: 500,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
