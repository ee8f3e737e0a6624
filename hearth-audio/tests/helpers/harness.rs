//! AudioService wired to fakes
//!
//! Each harness owns a temp directory holding the music library, the control
//! pipe path and the radio status file. Timeouts are shortened so stop
//! escalation completes in well under a second.

use hearth_audio::radio::CachedStatus;
use hearth_audio::service::ServiceParts;
use hearth_audio::{AudioService, Config};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

use super::fakes::{EventLog, FakePipe, FakeProcesses, FakeResolver, FakeTransport};

pub struct TestHarness {
    pub service: Arc<AudioService>,
    pub processes: Arc<FakeProcesses>,
    pub pipe: Arc<FakePipe>,
    pub transport: Arc<FakeTransport>,
    pub resolver: Arc<FakeResolver>,
    pub log: EventLog,
    pub config: Config,
    dir: TempDir,
}

impl TestHarness {
    /// Fresh service: no status file, empty process table, empty library
    pub fn new() -> Self {
        Self::with_previous_run(None, &[])
    }

    /// Service started after a previous run left `status` on disk while
    /// `running_pids` are in the process table
    pub fn with_previous_run(status: Option<CachedStatus>, running_pids: &[u32]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::create_dir_all(&config.library.music_dir).unwrap();

        if let Some(status) = status {
            let json = serde_json::to_string_pretty(&status).unwrap();
            std::fs::write(&config.radio.status_file, json).unwrap();
        }

        let log = EventLog::new();
        let processes = Arc::new(FakeProcesses::new(log.clone()));
        for &pid in running_pids {
            processes.insert_running(pid);
        }
        let pipe = Arc::new(FakePipe::new(Arc::clone(&processes), log.clone()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(FakeTransport::new(events_tx, log.clone()));
        let resolver = Arc::new(FakeResolver::default());

        let service = AudioService::new(
            &config,
            ServiceParts {
                processes: processes.clone(),
                pipe: pipe.clone(),
                transport: transport.clone(),
                resolver: resolver.clone(),
            },
            events_rx,
        );

        Self {
            service,
            processes,
            pipe,
            transport,
            resolver,
            log,
            config,
            dir,
        }
    }

    pub fn music_dir(&self) -> &Path {
        &self.config.library.music_dir
    }

    pub fn status_file(&self) -> &Path {
        &self.config.radio.status_file
    }

    /// Write `<name>.mp3` into the library; returns the relative path
    pub fn add_track(&self, name: &str) -> String {
        let file_name = format!("{}.mp3", name);
        std::fs::write(self.music_dir().join(&file_name), b"fake mp3 data").unwrap();
        file_name
    }

    /// Absolute path of a library file as the service resolves it
    pub fn track_path(&self, file_name: &str) -> PathBuf {
        std::fs::canonicalize(self.music_dir().join(file_name)).unwrap()
    }

    pub fn temp_dir(&self) -> &Path {
        self.dir.path()
    }
}

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.library.music_dir = dir.join("music");
    config.radio.fifo_path = dir.join("ctl");
    config.radio.status_file = dir.join("radio_status.json");
    config.radio.probe_timeout_ms = 500;
    config.radio.step_wait_ms = 20;
    config.radio.stop_ceiling_ms = 2_000;
    config.player.load_timeout_ms = 1_000;
    config.broker.revoke_timeout_ms = 2_000;
    config.broadcast.progress_interval_ms = 0;
    config.broadcast.position_interval_ms = 0;
    config
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
