//! Hearth Audio (hearth-audio) - Main entry point
//!
//! Serves the audio arbitration API: radio client supervision, on-demand
//! playback with a look-ahead queue, and a real-time SSE channel.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hearth_audio::api::{self, AppContext};
use hearth_audio::{AudioService, Config};

/// Command-line arguments for hearth-audio
#[derive(Parser, Debug)]
#[command(name = "hearth-audio")]
#[command(about = "Audio arbitration service for the Hearth home controller")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "HEARTH_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "HEARTH_AUDIO_PORT")]
    port: Option<u16>,

    /// Music library directory (overrides the config file)
    #[arg(short, long, env = "HEARTH_MUSIC_DIR")]
    music_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(music_dir) = args.music_dir {
        config.library.music_dir = music_dir;
    }

    // Initialize tracing
    let default_filter = format!("hearth_audio={},tower_http=info", config.logging.level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Hearth Audio on {}:{}", config.server.bind, config.server.port);
    info!("Music directory: {}", config.library.music_dir.display());
    info!("Radio command pipe: {}", config.radio.fifo_path.display());

    let service = AudioService::from_config(&config);
    service
        .restore()
        .await
        .context("Failed to restore previous state")?;
    info!("Audio service initialized");

    let ctx = AppContext {
        service: service.clone(),
    };
    api::run(&config.server, ctx, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    service.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
