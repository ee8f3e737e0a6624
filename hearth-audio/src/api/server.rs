//! HTTP server setup and routing
//!
//! Sets up the axum router with the control endpoints and the SSE stream.

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::service::AudioService;

use super::{handlers, sse};

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub service: Arc<AudioService>,
}

/// Build the router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health and combined status
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::get_status))

        // Radio client
        .route("/radio/start", post(handlers::radio_start))
        .route("/radio/stop", post(handlers::radio_stop))
        .route("/radio/command", post(handlers::radio_command))
        .route("/radio/status", get(handlers::radio_status))
        .route("/radio/event", post(handlers::radio_event))

        // On-demand player
        .route("/player/play", post(handlers::player_play))
        .route("/player/play-local", post(handlers::player_play_local))
        .route("/player/pause", post(handlers::player_pause))
        .route("/player/resume", post(handlers::player_resume))
        .route("/player/stop", post(handlers::player_stop))
        .route("/player/volume", post(handlers::player_volume))
        .route("/player/status", get(handlers::player_status))

        // Library
        .route(
            "/library",
            get(handlers::library_list).delete(handlers::library_delete),
        )
        .route("/library/save", post(handlers::library_save))

        // Look-ahead queue
        .route("/queue", get(handlers::queue_get).post(handlers::queue_add))
        .route("/queue/:slot", delete(handlers::queue_remove))

        // SSE event stream
        .route("/events", get(sse::event_stream))

        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

/// Run the HTTP API server until `shutdown` resolves
pub async fn run(
    config: &ServerConfig,
    ctx: AppContext,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid bind address {}: {}", config.bind, e)))?;

    let app = create_router(ctx);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
