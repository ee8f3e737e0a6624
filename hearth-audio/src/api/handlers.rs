//! HTTP request handlers
//!
//! Thin adapters from JSON requests to [`AudioService`] calls. Errors map to
//! `(StatusCode, Json<StatusResponse>)`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use hearth_common::events::{PlaybackSource, QueueSlot, QueueSnapshot, Track};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::api::server::AppContext;
use crate::error::Error;
use crate::library::LibraryEntry;
use crate::player::PlayerState;
use crate::radio::{CommandOutcome, RadioCommand, RadioEvent, RadioStatus, StartReport, StopReport};
use crate::service::ServiceStatus;

type ApiError = (StatusCode, Json<StatusResponse>);
type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    fn ok() -> Json<Self> {
        Json(Self {
            status: "ok".to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    command: String,
    outcome: CommandOutcome,
}

#[derive(Debug, Deserialize)]
pub struct PlayRemoteRequest {
    id: String,
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    duration_secs: Option<f64>,
    cover_art: Option<String>,
}

impl PlayRemoteRequest {
    fn into_track(self) -> Track {
        let title = self.title.unwrap_or_else(|| self.id.clone());
        Track {
            id: self.id,
            title,
            artist: self.artist,
            album: self.album,
            duration_secs: self.duration_secs,
            cover_art: self.cover_art,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PathRequest {
    path: String,
}

#[derive(Debug, Serialize)]
pub struct TrackResponse {
    track: Track,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    volume: u8,
}

#[derive(Debug, Serialize)]
pub struct VolumeResponse {
    volume: u8,
}

#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    id: String,
    title: String,
    artist: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LibraryResponse {
    tracks: Vec<LibraryEntry>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    deleted: String,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    slot: QueueSlot,
    track: Track,
}

#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    removed: Option<Track>,
}

#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    active_source: PlaybackSource,
    #[serde(flatten)]
    status: RadioStatus,
}

// ============================================================================
// Error mapping
// ============================================================================

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::BadRequest(_) | Error::InvalidSlot(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::QueueFull | Error::ProcessNotFound(_) => StatusCode::CONFLICT,
        Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::StaleResourceExpired(_) | Error::Player(_) | Error::Resolver(_) => {
            StatusCode::BAD_GATEWAY
        }
        Error::Config(_) | Error::Io(_) | Error::Http(_) | Error::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn api_error(operation: &str, err: Error) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("{} failed: {}", operation, err);
    } else {
        warn!("{} rejected: {}", operation, err);
    }
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", err),
        }),
    )
}

// ============================================================================
// Health / Status
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "hearth-audio".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /status - active source plus every component's state
pub async fn get_status(State(ctx): State<AppContext>) -> Json<ServiceStatus> {
    Json(ctx.service.status().await)
}

// ============================================================================
// Radio
// ============================================================================

/// POST /radio/start
pub async fn radio_start(State(ctx): State<AppContext>) -> ApiResult<StartReport> {
    let report = ctx
        .service
        .start_radio()
        .await
        .map_err(|e| api_error("radio start", e))?;
    info!("Radio start: {:?}", report);
    Ok(Json(report))
}

/// POST /radio/stop
pub async fn radio_stop(State(ctx): State<AppContext>) -> ApiResult<StopReport> {
    let report = ctx
        .service
        .stop_radio()
        .await
        .map_err(|e| api_error("radio stop", e))?;
    info!("Radio stop: {:?}", report);
    Ok(Json(report))
}

/// POST /radio/command - body is a tagged command, e.g. `{"command":"next"}`
pub async fn radio_command(
    State(ctx): State<AppContext>,
    Json(command): Json<RadioCommand>,
) -> ApiResult<CommandResponse> {
    let outcome = ctx
        .service
        .radio_command(command)
        .await
        .map_err(|e| api_error("radio command", e))?;
    Ok(Json(CommandResponse {
        command: command.to_string(),
        outcome,
    }))
}

/// GET /radio/status - last published status, no probing
pub async fn radio_status(State(ctx): State<AppContext>) -> Json<SnapshotResponse> {
    Json(SnapshotResponse {
        active_source: ctx.service.broker().active(),
        status: ctx.service.radio().status(),
    })
}

/// POST /radio/event - radio client event hook
pub async fn radio_event(
    State(ctx): State<AppContext>,
    Json(event): Json<RadioEvent>,
) -> Json<StatusResponse> {
    ctx.service.radio_event(&event);
    StatusResponse::ok()
}

// ============================================================================
// Player
// ============================================================================

/// POST /player/play - resolve and play a remote track
pub async fn player_play(
    State(ctx): State<AppContext>,
    Json(request): Json<PlayRemoteRequest>,
) -> ApiResult<TrackResponse> {
    let track = request.into_track();
    ctx.service
        .play_remote(track.clone())
        .await
        .map_err(|e| api_error("play remote", e))?;
    Ok(Json(TrackResponse { track }))
}

/// POST /player/play-local - play a library file
pub async fn player_play_local(
    State(ctx): State<AppContext>,
    Json(request): Json<PathRequest>,
) -> ApiResult<TrackResponse> {
    let track = ctx
        .service
        .play_local(&request.path)
        .await
        .map_err(|e| api_error("play local", e))?;
    Ok(Json(TrackResponse { track }))
}

/// POST /player/pause
pub async fn player_pause(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    ctx.service
        .pause()
        .await
        .map_err(|e| api_error("pause", e))?;
    Ok(StatusResponse::ok())
}

/// POST /player/resume
pub async fn player_resume(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    ctx.service
        .resume()
        .await
        .map_err(|e| api_error("resume", e))?;
    Ok(StatusResponse::ok())
}

/// POST /player/stop
pub async fn player_stop(State(ctx): State<AppContext>) -> ApiResult<StatusResponse> {
    ctx.service
        .stop_on_demand()
        .await
        .map_err(|e| api_error("stop", e))?;
    Ok(StatusResponse::ok())
}

/// POST /player/volume
pub async fn player_volume(
    State(ctx): State<AppContext>,
    Json(request): Json<VolumeRequest>,
) -> ApiResult<VolumeResponse> {
    ctx.service
        .set_volume(request.volume)
        .await
        .map_err(|e| api_error("set volume", e))?;
    Ok(Json(VolumeResponse {
        volume: request.volume,
    }))
}

/// GET /player/status
pub async fn player_status(State(ctx): State<AppContext>) -> Json<PlayerState> {
    Json(ctx.service.player().state())
}

// ============================================================================
// Library
// ============================================================================

/// GET /library
pub async fn library_list(State(ctx): State<AppContext>) -> ApiResult<LibraryResponse> {
    let tracks = ctx
        .service
        .library_list()
        .await
        .map_err(|e| api_error("library list", e))?;
    Ok(Json(LibraryResponse { tracks }))
}

/// POST /library/save - download a remote track into the library
pub async fn library_save(
    State(ctx): State<AppContext>,
    Json(request): Json<SaveRequest>,
) -> ApiResult<LibraryEntry> {
    let entry = ctx
        .service
        .library_save(&request.id, &request.title, request.artist.as_deref())
        .await
        .map_err(|e| api_error("library save", e))?;
    Ok(Json(entry))
}

/// DELETE /library?path=...
pub async fn library_delete(
    State(ctx): State<AppContext>,
    Query(request): Query<PathRequest>,
) -> ApiResult<DeleteResponse> {
    let deleted = ctx
        .service
        .library_delete(&request.path)
        .await
        .map_err(|e| api_error("library delete", e))?;
    Ok(Json(DeleteResponse {
        deleted: deleted.to_string_lossy().into_owned(),
    }))
}

// ============================================================================
// Queue
// ============================================================================

/// GET /queue
pub async fn queue_get(State(ctx): State<AppContext>) -> Json<QueueSnapshot> {
    Json(ctx.service.queue().await)
}

/// POST /queue - add a library file to the next free slot
pub async fn queue_add(
    State(ctx): State<AppContext>,
    Json(request): Json<PathRequest>,
) -> ApiResult<EnqueueResponse> {
    let (slot, track) = ctx
        .service
        .enqueue(&request.path)
        .await
        .map_err(|e| api_error("enqueue", e))?;
    Ok(Json(EnqueueResponse { slot, track }))
}

/// DELETE /queue/:slot
pub async fn queue_remove(
    State(ctx): State<AppContext>,
    Path(slot): Path<String>,
) -> ApiResult<RemoveResponse> {
    let removed = ctx
        .service
        .remove_slot(&slot)
        .await
        .map_err(|e| api_error("queue remove", e))?;
    Ok(Json(RemoveResponse { removed }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_for(&Error::QueueFull), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&Error::InvalidSlot("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::timeout("probe", std::time::Duration::from_secs(1))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&Error::StaleResourceExpired("id".to_string())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&Error::NotFound("x".to_string())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_play_request_defaults_title_to_id() {
        let request: PlayRemoteRequest = serde_json::from_str(r#"{"id":"abc"}"#).unwrap();
        let track = request.into_track();
        assert_eq!(track.id, "abc");
        assert_eq!(track.title, "abc");
    }
}
