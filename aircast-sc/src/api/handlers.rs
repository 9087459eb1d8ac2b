//! HTTP request handlers
//!
//! Thin adapters between the HTTP surface and the engine facade: decode the
//! request, call the one matching `Player` operation, map the error. State
//! snapshots are serialized here, outside the engine lock.

use crate::api::server::AppContext;
use crate::error::Error;
use aircast_common::types::{EncoderSettingsPatch, PlayerSnapshot};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize)]
pub struct DetailResponse {
    detail: String,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// Number of trailing lines to return; defaults to 200
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    lines: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    seconds: f64,
}

#[derive(Debug, Deserialize)]
pub struct PlayIndexRequest {
    index: usize,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistRequest {
    files: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    path: String,
}

#[derive(Debug, Deserialize)]
pub struct OverlayRequest {
    text: String,
}

#[derive(Debug, Deserialize)]
pub struct RtmpRequest {
    url: String,
}

type HandlerError = (StatusCode, Json<DetailResponse>);

/// Map engine errors onto HTTP status codes. Validation failures are the
/// caller's fault; everything else is a server-side condition.
fn map_error(e: Error) -> HandlerError {
    let status = match &e {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Control operation failed: {}", e);
    }
    (
        status,
        Json(DetailResponse {
            detail: e.to_string(),
        }),
    )
}

fn ok() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

// ============================================================================
// Health / State / Logs
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "stream_caster".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/state - Full player snapshot
pub async fn get_state(State(ctx): State<AppContext>) -> Json<PlayerSnapshot> {
    Json(ctx.player.get_state().await)
}

/// GET /api/logs - Trailing console log lines
pub async fn get_logs(
    State(ctx): State<AppContext>,
    Query(query): Query<LogsQuery>,
) -> Json<LogsResponse> {
    Json(LogsResponse {
        lines: ctx.player.logs(query.limit.unwrap_or(200)),
    })
}

// ============================================================================
// Playback Control
// ============================================================================

/// POST /api/play - Start or resume streaming
pub async fn play(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.player.play().await.map_err(map_error)?;
    Ok(ok())
}

/// POST /api/pause - Stop the encoder, remember the position
pub async fn pause(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.player.pause().await.map_err(map_error)?;
    Ok(ok())
}

/// POST /api/stop - Stop streaming and reset the position
pub async fn stop(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.player.stop().await.map_err(map_error)?;
    Ok(ok())
}

/// POST /api/next - Skip to the next track
pub async fn skip_next(
    State(ctx): State<AppContext>,
) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.player.skip_next().await.map_err(map_error)?;
    Ok(ok())
}

/// POST /api/seek - Seek within the current track
pub async fn seek(
    State(ctx): State<AppContext>,
    Json(req): Json<SeekRequest>,
) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.player.seek(req.seconds).await.map_err(map_error)?;
    Ok(ok())
}

/// POST /api/play_index - Jump to a playlist index and play it
pub async fn play_index(
    State(ctx): State<AppContext>,
    Json(req): Json<PlayIndexRequest>,
) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.player.play_index(req.index).await.map_err(map_error)?;
    Ok(ok())
}

// ============================================================================
// Playlist Editing
// ============================================================================

/// POST /api/playlist - Replace the playlist
pub async fn set_playlist(
    State(ctx): State<AppContext>,
    Json(req): Json<PlaylistRequest>,
) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.player.set_playlist(req.files).await.map_err(map_error)?;
    Ok(ok())
}

/// POST /api/playlist/order - Reorder the playlist (same tracks only)
pub async fn reorder_playlist(
    State(ctx): State<AppContext>,
    Json(req): Json<PlaylistRequest>,
) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.player
        .reorder_playlist(req.files)
        .await
        .map_err(map_error)?;
    Ok(ok())
}

/// POST /api/playlist/append - Append one track
pub async fn append_track(
    State(ctx): State<AppContext>,
    Json(req): Json<TrackRequest>,
) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.player.append_track(req.path).await.map_err(map_error)?;
    Ok(ok())
}

/// POST /api/playlist/remove - Remove one track
pub async fn remove_track(
    State(ctx): State<AppContext>,
    Json(req): Json<TrackRequest>,
) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.player.remove_track(req.path).await.map_err(map_error)?;
    Ok(ok())
}

// ============================================================================
// Stream Configuration
// ============================================================================

/// POST /api/video - Set the looping background video
pub async fn set_video(
    State(ctx): State<AppContext>,
    Json(req): Json<TrackRequest>,
) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.player.set_video(req.path).await.map_err(map_error)?;
    Ok(ok())
}

/// POST /api/overlay - Set the overlay text (empty clears it)
pub async fn set_overlay(
    State(ctx): State<AppContext>,
    Json(req): Json<OverlayRequest>,
) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.player
        .set_overlay_text(req.text)
        .await
        .map_err(map_error)?;
    Ok(ok())
}

/// POST /api/rtmp - Set the stream destination
pub async fn set_rtmp(
    State(ctx): State<AppContext>,
    Json(req): Json<RtmpRequest>,
) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.player.set_rtmp(req.url).await.map_err(map_error)?;
    Ok(ok())
}

/// POST /api/ffmpeg_path - Set the encoder binary
pub async fn set_ffmpeg_path(
    State(ctx): State<AppContext>,
    Json(req): Json<TrackRequest>,
) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.player
        .set_ffmpeg_path(req.path)
        .await
        .map_err(map_error)?;
    Ok(ok())
}

/// POST /api/encoder - Update encoder quality settings (partial)
pub async fn set_encoder_settings(
    State(ctx): State<AppContext>,
    Json(patch): Json<EncoderSettingsPatch>,
) -> Result<Json<StatusResponse>, HandlerError> {
    ctx.player
        .update_encoder_settings(patch)
        .await
        .map_err(map_error)?;
    Ok(ok())
}
