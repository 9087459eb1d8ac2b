//! HTTP server setup and routing
//!
//! Sets up the Axum server with routes for the control endpoints and the
//! SSE event stream. Authentication, uploads and the browser UI are out of
//! scope; the API is the raw control surface over the engine.

use crate::config::Config;
use crate::engine::Player;
use crate::error::{Error, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub player: Arc<Player>,
}

/// Build the application router with all routes attached.
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))
        // State and logs
        .route("/api/state", get(super::handlers::get_state))
        .route("/api/logs", get(super::handlers::get_logs))
        // Playback control
        .route("/api/play", post(super::handlers::play))
        .route("/api/pause", post(super::handlers::pause))
        .route("/api/stop", post(super::handlers::stop))
        .route("/api/next", post(super::handlers::skip_next))
        .route("/api/seek", post(super::handlers::seek))
        .route("/api/play_index", post(super::handlers::play_index))
        // Playlist editing
        .route("/api/playlist", post(super::handlers::set_playlist))
        .route("/api/playlist/order", post(super::handlers::reorder_playlist))
        .route("/api/playlist/append", post(super::handlers::append_track))
        .route("/api/playlist/remove", post(super::handlers::remove_track))
        // Stream configuration
        .route("/api/video", post(super::handlers::set_video))
        .route("/api/overlay", post(super::handlers::set_overlay))
        .route("/api/rtmp", post(super::handlers::set_rtmp))
        .route("/api/ffmpeg_path", post(super::handlers::set_ffmpeg_path))
        .route("/api/encoder", post(super::handlers::set_encoder_settings))
        // SSE event stream
        .route("/events", get(super::sse::event_stream))
        // Attach application context
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local control panels
        .layer(CorsLayer::permissive())
}

/// Run the HTTP API server until `shutdown` resolves.
pub async fn run(
    config: &Config,
    player: Arc<Player>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_router(AppContext { player });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
