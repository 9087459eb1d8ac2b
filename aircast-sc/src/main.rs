//! Aircast stream caster - main entry point
//!
//! Wires the pieces together: load the persisted snapshot, build the
//! playback engine, start the watcher and the persistence task, then serve
//! the HTTP control API until a shutdown signal arrives. On shutdown the
//! watcher is joined and any live encoder terminated before the process
//! exits.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aircast_common::config::{load_snapshot, save_snapshot};
use aircast_sc::config::{resolve_ffprobe, Config};
use aircast_sc::engine::Player;
use aircast_sc::{api, persist};

/// Command-line arguments for aircast-sc
#[derive(Parser, Debug)]
#[command(name = "aircast-sc")]
#[command(about = "Unattended RTMP stream caster")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5870", env = "AIRCAST_PORT")]
    port: u16,

    /// Persisted state file
    #[arg(short, long, default_value = "aircast_state.json", env = "AIRCAST_STATE_FILE")]
    state_file: PathBuf,

    /// ffmpeg binary
    #[arg(long, default_value = "ffmpeg", env = "FFMPEG_PATH")]
    ffmpeg_path: PathBuf,

    /// ffprobe binary (derived from the ffmpeg path when omitted)
    #[arg(long, env = "FFPROBE_PATH")]
    ffprobe_path: Option<PathBuf>,

    /// Destination used until the API configures one
    #[arg(
        long,
        default_value = "rtmp://example.com/live/streamkey",
        env = "DEFAULT_RTMP_URL"
    )]
    rtmp_url: String,

    /// Output frame size
    #[arg(long, default_value = "1920x1080", env = "VIDEO_SIZE")]
    video_size: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aircast_sc=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = Config {
        port: args.port,
        state_file: args.state_file,
        ffprobe_path: resolve_ffprobe(&args.ffmpeg_path, args.ffprobe_path.as_deref()),
        ffmpeg_path: args.ffmpeg_path,
        default_rtmp_url: args.rtmp_url,
        video_size: args.video_size,
        ..Config::default()
    };

    info!("Starting aircast stream caster on port {}", config.port);
    info!("State file: {}", config.state_file.display());

    // Hydrate the engine from the persisted snapshot, if any
    let persisted = load_snapshot(&config.state_file);
    if persisted.is_some() {
        info!("Loaded persisted state from {}", config.state_file.display());
    }

    let player = Arc::new(Player::new(&config, persisted));
    player.start().await;

    // Persist config changes as they happen
    let saver = persist::spawn_saver(config.state_file.clone(), player.event_bus());

    // Serve the control API until a shutdown signal arrives
    api::server::run(&config, Arc::clone(&player), shutdown_signal()).await?;

    // Orderly teardown: join the watcher, stop the encoder, write a final
    // snapshot so the next run resumes from the latest state.
    player.shutdown().await;
    saver.abort();
    save_snapshot(&config.state_file, &player.persisted().await)
        .context("Failed to write final state snapshot")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
