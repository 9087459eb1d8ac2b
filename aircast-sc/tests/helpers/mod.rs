//! Shared test helpers
//!
//! The engine is exercised against small shell scripts standing in for the
//! ffmpeg binary, so real child processes flow through the supervisor and
//! the watcher: one that runs until terminated, one that ends like a track
//! running out of audio, and one that fails like a rejected RTMP publish.

#![allow(dead_code)]

use aircast_sc::config::Config;
use aircast_sc::engine::Player;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Stub that keeps streaming until it is told to stop.
pub const RUNS_UNTIL_STOPPED: &str = "#!/bin/sh\nexec sleep 30\n";

/// Stub that reaches its natural end shortly after starting.
pub const ENDS_NATURALLY: &str = "#!/bin/sh\nsleep 0.3\nexit 0\n";

/// Stub that exits abnormally right away.
pub const CRASHES: &str = "#!/bin/sh\nexit 1\n";

/// Write an executable stub encoder into `dir`.
pub fn stub_encoder(dir: &Path, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-ffmpeg");
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Configuration tuned for fast tests: tight poll interval, short grace
/// period, small crash backoff. ffprobe points at a missing binary so
/// durations stay unknown unless a test says otherwise.
pub fn test_config(dir: &Path, ffmpeg: &Path) -> Config {
    Config {
        port: 0,
        state_file: dir.join("state.json"),
        ffmpeg_path: ffmpeg.to_path_buf(),
        ffprobe_path: dir.join("missing-ffprobe"),
        default_rtmp_url: "rtmp://127.0.0.1/live/test".to_string(),
        video_size: "640x360".to_string(),
        stop_grace: Duration::from_millis(500),
        watch_interval: Duration::from_millis(50),
        crash_max_failures: 3,
        crash_backoff: Duration::from_millis(50),
    }
}

/// Build and start a player driving the given stub script, with the given
/// playlist preloaded.
pub async fn player_with(
    dir: &Path,
    script: &str,
    playlist: &[&str],
) -> Arc<Player> {
    let ffmpeg = stub_encoder(dir, script);
    let config = test_config(dir, &ffmpeg);
    let player = Arc::new(Player::new(&config, None));
    player.start().await;
    player
        .set_playlist(playlist.iter().map(|s| s.to_string()).collect())
        .await
        .unwrap();
    player
}

/// Poll `get_state` until `pred` holds or the timeout elapses; returns the
/// last observed snapshot either way.
pub async fn wait_for(
    player: &Arc<Player>,
    timeout: Duration,
    pred: impl Fn(&aircast_common::types::PlayerSnapshot) -> bool,
) -> aircast_common::types::PlayerSnapshot {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let snapshot = player.get_state().await;
        if pred(&snapshot) || tokio::time::Instant::now() >= deadline {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Count log lines containing `needle`.
pub fn count_log_lines(player: &Arc<Player>, needle: &str) -> usize {
    player
        .logs(0)
        .iter()
        .filter(|line| line.contains(needle))
        .count()
}
