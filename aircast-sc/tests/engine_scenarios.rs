//! End-to-end engine scenarios
//!
//! Drives the full engine (facade + watcher + supervisor) against stub
//! encoder processes: natural-end auto-advance, seek restarts, reorder
//! stability, removal of the playing track, and bounded crash recovery.

#![cfg(unix)]

mod helpers;

use aircast_common::types::PlayerStatus;
use helpers::*;
use std::time::Duration;

#[tokio::test]
async fn playlist_round_trips_through_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let player = player_with(dir.path(), RUNS_UNTIL_STOPPED, &["a.mp3", "b.mp3", "c.mp3"]).await;

    let snapshot = player.get_state().await;
    assert_eq!(snapshot.playlist, vec!["a.mp3", "b.mp3", "c.mp3"]);
    assert_eq!(snapshot.track_durations.len(), 3);
    assert_eq!(snapshot.status, PlayerStatus::Stopped);
    assert_eq!(snapshot.current_track_index, None);

    player.shutdown().await;
}

#[tokio::test]
async fn natural_end_advances_to_next_track() {
    // Scenario A: first track ends cleanly, watcher advances and restarts.
    let dir = tempfile::tempdir().unwrap();
    let player = player_with(dir.path(), ENDS_NATURALLY, &["a.mp3", "b.mp3"]).await;

    player.play().await.unwrap();
    let snapshot = player.get_state().await;
    assert_eq!(snapshot.status, PlayerStatus::Playing);
    assert_eq!(snapshot.current_track_index, Some(0));

    // Stub exits 0 after ~300ms; the watcher should advance to index 1 and
    // spawn a fresh encoder with the clock reset.
    let advanced = wait_for(&player, Duration::from_secs(3), |s| {
        s.current_track_index == Some(1) && s.status == PlayerStatus::Playing
    })
    .await;
    assert_eq!(advanced.current_track_index, Some(1));
    assert_eq!(advanced.current_track.as_deref(), Some("b.mp3"));
    assert!(advanced.position_sec < 1.5, "clock was not reset: {}", advanced.position_sec);
    assert_eq!(count_log_lines(&player, "Advancing to next track"), 1);

    // Second track also ends naturally; the playlist is exhausted and the
    // engine stops instead of wrapping around.
    let done = wait_for(&player, Duration::from_secs(3), |s| {
        s.status == PlayerStatus::Stopped
    })
    .await;
    assert_eq!(done.status, PlayerStatus::Stopped);
    assert!(!done.encoder_live);
    assert_eq!(count_log_lines(&player, "Playlist exhausted"), 1);

    player.shutdown().await;
}

#[tokio::test]
async fn seek_restarts_encoder_at_offset() {
    // Scenario B: seeking while playing relaunches the encoder and the
    // position tracks the new offset monotonically.
    let dir = tempfile::tempdir().unwrap();
    let player = player_with(dir.path(), RUNS_UNTIL_STOPPED, &["a.mp3"]).await;

    player.play().await.unwrap();
    assert_eq!(count_log_lines(&player, "Launching ffmpeg encoder"), 1);

    player.seek(90.0).await.unwrap();
    assert_eq!(count_log_lines(&player, "Launching ffmpeg encoder"), 2);

    let snapshot = player.get_state().await;
    assert_eq!(snapshot.status, PlayerStatus::Playing);
    assert!(
        (90.0..91.0).contains(&snapshot.position_sec),
        "position right after seek: {}",
        snapshot.position_sec
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    let later = player.get_state().await;
    assert!(
        later.position_sec > snapshot.position_sec,
        "position must increase monotonically"
    );

    player.shutdown().await;
}

#[tokio::test]
async fn reorder_keeps_current_track_without_restart() {
    // Scenario C: moving the playing track does not touch the encoder.
    let dir = tempfile::tempdir().unwrap();
    let player = player_with(dir.path(), RUNS_UNTIL_STOPPED, &["a.mp3", "b.mp3"]).await;

    player.play_index(1).await.unwrap();
    let launches = count_log_lines(&player, "Launching ffmpeg encoder");

    player
        .reorder_playlist(vec!["b.mp3".to_string(), "a.mp3".to_string()])
        .await
        .unwrap();

    let snapshot = player.get_state().await;
    assert_eq!(snapshot.current_track_index, Some(0));
    assert_eq!(snapshot.current_track.as_deref(), Some("b.mp3"));
    assert_eq!(snapshot.status, PlayerStatus::Playing);
    assert!(snapshot.encoder_live);
    assert_eq!(
        count_log_lines(&player, "Launching ffmpeg encoder"),
        launches,
        "reorder must not restart the encoder"
    );

    player.shutdown().await;
}

#[tokio::test]
async fn removing_current_track_stops_playback() {
    // Scenario D: the engine never silently advances past a removed track.
    let dir = tempfile::tempdir().unwrap();
    let player = player_with(dir.path(), RUNS_UNTIL_STOPPED, &["a.mp3", "b.mp3"]).await;

    player.play().await.unwrap();
    player.remove_track("a.mp3".to_string()).await.unwrap();

    let snapshot = player.get_state().await;
    assert_eq!(snapshot.status, PlayerStatus::Stopped);
    assert_eq!(snapshot.current_track_index, None);
    assert!(!snapshot.encoder_live);
    assert_eq!(snapshot.playlist, vec!["b.mp3"]);

    player.shutdown().await;
}

#[tokio::test]
async fn crash_recovery_gives_up_after_bounded_retries() {
    // Scenario E: three abnormal exits in a row exhaust the retry budget.
    let dir = tempfile::tempdir().unwrap();
    let player = player_with(dir.path(), CRASHES, &["a.mp3"]).await;

    player.play().await.unwrap();

    let snapshot = wait_for(&player, Duration::from_secs(5), |s| {
        s.status == PlayerStatus::Error
    })
    .await;
    assert_eq!(snapshot.status, PlayerStatus::Error);
    assert!(!snapshot.encoder_live);
    assert_eq!(count_log_lines(&player, "Encoder exited abnormally"), 3);
    assert_eq!(count_log_lines(&player, "giving up"), 1);

    // No further automatic restarts once the budget is spent.
    let launches = count_log_lines(&player, "Launching ffmpeg encoder");
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(count_log_lines(&player, "Launching ffmpeg encoder"), launches);

    player.shutdown().await;
}

#[tokio::test]
async fn pause_remembers_offset_and_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let player = player_with(dir.path(), RUNS_UNTIL_STOPPED, &["a.mp3"]).await;

    player.play().await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    player.pause().await.unwrap();

    let paused = player.get_state().await;
    assert_eq!(paused.status, PlayerStatus::Paused);
    assert!(!paused.encoder_live);
    let frozen = paused.position_sec;
    assert!(frozen > 0.0);

    // Position stays frozen while paused.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let still_paused = player.get_state().await;
    assert!((still_paused.position_sec - frozen).abs() < 0.005);

    // Resume restarts the encoder near the remembered offset.
    player.play().await.unwrap();
    let resumed = player.get_state().await;
    assert_eq!(resumed.status, PlayerStatus::Playing);
    assert!(resumed.encoder_live);
    assert!(
        resumed.position_sec >= frozen && resumed.position_sec < frozen + 1.0,
        "resumed at {} after pausing at {}",
        resumed.position_sec,
        frozen
    );
    assert_eq!(count_log_lines(&player, "Launching ffmpeg encoder"), 2);

    player.shutdown().await;
}

#[tokio::test]
async fn pause_and_stop_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let player = player_with(dir.path(), RUNS_UNTIL_STOPPED, &["a.mp3"]).await;

    player.play().await.unwrap();
    player.pause().await.unwrap();
    player.pause().await.unwrap();
    assert_eq!(player.get_state().await.status, PlayerStatus::Paused);
    // Only the first pause touched the process.
    assert_eq!(count_log_lines(&player, "Terminating ffmpeg encoder"), 1);

    player.stop().await.unwrap();
    player.stop().await.unwrap();
    let snapshot = player.get_state().await;
    assert_eq!(snapshot.status, PlayerStatus::Stopped);
    assert_eq!(snapshot.position_sec, 0.0);
    // The encoder was already gone when stop arrived; no further process
    // operations happened.
    assert_eq!(count_log_lines(&player, "Terminating ffmpeg encoder"), 1);

    player.shutdown().await;
}

#[tokio::test]
async fn skip_races_resolve_to_a_single_winner() {
    // A skip_next arriving after the watcher already advanced re-validates
    // the now-current index instead of double-advancing: with a two-track
    // playlist either order leaves the engine on the last track or stopped,
    // never out of bounds.
    let dir = tempfile::tempdir().unwrap();
    let player = player_with(dir.path(), ENDS_NATURALLY, &["a.mp3", "b.mp3"]).await;

    player.play().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    // May land before or after the watcher's auto-advance.
    let _ = player.skip_next().await;

    let snapshot = wait_for(&player, Duration::from_secs(3), |s| {
        s.status == PlayerStatus::Stopped
    })
    .await;
    let len = snapshot.playlist.len();
    match snapshot.current_track_index {
        Some(i) => assert!(i < len, "index {} out of bounds (len {})", i, len),
        None => {}
    }

    player.shutdown().await;
}

#[tokio::test]
async fn validation_failures_leave_state_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let player = player_with(dir.path(), RUNS_UNTIL_STOPPED, &["a.mp3", "b.mp3"]).await;

    assert!(player.seek(-5.0).await.is_err());
    assert!(player.play_index(7).await.is_err());
    assert!(player
        .reorder_playlist(vec!["a.mp3".to_string(), "x.mp3".to_string()])
        .await
        .is_err());
    assert!(player.remove_track("nope.mp3".to_string()).await.is_err());

    let snapshot = player.get_state().await;
    assert_eq!(snapshot.status, PlayerStatus::Stopped);
    assert_eq!(snapshot.playlist, vec!["a.mp3", "b.mp3"]);
    assert_eq!(snapshot.current_track_index, None);
    assert!(!snapshot.encoder_live);

    player.shutdown().await;
}

#[tokio::test]
async fn shutdown_leaves_no_encoder_behind() {
    let dir = tempfile::tempdir().unwrap();
    let player = player_with(dir.path(), RUNS_UNTIL_STOPPED, &["a.mp3"]).await;

    player.play().await.unwrap();
    assert!(player.get_state().await.encoder_live);

    player.shutdown().await;
    let snapshot = player.get_state().await;
    assert!(!snapshot.encoder_live);
    assert_eq!(snapshot.status, PlayerStatus::Stopped);
}
