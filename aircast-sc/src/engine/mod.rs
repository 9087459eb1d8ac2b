//! Playback orchestration engine
//!
//! The engine owns the playlist, the playback clock, the encoder process
//! and the encoder configuration behind a single lock. Every mutating
//! operation, whether it comes from a control caller or from the watcher's
//! auto-advance/recovery logic, runs inside that one critical section, so
//! concurrent commands serialize cleanly: whichever acquires the lock first
//! wins and the loser observes the already-updated state.
//!
//! Process spawn and termination happen while holding the lock; both are
//! bounded, termination by the grace-period timeout. Output draining and
//! duration probing stay off the lock entirely.

pub mod clock;
pub mod encoder;
pub mod logs;
pub mod playlist;
pub mod probe;
mod watcher;

use crate::config::Config;
use crate::error::{Error, Result};
use aircast_common::config::PersistedConfig;
use aircast_common::events::{EventBus, StreamEvent};
use aircast_common::types::{EncoderSettingsPatch, PlayerSnapshot, PlayerStatus};
use self::clock::PlaybackClock;
use self::encoder::{EncoderConfig, EncoderSupervisor};
use self::logs::LogSink;
use self::playlist::{Playlist, RemoveOutcome};
use self::probe::DurationProbe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;
pub(crate) use self::watcher::WatcherSettings;

/// All mutable player state, guarded by one lock
pub(crate) struct PlayerCore {
    pub(crate) playlist: Playlist,
    pub(crate) status: PlayerStatus,
    pub(crate) clock: PlaybackClock,
    pub(crate) encoder: EncoderSupervisor,
    pub(crate) config: EncoderConfig,
    /// Consecutive abnormal encoder exits for the current track
    pub(crate) failures: u32,
}

impl PlayerCore {
    /// Spawn the encoder for the currently selected track.
    pub(crate) fn start_current(&mut self, offset: f64, logs: &LogSink) -> Result<()> {
        let track = self
            .playlist
            .current_track()
            .cloned()
            .ok_or_else(|| Error::Validation("no track selected".to_string()))?;
        self.encoder.start(&self.config, &track, offset, logs)
    }

    /// Durable configuration record for the persistence collaborator.
    pub(crate) fn persisted(&self) -> PersistedConfig {
        PersistedConfig {
            rtmp_url: self.config.rtmp_url.clone(),
            ffmpeg_path: self.config.ffmpeg_path.to_string_lossy().into_owned(),
            video_file: self
                .config
                .video_file
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            overlay_text: self.config.overlay_text.clone(),
            playlist: self
                .playlist
                .paths()
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            settings: Some(self.config.settings.clone()),
        }
    }

    /// Duration of the current track from a parallel durations array.
    pub(crate) fn current_duration(&self, durations: &[Option<f64>]) -> Option<f64> {
        self.playlist
            .current_index()
            .and_then(|i| durations.get(i).copied())
            .flatten()
    }

    /// Build the immutable state snapshot.
    pub(crate) fn snapshot(&self, track_durations: Vec<Option<f64>>) -> PlayerSnapshot {
        let current_duration = self.current_duration(&track_durations);
        let encoder_live = self.encoder.is_live();
        PlayerSnapshot {
            status: self.status,
            rtmp_url: self.config.rtmp_url.clone(),
            ffmpeg_path: self.config.ffmpeg_path.to_string_lossy().into_owned(),
            video_file: self
                .config
                .video_file
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            overlay_text: self.config.overlay_text.clone(),
            playlist: self
                .playlist
                .paths()
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            current_track_index: self.playlist.current_index(),
            current_track: self
                .playlist
                .current_track()
                .map(|p| p.to_string_lossy().into_owned()),
            position_sec: self.clock.position_clamped(current_duration),
            track_durations,
            audio_live: encoder_live,
            video_live: encoder_live && self.config.video_file.is_some(),
            encoder_live,
            settings: self.config.settings.clone(),
        }
    }
}

/// Control facade over the playback engine
///
/// Cheap to share via `Arc`; every public operation serializes on the
/// internal lock.
pub struct Player {
    core: Arc<Mutex<PlayerCore>>,
    events: EventBus,
    logs: LogSink,
    probe: Arc<DurationProbe>,
    running: Arc<AtomicBool>,
    watcher: std::sync::Mutex<Option<JoinHandle<()>>>,
    watcher_settings: WatcherSettings,
}

impl Player {
    /// Assemble the engine from the runtime configuration, hydrated from a
    /// previously persisted snapshot when one exists.
    pub fn new(config: &Config, persisted: Option<PersistedConfig>) -> Self {
        let persisted = persisted.unwrap_or_default();

        let rtmp_url = if persisted.rtmp_url.is_empty() {
            config.default_rtmp_url.clone()
        } else {
            persisted.rtmp_url
        };
        let ffmpeg_path = if persisted.ffmpeg_path.is_empty() {
            config.ffmpeg_path.clone()
        } else {
            PathBuf::from(persisted.ffmpeg_path)
        };

        let encoder_config = EncoderConfig {
            rtmp_url,
            ffmpeg_path,
            video_file: persisted.video_file.map(PathBuf::from),
            overlay_text: persisted.overlay_text.filter(|t| !t.trim().is_empty()),
            video_size: config.video_size.clone(),
            settings: persisted.settings.unwrap_or_default(),
        };

        let playlist = Playlist::new(persisted.playlist.iter().map(PathBuf::from).collect());

        let core = PlayerCore {
            playlist,
            status: PlayerStatus::Stopped,
            clock: PlaybackClock::default(),
            encoder: EncoderSupervisor::new(config.stop_grace),
            config: encoder_config,
            failures: 0,
        };

        let poll_ms = config.watch_interval.as_millis().max(1) as u64;
        let watcher_settings = WatcherSettings {
            poll: config.watch_interval,
            max_failures: config.crash_max_failures,
            backoff: config.crash_backoff,
            // Aim for a progress event roughly every 5 seconds
            progress_ticks: (5_000 / poll_ms).max(1) as u32,
        };

        Self {
            core: Arc::new(Mutex::new(core)),
            events: EventBus::default(),
            logs: LogSink::default(),
            probe: Arc::new(DurationProbe::new(config.ffprobe_path.clone())),
            running: Arc::new(AtomicBool::new(false)),
            watcher: std::sync::Mutex::new(None),
            watcher_settings,
        }
    }

    /// Start the background watcher and kick off duration probing for any
    /// playlist hydrated from the persisted snapshot.
    pub async fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        let context = watcher::WatcherContext {
            core: Arc::clone(&self.core),
            events: self.events.clone(),
            logs: self.logs.clone(),
            probe: Arc::clone(&self.probe),
            running: Arc::clone(&self.running),
        };
        let handle = tokio::spawn(watcher::run(context, self.watcher_settings.clone()));
        *self.watcher.lock().expect("watcher handle poisoned") = Some(handle);

        let paths = self.core.lock().await.playlist.paths().to_vec();
        if !paths.is_empty() {
            self.spawn_probe(paths);
        }
        info!("Playback engine started");
    }

    /// Stop the watcher, wait for it to finish, then terminate any live
    /// encoder. The watcher is joined first so it cannot orphan a process
    /// spawned concurrently with shutdown.
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.watcher.lock().expect("watcher handle poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        let mut core = self.core.lock().await;
        core.encoder.stop(&self.logs).await;
        core.status = PlayerStatus::Stopped;
        self.logs.push("Engine shut down");
        info!("Playback engine stopped");
    }

    // ---------- playback control ----------

    /// Start (or resume) streaming the selected track.
    pub async fn play(&self) -> Result<()> {
        let mut core = self.core.lock().await;
        if core.status == PlayerStatus::Playing {
            self.logs.push("Play ignored: already playing");
            return Ok(());
        }
        if core.playlist.is_empty() {
            return Err(Error::Validation("playlist is empty".to_string()));
        }
        if core.playlist.current_index().is_none() {
            core.playlist.select_first();
        }

        self.logs.push("Play requested");
        let resume_from = core.clock.position();
        core.failures = 0;

        self.restart_for_current(&mut core, resume_from).await?;
        core.status = PlayerStatus::Playing;
        self.emit_status(PlayerStatus::Playing);
        self.emit_track_started(&core);
        Ok(())
    }

    /// Stop the encoder and remember the current offset; `play()` resumes
    /// from it. The remote endpoint would time out on a paused push, so
    /// there is no mid-stream pausing.
    pub async fn pause(&self) -> Result<()> {
        let mut core = self.core.lock().await;
        if core.status != PlayerStatus::Playing {
            self.logs.push("Pause ignored: not playing");
            return Ok(());
        }
        self.logs.push("Pause requested");
        core.clock.pause();
        core.encoder.stop(&self.logs).await;
        core.status = PlayerStatus::Paused;
        self.emit_status(PlayerStatus::Paused);
        Ok(())
    }

    /// Stop streaming and reset the position to zero.
    pub async fn stop(&self) -> Result<()> {
        let mut core = self.core.lock().await;
        self.logs.push("Stop requested");
        core.encoder.stop(&self.logs).await;
        core.clock.reset();
        if core.status != PlayerStatus::Stopped {
            core.status = PlayerStatus::Stopped;
            self.emit_status(PlayerStatus::Stopped);
        }
        Ok(())
    }

    /// Advance to the next track. At the end of the playlist this stops
    /// playback (no wrap-around).
    pub async fn skip_next(&self) -> Result<()> {
        let mut core = self.core.lock().await;
        if core.playlist.is_empty() {
            return Err(Error::Validation("playlist is empty".to_string()));
        }
        self.logs.push("Skip next requested");
        let was_playing = core.status == PlayerStatus::Playing;

        if core.playlist.advance() {
            core.failures = 0;
            if was_playing {
                self.restart_for_current(&mut core, 0.0).await?;
                self.emit_track_started(&core);
            } else {
                core.clock.reset();
            }
        } else {
            core.encoder.stop(&self.logs).await;
            core.clock.reset();
            self.logs.push("Reached end of playlist; stopping");
            if core.status != PlayerStatus::Stopped {
                core.status = PlayerStatus::Stopped;
                self.emit_status(PlayerStatus::Stopped);
            }
        }
        Ok(())
    }

    /// Seek within the current track. The encoder has no live-seek once
    /// streaming, so a seek while playing restarts it with the new input
    /// offset; the clock update and the restart commit atomically under the
    /// engine lock.
    pub async fn seek(&self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(Error::Validation(
                "seek offset must be a non-negative number".to_string(),
            ));
        }

        let mut core = self.core.lock().await;
        if core.playlist.current_track().is_none() {
            return Err(Error::Validation("no track selected".to_string()));
        }

        // Clamp a seek at/past the known end so the encoder doesn't exit
        // immediately and get mistaken for a natural track end.
        let durations = self.probe.durations_for(core.playlist.paths()).await;
        let mut target = seconds;
        if let Some(duration) = core.current_duration(&durations) {
            if target >= duration {
                target = (duration - 1.0).max(0.0);
            }
        }

        self.logs.push(&format!("Seek requested to {:.1}s", target));
        if core.status == PlayerStatus::Playing {
            self.restart_for_current(&mut core, target).await?;
        } else {
            core.clock.seek(target);
        }
        Ok(())
    }

    /// Jump to a playlist index and start playing it from the beginning.
    pub async fn play_index(&self, index: usize) -> Result<()> {
        let mut core = self.core.lock().await;
        core.playlist.select(index)?;
        self.logs.push(&format!("Play index requested: {}", index));
        core.failures = 0;

        self.restart_for_current(&mut core, 0.0).await?;
        if core.status != PlayerStatus::Playing {
            core.status = PlayerStatus::Playing;
            self.emit_status(PlayerStatus::Playing);
        }
        self.emit_track_started(&core);
        Ok(())
    }

    // ---------- playlist editing ----------

    /// Replace the entire playlist. If the previously-current track is
    /// absent from the new sequence, playback stops rather than being left
    /// pointing at a stale index.
    pub async fn set_playlist(&self, paths: Vec<String>) -> Result<()> {
        let tracks: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();
        let mut core = self.core.lock().await;

        let current_dropped = core.playlist.set(tracks.clone());
        self.logs
            .push(&format!("Playlist loaded with {} tracks", core.playlist.len()));
        if current_dropped {
            core.encoder.stop(&self.logs).await;
            core.clock.reset();
            if core.status != PlayerStatus::Stopped {
                core.status = PlayerStatus::Stopped;
                self.emit_status(PlayerStatus::Stopped);
            }
        }
        self.emit_playlist(&core);
        self.emit_config(&core);
        drop(core);

        self.spawn_probe(tracks);
        Ok(())
    }

    /// Reorder the playlist to the given permutation of the same tracks.
    /// Reordering never restarts the encoder; the current track keeps
    /// playing from wherever it moved to.
    pub async fn reorder_playlist(&self, paths: Vec<String>) -> Result<()> {
        let tracks: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();
        let mut core = self.core.lock().await;
        core.playlist.reorder(tracks)?;
        self.logs.push(&format!(
            "Playlist order updated; current_index={:?}",
            core.playlist.current_index()
        ));
        self.emit_playlist(&core);
        self.emit_config(&core);
        Ok(())
    }

    pub async fn append_track(&self, path: String) -> Result<()> {
        let track = PathBuf::from(&path);
        let mut core = self.core.lock().await;
        core.playlist.append(track.clone());
        self.logs.push(&format!("Appended track {}", path));
        self.emit_playlist(&core);
        self.emit_config(&core);
        drop(core);

        self.spawn_probe(vec![track]);
        Ok(())
    }

    /// Remove a track. Removing the currently-playing track stops playback
    /// rather than silently advancing.
    pub async fn remove_track(&self, path: String) -> Result<()> {
        let mut core = self.core.lock().await;
        match core.playlist.remove(Path::new(&path)) {
            RemoveOutcome::NotFound => {
                Err(Error::Validation(format!("track not in playlist: {}", path)))
            }
            RemoveOutcome::RemovedCurrent => {
                self.logs
                    .push(&format!("Removed current track {}; stopping", path));
                core.encoder.stop(&self.logs).await;
                core.clock.reset();
                if core.status != PlayerStatus::Stopped {
                    core.status = PlayerStatus::Stopped;
                    self.emit_status(PlayerStatus::Stopped);
                }
                self.emit_playlist(&core);
                self.emit_config(&core);
                Ok(())
            }
            RemoveOutcome::Removed => {
                self.logs.push(&format!("Removed track {}", path));
                self.emit_playlist(&core);
                self.emit_config(&core);
                Ok(())
            }
        }
    }

    // ---------- configuration ----------

    pub async fn set_video(&self, path: String) -> Result<()> {
        let mut core = self.core.lock().await;
        core.config.video_file = Some(PathBuf::from(&path));
        self.logs.push(&format!("Video set to {}", path));
        self.restart_if_playing(&mut core).await?;
        self.emit_config(&core);
        Ok(())
    }

    pub async fn set_overlay_text(&self, text: String) -> Result<()> {
        let mut core = self.core.lock().await;
        core.config.overlay_text = if text.trim().is_empty() { None } else { Some(text) };
        self.logs.push(&format!(
            "Overlay text set to {:?}",
            core.config.overlay_text.as_deref().unwrap_or("")
        ));
        self.restart_if_playing(&mut core).await?;
        self.emit_config(&core);
        Ok(())
    }

    pub async fn set_rtmp(&self, url: String) -> Result<()> {
        if url.trim().is_empty() {
            return Err(Error::Validation("RTMP URL must not be empty".to_string()));
        }
        let mut core = self.core.lock().await;
        core.config.rtmp_url = url.clone();
        self.logs.push(&format!("RTMP URL set to {}", url));
        self.restart_if_playing(&mut core).await?;
        self.emit_config(&core);
        Ok(())
    }

    pub async fn set_ffmpeg_path(&self, path: String) -> Result<()> {
        if path.trim().is_empty() {
            return Err(Error::Validation("ffmpeg path must not be empty".to_string()));
        }
        let mut core = self.core.lock().await;
        core.config.ffmpeg_path = PathBuf::from(&path);
        self.logs.push(&format!("ffmpeg path set to {}", path));
        self.restart_if_playing(&mut core).await?;
        self.emit_config(&core);
        Ok(())
    }

    pub async fn update_encoder_settings(&self, patch: EncoderSettingsPatch) -> Result<()> {
        if patch.is_empty() {
            return Err(Error::Validation(
                "no encoder settings provided".to_string(),
            ));
        }
        let mut core = self.core.lock().await;
        patch.apply(&mut core.config.settings);
        let s = &core.config.settings;
        self.logs.push(&format!(
            "Encoder settings updated: audio={}, video={}, maxrate={}, bufsize={}, fps={}",
            s.audio_bitrate, s.video_bitrate, s.maxrate, s.bufsize, s.video_fps
        ));
        self.restart_if_playing(&mut core).await?;
        self.emit_config(&core);
        Ok(())
    }

    // ---------- read side ----------

    /// Build an immutable snapshot from the latest committed fields. The
    /// engine lock is held only while copying; callers serialize the result
    /// without blocking anyone.
    pub async fn get_state(&self) -> PlayerSnapshot {
        let core = self.core.lock().await;
        let durations = self.probe.durations_for(core.playlist.paths()).await;
        core.snapshot(durations)
    }

    /// Most recent console log lines (oldest first); `0` returns everything.
    pub fn logs(&self, limit: usize) -> Vec<String> {
        self.logs.tail(limit)
    }

    /// Durable configuration as of now (for a final save on shutdown).
    pub async fn persisted(&self) -> PersistedConfig {
        self.core.lock().await.persisted()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    // ---------- helpers ----------

    /// Atomic stop-then-start of the encoder for the current track at
    /// `offset`. The engine lock is held throughout, so no other operation
    /// ever observes the intermediate idle state. On a spawn failure the
    /// status degrades to `error` and the error propagates to the caller.
    async fn restart_for_current(&self, core: &mut PlayerCore, offset: f64) -> Result<()> {
        core.encoder.stop(&self.logs).await;
        if let Err(e) = core.start_current(offset, &self.logs) {
            core.status = PlayerStatus::Error;
            self.emit_status(PlayerStatus::Error);
            return Err(e);
        }
        core.clock.start(offset);
        Ok(())
    }

    /// Config changes take effect on the running encoder only through a
    /// restart; resume from the estimated current position.
    async fn restart_if_playing(&self, core: &mut PlayerCore) -> Result<()> {
        if core.status != PlayerStatus::Playing {
            return Ok(());
        }
        let position = core.clock.position();
        self.restart_for_current(core, position).await
    }

    fn spawn_probe(&self, paths: Vec<PathBuf>) {
        let probe = Arc::clone(&self.probe);
        let logs = self.logs.clone();
        tokio::spawn(async move {
            probe.ensure_all(paths, logs).await;
        });
    }

    fn emit_status(&self, status: PlayerStatus) {
        self.events.emit(StreamEvent::PlaybackStateChanged {
            status,
            timestamp: chrono::Utc::now(),
        });
    }

    fn emit_track_started(&self, core: &PlayerCore) {
        if let (Some(index), Some(track)) =
            (core.playlist.current_index(), core.playlist.current_track())
        {
            self.events.emit(StreamEvent::TrackStarted {
                path: track.to_string_lossy().into_owned(),
                index,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    fn emit_playlist(&self, core: &PlayerCore) {
        self.events.emit(StreamEvent::PlaylistChanged {
            playlist: core
                .playlist
                .paths()
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            timestamp: chrono::Utc::now(),
        });
    }

    fn emit_config(&self, core: &PlayerCore) {
        self.events.emit(StreamEvent::ConfigChanged {
            config: core.persisted(),
            timestamp: chrono::Utc::now(),
        });
    }
}
