//! Runtime configuration for the stream caster

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Stream caster configuration
///
/// Everything here is fixed for the life of the process; the durable,
/// user-editable part of the state lives in the persisted snapshot instead.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP API port
    pub port: u16,
    /// Persisted snapshot location
    pub state_file: PathBuf,
    /// ffmpeg binary (may be overridden later through the control API)
    pub ffmpeg_path: PathBuf,
    /// ffprobe binary used for duration lookups
    pub ffprobe_path: PathBuf,
    /// Destination used when no snapshot provides one
    pub default_rtmp_url: String,
    /// Output frame size passed to the scale filter
    pub video_size: String,
    /// Grace period between SIGTERM and SIGKILL when stopping the encoder
    pub stop_grace: Duration,
    /// Encoder liveness poll interval
    pub watch_interval: Duration,
    /// Consecutive abnormal exits tolerated before status goes to `error`
    pub crash_max_failures: u32,
    /// Base crash-recovery backoff; attempt N waits `backoff * N`
    pub crash_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let ffmpeg_path = PathBuf::from("ffmpeg");
        let ffprobe_path = resolve_ffprobe(&ffmpeg_path, None);
        Self {
            port: 5870,
            state_file: PathBuf::from("aircast_state.json"),
            ffmpeg_path,
            ffprobe_path,
            default_rtmp_url: "rtmp://example.com/live/streamkey".to_string(),
            video_size: "1920x1080".to_string(),
            stop_grace: Duration::from_secs(5),
            watch_interval: Duration::from_millis(250),
            crash_max_failures: 3,
            crash_backoff: Duration::from_secs(2),
        }
    }
}

/// Determine the ffprobe binary to use.
///
/// An explicit path wins. Otherwise, when ffmpeg was given as an absolute
/// path, ffprobe is assumed to sit next to it (keeping the extension, so
/// `ffmpeg.exe` maps to `ffprobe.exe`); a bare `ffmpeg` falls back to a bare
/// `ffprobe` resolved through PATH.
pub fn resolve_ffprobe(ffmpeg: &Path, explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if ffmpeg.is_absolute() {
        let probe_name = match ffmpeg.extension() {
            Some(ext) => format!("ffprobe.{}", ext.to_string_lossy()),
            None => "ffprobe".to_string(),
        };
        return ffmpeg.with_file_name(probe_name);
    }
    PathBuf::from("ffprobe")
}
