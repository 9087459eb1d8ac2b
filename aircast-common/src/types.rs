//! Shared state and settings types
//!
//! The snapshot returned by the engine's `get_state()` is the sole contract
//! between the core and any front end; every field is always present, with
//! unknown values carried as explicit `null`s rather than absent keys.

use serde::{Deserialize, Serialize};

/// Playback status of the engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    /// No encoder running, position reset
    Stopped,
    /// Encoder running (or being restarted by crash recovery)
    Playing,
    /// Encoder stopped with the position remembered
    Paused,
    /// Crash recovery gave up; waiting for an external control call
    Error,
}

impl std::fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerStatus::Stopped => write!(f, "stopped"),
            PlayerStatus::Playing => write!(f, "playing"),
            PlayerStatus::Paused => write!(f, "paused"),
            PlayerStatus::Error => write!(f, "error"),
        }
    }
}

/// Encoder quality settings, UI-configurable at runtime
///
/// Bitrate fields use ffmpeg's bitrate syntax (e.g. "320k").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncoderSettings {
    pub audio_bitrate: String,
    pub video_bitrate: String,
    pub maxrate: String,
    pub bufsize: String,
    pub video_fps: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            audio_bitrate: "320k".to_string(),
            video_bitrate: "800k".to_string(),
            maxrate: "800k".to_string(),
            bufsize: "1600k".to_string(),
            video_fps: 24,
        }
    }
}

/// Partial update to [`EncoderSettings`]; absent fields keep their value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncoderSettingsPatch {
    pub audio_bitrate: Option<String>,
    pub video_bitrate: Option<String>,
    pub maxrate: Option<String>,
    pub bufsize: Option<String>,
    pub video_fps: Option<u32>,
}

impl EncoderSettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.audio_bitrate.is_none()
            && self.video_bitrate.is_none()
            && self.maxrate.is_none()
            && self.bufsize.is_none()
            && self.video_fps.is_none()
    }

    /// Merge the provided fields into `settings`.
    pub fn apply(&self, settings: &mut EncoderSettings) {
        if let Some(v) = &self.audio_bitrate {
            settings.audio_bitrate = v.clone();
        }
        if let Some(v) = &self.video_bitrate {
            settings.video_bitrate = v.clone();
        }
        if let Some(v) = &self.maxrate {
            settings.maxrate = v.clone();
        }
        if let Some(v) = &self.bufsize {
            settings.bufsize = v.clone();
        }
        if let Some(v) = self.video_fps {
            settings.video_fps = v;
        }
    }
}

/// Immutable snapshot of the full player state
///
/// Built under the engine lock from the latest committed fields and
/// serialized outside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub status: PlayerStatus,
    pub rtmp_url: String,
    pub ffmpeg_path: String,
    pub video_file: Option<String>,
    pub overlay_text: Option<String>,
    /// Ordered track paths
    pub playlist: Vec<String>,
    /// Index into `playlist`, or `None` when nothing is selected
    pub current_track_index: Option<usize>,
    pub current_track: Option<String>,
    /// Estimated position within the current track (seconds)
    pub position_sec: f64,
    /// Parallel to `playlist`; `None` where the duration is unknown
    pub track_durations: Vec<Option<f64>>,
    pub audio_live: bool,
    pub video_live: bool,
    pub encoder_live: bool,
    #[serde(flatten)]
    pub settings: EncoderSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&PlayerStatus::Playing).unwrap(),
            "\"playing\""
        );
        assert_eq!(PlayerStatus::Error.to_string(), "error");
    }

    #[test]
    fn patch_merges_only_present_fields() {
        let mut settings = EncoderSettings::default();
        let patch = EncoderSettingsPatch {
            video_bitrate: Some("1200k".to_string()),
            video_fps: Some(30),
            ..Default::default()
        };
        assert!(!patch.is_empty());

        patch.apply(&mut settings);
        assert_eq!(settings.video_bitrate, "1200k");
        assert_eq!(settings.video_fps, 30);
        assert_eq!(settings.audio_bitrate, "320k");
    }

    #[test]
    fn snapshot_keeps_unknown_durations_explicit() {
        let snapshot = PlayerSnapshot {
            status: PlayerStatus::Stopped,
            rtmp_url: "rtmp://example.com/live/key".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            video_file: None,
            overlay_text: None,
            playlist: vec!["a.mp3".to_string(), "b.mp3".to_string()],
            current_track_index: None,
            current_track: None,
            position_sec: 0.0,
            track_durations: vec![Some(180.0), None],
            audio_live: false,
            video_live: false,
            encoder_live: false,
            settings: EncoderSettings::default(),
        };

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&snapshot).unwrap()).unwrap();
        assert_eq!(json["track_durations"][1], serde_json::Value::Null);
        assert_eq!(json["video_file"], serde_json::Value::Null);
        // Settings are flattened into the snapshot
        assert_eq!(json["audio_bitrate"], "320k");
    }
}
