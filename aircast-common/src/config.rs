//! Persisted configuration snapshot
//!
//! A small JSON file keeps the durable part of the player state across
//! restarts: stream destination, encoder path, loop video, overlay text,
//! playlist and encoder settings. The engine emits a `ConfigChanged` event
//! with the updated record on every mutating control call; the daemon's
//! persistence task writes it back out here.

use crate::error::{Error, Result};
use crate::types::EncoderSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Durable configuration record
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersistedConfig {
    #[serde(default)]
    pub rtmp_url: String,
    #[serde(default)]
    pub ffmpeg_path: String,
    #[serde(default)]
    pub video_file: Option<String>,
    #[serde(default)]
    pub overlay_text: Option<String>,
    #[serde(default)]
    pub playlist: Vec<String>,
    #[serde(default)]
    pub settings: Option<EncoderSettings>,
}

/// Load a persisted snapshot, returning `None` when the file does not exist.
///
/// A file that exists but fails to parse is reported as a warning and
/// treated as absent; a damaged snapshot must not prevent startup.
pub fn load_snapshot(path: &Path) -> Option<PersistedConfig> {
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Ignoring unreadable state file {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            warn!("Failed to read state file {}: {}", path.display(), e);
            None
        }
    }
}

/// Write a snapshot atomically (temp file + rename in the target directory).
pub fn save_snapshot(path: &Path, config: &PersistedConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("serialize state: {}", e)))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_snapshot(&dir.path().join("absent.json")).is_none());
    }

    #[test]
    fn snapshot_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let config = PersistedConfig {
            rtmp_url: "rtmp://example.com/live/key".to_string(),
            ffmpeg_path: "/usr/bin/ffmpeg".to_string(),
            video_file: Some("/media/loop.mp4".to_string()),
            overlay_text: Some("24/7 lofi".to_string()),
            playlist: vec!["a.mp3".to_string(), "b.mp3".to_string()],
            settings: Some(EncoderSettings::default()),
        };

        save_snapshot(&path, &config).unwrap();
        assert_eq!(load_snapshot(&path), Some(config));
    }

    #[test]
    fn corrupt_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_snapshot(&path).is_none());
    }
}
