//! Track duration lookup via ffprobe
//!
//! Durations are probed on demand with an external ffprobe invocation and
//! cached per path for the life of the process. Probing always happens off
//! the control lock; a failed probe leaves the duration unknown and never
//! affects playback.

use crate::engine::logs::LogSink;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::debug;

/// Cached ffprobe-based duration lookup
pub struct DurationProbe {
    ffprobe: PathBuf,
    cache: RwLock<HashMap<PathBuf, f64>>,
}

impl DurationProbe {
    pub fn new(ffprobe: PathBuf) -> Self {
        Self {
            ffprobe,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Duration of `path` in seconds, probing on a cache miss.
    pub async fn probe(&self, path: &Path) -> Result<f64> {
        if let Some(duration) = self.cache.read().await.get(path) {
            return Ok(*duration);
        }

        debug!("Probing duration of {}", path.display());
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=nw=1:nk=1",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| Error::Probe(format!("{}: {}", self.ffprobe.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Probe(format!(
                "ffprobe exited with {} for {}: {}",
                output.status,
                path.display(),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let duration = parse_duration(&stdout).ok_or_else(|| {
            Error::Probe(format!(
                "unparseable ffprobe output for {}: {:?}",
                path.display(),
                stdout.trim()
            ))
        })?;

        self.cache.write().await.insert(path.to_path_buf(), duration);
        Ok(duration)
    }

    /// Probe every path that is not cached yet, logging failures and moving
    /// on. Intended to run in a background task after playlist edits.
    pub async fn ensure_all(&self, paths: Vec<PathBuf>, logs: LogSink) {
        for path in paths {
            if self.cache.read().await.contains_key(&path) {
                continue;
            }
            if let Err(e) = self.probe(&path).await {
                logs.push(&format!("{}", e));
            }
        }
    }

    /// Cached durations for `paths`, parallel to the input; `None` where
    /// unknown.
    pub async fn durations_for(&self, paths: &[PathBuf]) -> Vec<Option<f64>> {
        let cache = self.cache.read().await;
        paths.iter().map(|p| cache.get(p).copied()).collect()
    }
}

/// Parse ffprobe's `format=duration` output. Negative or non-numeric values
/// count as unknown.
fn parse_duration(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|d| *d >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_seconds() {
        assert_eq!(parse_duration("183.261224\n"), Some(183.261224));
        assert_eq!(parse_duration("  0.5 "), Some(0.5));
    }

    #[test]
    fn rejects_garbage_and_negatives() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("N/A"), None);
        assert_eq!(parse_duration("-3.0"), None);
    }

    #[tokio::test]
    async fn failed_probe_leaves_duration_unknown() {
        let probe = DurationProbe::new(PathBuf::from("/nonexistent/ffprobe"));
        let path = PathBuf::from("/tmp/track.mp3");

        assert!(probe.probe(&path).await.is_err());
        assert_eq!(probe.durations_for(&[path]).await, vec![None]);
    }
}
