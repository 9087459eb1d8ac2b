//! Snapshot persistence task
//!
//! The engine emits a `ConfigChanged` event with the full durable record on
//! every mutating control call; this task subscribes to the event bus and
//! rewrites the JSON snapshot file each time. Loading happens once at
//! startup in `main`.

use aircast_common::config::save_snapshot;
use aircast_common::events::{EventBus, StreamEvent};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Spawn the background saver. The task ends when the event bus closes.
pub fn spawn_saver(path: PathBuf, bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(StreamEvent::ConfigChanged { config, .. }) => {
                    match save_snapshot(&path, &config) {
                        Ok(()) => debug!("Persisted config snapshot to {}", path.display()),
                        Err(e) => warn!("Failed to persist config snapshot: {}", e),
                    }
                }
                Ok(_) => {}
                // Dropped events are fine; the next ConfigChanged carries
                // the full record again.
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Persistence task lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircast_common::config::{load_snapshot, PersistedConfig};

    #[tokio::test]
    async fn config_changed_events_reach_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let bus = EventBus::new(8);
        let handle = spawn_saver(path.clone(), &bus);

        let config = PersistedConfig {
            rtmp_url: "rtmp://example.com/live/key".to_string(),
            ..Default::default()
        };
        bus.emit(StreamEvent::ConfigChanged {
            config: config.clone(),
            timestamp: chrono::Utc::now(),
        });

        // Give the saver a moment to observe the event.
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            if path.exists() {
                break;
            }
        }
        assert_eq!(load_snapshot(&path), Some(config));
        handle.abort();
    }
}
