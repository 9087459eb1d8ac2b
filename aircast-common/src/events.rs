//! Event types for the aircast event system
//!
//! Engine events are broadcast via [`EventBus`] and serialized for SSE
//! transmission; the persistence task reacts to `ConfigChanged`.

use crate::config::PersistedConfig;
use crate::types::PlayerStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Aircast engine events
///
/// Every variant carries a UTC timestamp so consumers never have to guess
/// event ordering across reconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Playback status changed (stopped/playing/paused/error)
    PlaybackStateChanged {
        status: PlayerStatus,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track started streaming (fresh start, seek, or auto-advance)
    TrackStarted {
        path: String,
        index: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The encoder consumed a track to its natural end
    TrackCompleted {
        path: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic position update while playing
    PlaybackProgress {
        position_sec: f64,
        /// `None` while the current track's duration is unknown
        duration_sec: Option<f64>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playlist contents or order changed
    PlaylistChanged {
        playlist: Vec<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The encoder process exited abnormally
    EncoderCrashed {
        exit_code: Option<i32>,
        /// Which recovery attempt this failure belongs to (1-based)
        attempt: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A durable configuration field changed; carries the full snapshot
    /// for the persistence collaborator to write out
    ConfigChanged {
        config: PersistedConfig,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl StreamEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            StreamEvent::TrackStarted { .. } => "TrackStarted",
            StreamEvent::TrackCompleted { .. } => "TrackCompleted",
            StreamEvent::PlaybackProgress { .. } => "PlaybackProgress",
            StreamEvent::PlaylistChanged { .. } => "PlaylistChanged",
            StreamEvent::EncoderCrashed { .. } => "EncoderCrashed",
            StreamEvent::ConfigChanged { .. } => "ConfigChanged",
        }
    }
}

/// Broadcast bus for engine events
///
/// Cheap to clone; senders never block and a send with no subscribers is
/// not an error.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StreamEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Broadcast an event to all subscribers
    pub fn emit(&self, event: StreamEvent) {
        // No receivers is fine
        let _ = self.tx.send(event);
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
