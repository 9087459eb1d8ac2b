//! Error types for aircast-sc
//!
//! Defines the daemon's error type using thiserror for clear error
//! propagation. Validation and spawn errors are returned to the immediate
//! caller; crash recovery is internal and only surfaces through the
//! `error` status in the state snapshot.

use thiserror::Error;

/// Main error type for the stream caster
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed index, seek offset, reorder request or similar bad input.
    /// Returned synchronously without mutating any state.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The encoder process failed to start
    #[error("Encoder spawn failed: {0}")]
    Spawn(String),

    /// ffprobe invocation failed; degrades duration display only
    #[error("Duration probe failed: {0}")]
    Probe(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the stream caster Error
pub type Result<T> = std::result::Result<T, Error>;
