//! # Aircast Stream Caster
//!
//! Headless daemon that streams a playlist of audio tracks to an RTMP
//! endpoint through an external ffmpeg process, mixing in a looping
//! background video and an optional text overlay. The playback
//! orchestration engine lives in [`engine`]; the HTTP control surface in
//! [`api`].

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod persist;

pub use config::Config;
pub use engine::Player;
pub use error::{Error, Result};
