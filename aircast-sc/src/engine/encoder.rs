//! Encoder process lifecycle
//!
//! Owns the single external ffmpeg invocation that mixes the current audio
//! track with the looping background video and pushes the result to the
//! RTMP endpoint. At most one encoder process may exist system-wide at any
//! instant: two processes pushing to the same destination would corrupt
//! the outbound stream, so a start with a live process is a fatal bug, not
//! a recoverable error.

use crate::engine::logs::LogSink;
use crate::error::{Error, Result};
use aircast_common::types::EncoderSettings;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, warn};

/// Everything needed to build an encoder invocation
///
/// Owned by the control facade; read-only here.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub rtmp_url: String,
    pub ffmpeg_path: PathBuf,
    pub video_file: Option<PathBuf>,
    pub overlay_text: Option<String>,
    pub video_size: String,
    pub settings: EncoderSettings,
}

/// Supervisor state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Idle,
    Starting,
    Running,
    Stopping,
    Crashed,
}

/// One live external encoder invocation
struct EncoderProcess {
    child: Child,
    pid: Option<u32>,
    started_at: Instant,
}

/// Owns the lifecycle of at most one encoder process
pub struct EncoderSupervisor {
    state: EncoderState,
    process: Option<EncoderProcess>,
    /// Grace period between SIGTERM and SIGKILL
    grace: Duration,
}

impl EncoderSupervisor {
    pub fn new(grace: Duration) -> Self {
        Self {
            state: EncoderState::Idle,
            process: None,
            grace,
        }
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.process.is_some()
    }

    /// Spawn the encoder for `track`, seeked to `start_sec`.
    ///
    /// Valid from `Idle`/`Crashed`. Output streams are drained into the log
    /// sink by dedicated tasks so the supervisor itself never blocks on
    /// encoder output.
    pub fn start(
        &mut self,
        config: &EncoderConfig,
        track: &Path,
        start_sec: f64,
        logs: &LogSink,
    ) -> Result<()> {
        if self.process.is_some() {
            error!("Encoder start requested while a process is already live");
            logs.push("BUG: encoder start requested while a process is already live");
            panic!("encoder supervisor invariant violated: second live process");
        }

        if config.rtmp_url.is_empty() {
            return Err(Error::Validation("no RTMP URL configured".to_string()));
        }

        self.state = EncoderState::Starting;
        let args = build_encoder_args(config, track, start_sec);
        logs.push(&format!(
            "Launching ffmpeg encoder: {} {}",
            config.ffmpeg_path.display(),
            args.join(" ")
        ));

        let spawned = Command::new(&config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                self.state = EncoderState::Crashed;
                logs.push(&format!("ERROR starting ffmpeg encoder: {}", e));
                return Err(Error::Spawn(format!(
                    "{}: {}",
                    config.ffmpeg_path.display(),
                    e
                )));
            }
        };

        if let Some(stdout) = child.stdout.take() {
            spawn_drain(stdout, logs.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_drain(stderr, logs.clone());
        }

        let pid = child.id();
        debug!("Encoder spawned (pid {:?})", pid);
        self.process = Some(EncoderProcess {
            child,
            pid,
            started_at: Instant::now(),
        });
        self.state = EncoderState::Running;
        Ok(())
    }

    /// Non-blocking liveness check; returns the exit status the first time
    /// a terminated process is observed. The caller must follow up with
    /// [`observe_exit`](Self::observe_exit).
    pub fn poll_exit(&mut self) -> Option<ExitStatus> {
        let process = self.process.as_mut()?;
        match process.child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!("Failed to poll encoder process: {}", e);
                None
            }
        }
    }

    /// Record a process exit detected by the watcher. Returns `true` for a
    /// natural end (input exhausted), `false` for an abnormal termination.
    pub fn observe_exit(&mut self, status: ExitStatus, logs: &LogSink) -> bool {
        let uptime = self
            .process
            .take()
            .map(|p| p.started_at.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        if status.success() {
            self.state = EncoderState::Idle;
            logs.push(&format!(
                "Encoder finished its input after {:.1}s (natural end)",
                uptime
            ));
            true
        } else {
            self.state = EncoderState::Crashed;
            match status.code() {
                Some(code) => logs.push(&format!(
                    "Encoder exited abnormally with code {} after {:.1}s",
                    code, uptime
                )),
                None => logs.push(&format!(
                    "Encoder was terminated by a signal after {:.1}s",
                    uptime
                )),
            }
            false
        }
    }

    /// Terminate the encoder if one is running: graceful signal, bounded
    /// grace period, forced kill. Idempotent; safe to call from any state.
    pub async fn stop(&mut self, logs: &LogSink) {
        let Some(mut process) = self.process.take() else {
            // No live process; clear any stale crash marker.
            self.state = EncoderState::Idle;
            return;
        };

        self.state = EncoderState::Stopping;
        logs.push("Terminating ffmpeg encoder process");
        request_terminate(&mut process);

        match tokio::time::timeout(self.grace, process.child.wait()).await {
            Ok(Ok(status)) => debug!("Encoder exited with {} after terminate", status),
            Ok(Err(e)) => warn!("Failed waiting for encoder exit: {}", e),
            Err(_) => {
                logs.push("Encoder did not terminate in time; killing");
                if let Err(e) = process.child.kill().await {
                    warn!("Failed to kill encoder: {}", e);
                }
            }
        }

        self.state = EncoderState::Idle;
    }
}

/// Ask the process to terminate gracefully. ffmpeg flushes and closes the
/// RTMP connection on SIGTERM; on platforms without signals this degrades
/// to an immediate kill.
#[cfg(unix)]
fn request_terminate(process: &mut EncoderProcess) {
    match process.pid {
        Some(pid) => unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        },
        None => {
            let _ = process.child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn request_terminate(process: &mut EncoderProcess) {
    let _ = process.child.start_kill();
}

fn spawn_drain(stream: impl AsyncRead + Unpin + Send + 'static, logs: LogSink) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.is_empty() {
                logs.push(&format!("[ffmpeg] {}", line));
            }
        }
    });
}

/// Build the ffmpeg argument list for one track.
///
/// The track is the seeked audio input; the configured video (if any) loops
/// as the visual input with the overlay rendered by drawtext. `-shortest`
/// makes the process exit when the audio ends, which is what drives
/// auto-advance.
pub(crate) fn build_encoder_args(
    config: &EncoderConfig,
    track: &Path,
    start_sec: f64,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "warning".into(),
        "-nostdin".into(),
        // Audio (playlist track)
        "-re".into(),
        "-ss".into(),
        format!("{:.3}", start_sec.max(0.0)),
        "-i".into(),
        track.to_string_lossy().into_owned(),
    ];

    match &config.video_file {
        Some(video) => {
            let mut vf = format!("scale={},format=yuv420p", config.video_size);
            if let Some(text) = &config.overlay_text {
                vf.push_str(&format!(
                    ",drawtext=text='{}':x=20:y=50:fontsize=48:fontcolor=white:box=1:boxcolor=black@0.5",
                    escape_overlay_text(text)
                ));
            }
            args.extend([
                // Video (looped)
                "-stream_loop".into(),
                "-1".into(),
                "-i".into(),
                video.to_string_lossy().into_owned(),
                // Video encoding
                "-c:v".into(),
                "libx264".into(),
                "-preset".into(),
                "ultrafast".into(),
                "-tune".into(),
                "zerolatency".into(),
                "-pix_fmt".into(),
                "yuv420p".into(),
                "-r".into(),
                config.settings.video_fps.to_string(),
                "-vf".into(),
                vf,
                "-b:v".into(),
                config.settings.video_bitrate.clone(),
                "-maxrate".into(),
                config.settings.maxrate.clone(),
                "-bufsize".into(),
                config.settings.bufsize.clone(),
                // Mapping
                "-map".into(),
                "1:v:0".into(),
                "-map".into(),
                "0:a:0".into(),
                // End when audio ends (drives auto-advance)
                "-shortest".into(),
            ]);
        }
        None => {
            args.push("-vn".into());
        }
    }

    args.extend([
        // Audio encoding
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        config.settings.audio_bitrate.clone(),
        "-threads".into(),
        "1".into(),
        // Output
        "-f".into(),
        "flv".into(),
        config.rtmp_url.clone(),
    ]);

    args
}

/// Escape characters that break the drawtext filter expression.
fn escape_overlay_text(text: &str) -> String {
    text.replace('\\', r"\\")
        .replace(':', r"\:")
        .replace('\'', r"\'")
        .replace('%', r"\%")
}
