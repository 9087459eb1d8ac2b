//! Encoder watcher loop
//!
//! Background task polling encoder liveness at a short interval. On a
//! natural end it advances the playlist and restarts the encoder for the
//! next track; on an abnormal exit it applies a bounded retry policy for
//! the same track. All transitions happen inside the shared engine lock,
//! so the watcher and external control calls can never both apply. The
//! backoff sleep between retries is the one thing done off the lock, and
//! the watcher re-validates the state after reacquiring it.

use crate::engine::encoder::EncoderState;
use crate::engine::logs::LogSink;
use crate::engine::probe::DurationProbe;
use crate::engine::PlayerCore;
use aircast_common::events::{EventBus, StreamEvent};
use aircast_common::types::PlayerStatus;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Watcher tuning knobs, derived from the daemon configuration
#[derive(Debug, Clone)]
pub(crate) struct WatcherSettings {
    /// Liveness poll interval
    pub poll: Duration,
    /// Consecutive failures tolerated before giving up
    pub max_failures: u32,
    /// Attempt N waits `backoff * N` before restarting
    pub backoff: Duration,
    /// Emit a progress event every this many healthy ticks
    pub progress_ticks: u32,
}

/// Shared handles the watcher operates on
pub(crate) struct WatcherContext {
    pub core: Arc<Mutex<PlayerCore>>,
    pub events: EventBus,
    pub logs: LogSink,
    pub probe: Arc<DurationProbe>,
    pub running: Arc<AtomicBool>,
}

/// A scheduled crash-recovery restart, executed after an off-lock backoff
struct RetryPlan {
    delay: Duration,
    /// Failure count this plan was derived from; a mismatch after the sleep
    /// means someone else intervened and the plan is stale
    attempt: u32,
    track: PathBuf,
    position: f64,
}

pub(crate) async fn run(ctx: WatcherContext, settings: WatcherSettings) {
    ctx.logs.push("Watcher loop started");
    let mut tick = interval(settings.poll);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut progress_counter: u32 = 0;

    loop {
        tick.tick().await;
        if !ctx.running.load(Ordering::SeqCst) {
            break;
        }

        let pending_retry = {
            let mut core = ctx.core.lock().await;
            if core.status != PlayerStatus::Playing {
                progress_counter = 0;
                None
            } else if let Some(exit) = core.encoder.poll_exit() {
                progress_counter = 0;
                handle_exit(&mut core, exit, &ctx, &settings)
            } else if core.encoder.state() == EncoderState::Crashed {
                // A previous automatic restart failed to even spawn; keep
                // applying the same retry budget.
                progress_counter = 0;
                schedule_recovery(&mut core, &ctx, &settings)
            } else {
                progress_counter += 1;
                if progress_counter >= settings.progress_ticks {
                    progress_counter = 0;
                    let durations = ctx.probe.durations_for(core.playlist.paths()).await;
                    let duration = core.current_duration(&durations);
                    ctx.events.emit(StreamEvent::PlaybackProgress {
                        position_sec: core.clock.position_clamped(duration),
                        duration_sec: duration,
                        timestamp: chrono::Utc::now(),
                    });
                }
                None
            }
        };

        if let Some(plan) = pending_retry {
            debug!(
                "Backing off {:?} before restart attempt {}",
                plan.delay, plan.attempt
            );
            tokio::time::sleep(plan.delay).await;
            if !ctx.running.load(Ordering::SeqCst) {
                break;
            }
            let mut core = ctx.core.lock().await;
            retry_same_track(&mut core, plan, &ctx, &settings);
        }
    }

    ctx.logs.push("Watcher loop stopped");
}

/// Handle an observed encoder exit: advance on a natural end, enter crash
/// recovery otherwise. Returns a retry plan when a backoff restart is due.
fn handle_exit(
    core: &mut PlayerCore,
    exit: std::process::ExitStatus,
    ctx: &WatcherContext,
    settings: &WatcherSettings,
) -> Option<RetryPlan> {
    let finished = core.playlist.current_track().cloned();
    let natural = core.encoder.observe_exit(exit, &ctx.logs);
    core.clock.pause();

    if !natural {
        core.failures += 1;
        ctx.events.emit(StreamEvent::EncoderCrashed {
            exit_code: exit.code(),
            attempt: core.failures,
            timestamp: chrono::Utc::now(),
        });
        return schedule_recovery(core, ctx, settings);
    }

    if let Some(path) = &finished {
        ctx.events.emit(StreamEvent::TrackCompleted {
            path: path.to_string_lossy().into_owned(),
            timestamp: chrono::Utc::now(),
        });
    }

    if core.playlist.advance() {
        let index = core.playlist.current_index().unwrap_or(0);
        ctx.logs
            .push(&format!("Advancing to next track (index {})", index));
        match core.start_current(0.0, &ctx.logs) {
            Ok(()) => {
                core.failures = 0;
                core.clock.start(0.0);
                emit_track_started(core, ctx);
                None
            }
            Err(e) => {
                ctx.logs.push(&format!("Failed to start next track: {}", e));
                core.clock.reset();
                core.failures += 1;
                ctx.events.emit(StreamEvent::EncoderCrashed {
                    exit_code: None,
                    attempt: core.failures,
                    timestamp: chrono::Utc::now(),
                });
                schedule_recovery(core, ctx, settings)
            }
        }
    } else {
        core.clock.reset();
        core.status = PlayerStatus::Stopped;
        ctx.logs.push("Playlist exhausted; stopping");
        ctx.events.emit(StreamEvent::PlaybackStateChanged {
            status: PlayerStatus::Stopped,
            timestamp: chrono::Utc::now(),
        });
        None
    }
}

/// Decide between another bounded retry and giving up. Assumes the failure
/// has already been counted and reported.
fn schedule_recovery(
    core: &mut PlayerCore,
    ctx: &WatcherContext,
    settings: &WatcherSettings,
) -> Option<RetryPlan> {
    if core.failures >= settings.max_failures {
        core.status = PlayerStatus::Error;
        ctx.logs.push(&format!(
            "Encoder failed {} times in a row; giving up until the next control call",
            core.failures
        ));
        ctx.events.emit(StreamEvent::PlaybackStateChanged {
            status: PlayerStatus::Error,
            timestamp: chrono::Utc::now(),
        });
        return None;
    }

    let track = core.playlist.current_track().cloned()?;
    Some(RetryPlan {
        delay: settings.backoff * core.failures,
        attempt: core.failures,
        track,
        position: core.clock.position(),
    })
}

/// Execute a retry plan after its backoff, unless the state moved on while
/// the lock was released (user skip, stop, playlist edit, or a concurrent
/// restart).
fn retry_same_track(
    core: &mut PlayerCore,
    plan: RetryPlan,
    ctx: &WatcherContext,
    settings: &WatcherSettings,
) {
    if core.status != PlayerStatus::Playing
        || core.encoder.is_live()
        || core.failures != plan.attempt
        || core.playlist.current_track() != Some(&plan.track)
    {
        debug!("Discarding stale restart plan for {}", plan.track.display());
        return;
    }

    ctx.logs.push(&format!(
        "Automatic restart attempt {}/{} for {} from ~{:.1}s",
        plan.attempt,
        settings.max_failures,
        plan.track.display(),
        plan.position
    ));
    match core.start_current(plan.position, &ctx.logs) {
        Ok(()) => {
            core.clock.start(plan.position);
            emit_track_started(core, ctx);
        }
        Err(e) => {
            warn!("Automatic restart failed: {}", e);
            ctx.logs.push(&format!("Automatic restart failed: {}", e));
            core.failures += 1;
            ctx.events.emit(StreamEvent::EncoderCrashed {
                exit_code: None,
                attempt: core.failures,
                timestamp: chrono::Utc::now(),
            });
            // The next poll tick sees the Crashed marker and either backs
            // off again or gives up.
        }
    }
}

fn emit_track_started(core: &PlayerCore, ctx: &WatcherContext) {
    if let (Some(index), Some(track)) =
        (core.playlist.current_index(), core.playlist.current_track())
    {
        ctx.events.emit(StreamEvent::TrackStarted {
            path: track.to_string_lossy().into_owned(),
            index,
            timestamp: chrono::Utc::now(),
        });
    }
}
