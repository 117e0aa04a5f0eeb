//! # Delivery Alarm
//!
//! Periodically submits `SendEvents` while events are pending.
//!
//! ## Schedule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        TokioAlarm loop                                  │
//! │                                                                         │
//! │  enable_if_disabled() ──► spawn loop (generation N)                     │
//! │                                                                         │
//! │      ┌──► sleep(delay) ──► still generation N? ──no──► exit             │
//! │      │                          │ yes                                   │
//! │      │                          ▼                                       │
//! │      │                  JobHandle::run(SendEvents)                      │
//! │      │                          │                                       │
//! │      │        SendFailed ◄──────┴──────► anything else                  │
//! │      │   delay = next backoff            delay = send interval          │
//! │      │   (x2, capped at max_backoff)     backoff reset                  │
//! │      └──────────────┴────────────────────────┘                          │
//! │                                                                         │
//! │  disable() ──► generation N+1; the running loop exits when it wakes     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Retries never give up. Events stay queued until the back end takes them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::config::AnalyticsSettings;
use crate::jobs::{Job, JobHandle, JobResult};

/// Wakes the job pipeline to send events. All methods are idempotent.
pub trait AlarmScheduler: Send + Sync {
    fn enable_if_disabled(&self);
    fn disable(&self);
    fn is_enabled(&self) -> bool;
}

#[derive(Debug, Default)]
struct AlarmState {
    enabled: bool,
    generation: u64,
}

fn lock(state: &Mutex<AlarmState>) -> MutexGuard<'_, AlarmState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn is_current(state: &Mutex<AlarmState>, generation: u64) -> bool {
    let state = lock(state);
    state.enabled && state.generation == generation
}

/// [`AlarmScheduler`] backed by a tokio task.
pub struct TokioAlarm {
    jobs: JobHandle,
    interval: Duration,
    max_backoff: Duration,
    state: Arc<Mutex<AlarmState>>,
}

impl TokioAlarm {
    pub fn new(jobs: JobHandle, settings: &AnalyticsSettings) -> Self {
        TokioAlarm {
            jobs,
            interval: settings.send_interval(),
            max_backoff: settings.max_backoff().max(settings.send_interval()),
            state: Arc::new(Mutex::new(AlarmState::default())),
        }
    }
}

impl AlarmScheduler for TokioAlarm {
    fn enable_if_disabled(&self) {
        let mut state = lock(&self.state);
        if state.enabled {
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!("No tokio runtime available, delivery alarm not armed");
            return;
        };

        state.enabled = true;
        state.generation += 1;
        let generation = state.generation;
        drop(state);

        debug!(generation, interval = ?self.interval, "Delivery alarm armed");
        runtime.spawn(alarm_loop(
            self.jobs.clone(),
            self.interval,
            self.max_backoff,
            Arc::clone(&self.state),
            generation,
        ));
    }

    fn disable(&self) {
        let mut state = lock(&self.state);
        if state.enabled {
            state.enabled = false;
            state.generation += 1;
            debug!("Delivery alarm disarmed");
        }
    }

    fn is_enabled(&self) -> bool {
        lock(&self.state).enabled
    }
}

/// Creates the retry backoff used after failed sends. The first retry waits
/// one send interval.
fn retry_backoff(interval: Duration, max_backoff: Duration) -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: interval,
        initial_interval: interval,
        max_interval: max_backoff,
        multiplier: 2.0,
        randomization_factor: 0.0,
        max_elapsed_time: None,
        ..Default::default()
    }
}

async fn alarm_loop(
    jobs: JobHandle,
    interval: Duration,
    max_backoff: Duration,
    state: Arc<Mutex<AlarmState>>,
    generation: u64,
) {
    let mut backoff = retry_backoff(interval, max_backoff);
    let mut delay = interval;

    loop {
        tokio::time::sleep(delay).await;
        if !is_current(&state, generation) {
            break;
        }

        match jobs.run(Job::SendEvents).await {
            Ok(JobResult::SendFailed(reason)) => {
                delay = backoff.next_backoff().unwrap_or(max_backoff);
                warn!(reason = %reason, retry_in = ?delay, "Event delivery failed, backing off");
            }
            Ok(result) => {
                debug!(result = ?result, "Alarm send finished");
                backoff.reset();
                delay = interval;
            }
            Err(e) => {
                info!(error = %e, "Job runner unavailable, delivery alarm stopping");
                let mut state = lock(&state);
                if state.generation == generation {
                    state.enabled = false;
                }
                break;
            }
        }

        if !is_current(&state, generation) {
            break;
        }
    }

    debug!(generation, "Delivery alarm loop exited");
}
