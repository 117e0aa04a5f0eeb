//! # Event Delivery Jobs
//!
//! Analytics events are queued locally and delivered in batches by jobs.
//!
//! ## Event Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Event Status Transitions                           │
//! │                                                                         │
//! │   EnqueueEvent                                                          │
//! │        │                                                                │
//! │        ▼            SendEvents             success                      │
//! │   ┌──────────┐     ┌──────────┐ ─────────────────────► ┌──────────┐     │
//! │   │NotPosted │ ──► │ Posting  │                        │  Posted  │     │
//! │   └──────────┘     └──────────┘ ──────┐                └────┬─────┘     │
//! │        ▲                │             │ failure             │           │
//! │        │   PrepareDatabase            ▼                     │           │
//! │        └────────────────┘     ┌──────────────┐    PrepareDatabase       │
//! │                               │ PostingError │    deletes it            │
//! │                               └──────┬───────┘                          │
//! │                                      │ next SendEvents retries it       │
//! │                                      └──────────► Posting               │
//! │                                                                         │
//! │  ALARM: enabled while NotPosted or PostingError events exist           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Jobs are plain data ([`Job`]) run by one dispatch function ([`run_job`]).
//! [`JobRunner`] executes them one at a time.

mod prepare;
mod runner;
mod send;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::alarm::AlarmScheduler;
use crate::prefs::PreferencesStore;
use crate::store::EventStorage;
use crate::transport::BackEndApi;
use pushwire_core::Event;

pub use runner::{JobHandle, JobQueue, JobRunner};

// =============================================================================
// Job Descriptors
// =============================================================================

/// A unit of event delivery work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job", content = "event", rename_all = "snake_case")]
pub enum Job {
    /// Cold-start cleanup: reset interrupted sends, purge delivered events.
    PrepareDatabase,

    /// Store a new event and make sure delivery is scheduled.
    EnqueueEvent(Event),

    /// Deliver one batch of pending events.
    SendEvents,
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::PrepareDatabase => "prepare_database",
            Job::EnqueueEvent(_) => "enqueue_event",
            Job::SendEvents => "send_events",
        }
    }
}

/// Outcome of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobResult {
    Success,
    NoEventsToSend,
    /// No stored back-end credentials; events stay queued.
    NotRegistered,
    SendFailed(String),
    StorageFailed(String),
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success | JobResult::NoEventsToSend)
    }
}

// =============================================================================
// Job Context
// =============================================================================

/// Everything a job may touch.
#[derive(Clone)]
pub struct JobContext {
    pub events: Arc<dyn EventStorage>,
    pub back_end: Arc<dyn BackEndApi>,
    pub alarm: Arc<dyn AlarmScheduler>,
    pub prefs: Arc<dyn PreferencesStore>,
    /// Largest batch one `SendEvents` delivers.
    pub batch_size: u32,
}

/// Runs one job to completion.
pub async fn run_job(job: &Job, ctx: &JobContext) -> JobResult {
    debug!(job = job.name(), "Running job");

    let result = match job {
        Job::PrepareDatabase => prepare::prepare_database(ctx).await,
        Job::EnqueueEvent(event) => send::enqueue_event(ctx, event).await,
        Job::SendEvents => send::send_events(ctx).await,
    };

    debug!(job = job.name(), result = ?result, "Job finished");
    result
}
