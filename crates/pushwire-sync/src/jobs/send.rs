use tracing::{debug, error, info, warn};

use super::{JobContext, JobResult};
use crate::transport::Credentials;
use pushwire_core::{Event, EventStatus};

/// Stores `event` as `NotPosted` and arms the alarm.
pub(super) async fn enqueue_event(ctx: &JobContext, event: &Event) -> JobResult {
    let mut event = event.clone();
    event.status = EventStatus::NotPosted;

    match ctx.events.save(&event).await {
        Ok(handle) => {
            debug!(handle, event_type = %event.event_type, "Event queued");
            ctx.alarm.enable_if_disabled();
            JobResult::Success
        }
        Err(e) => {
            error!(error = %e, event_id = %event.id, "Failed to queue event");
            JobResult::StorageFailed(e.to_string())
        }
    }
}

/// Delivers one batch of pending events.
///
/// ## Flow
/// 1. Select up to `batch_size` `NotPosted`/`PostingError` events
/// 2. Load credentials from the stored registration
/// 3. Mark the batch `Posting` and send it in one request
/// 4. Mark it `Posted` or `PostingError`
pub(super) async fn send_events(ctx: &JobContext) -> JobResult {
    let handles = match ctx
        .events
        .handles_with_status(&EventStatus::PENDING, Some(ctx.batch_size))
        .await
    {
        Ok(handles) => handles,
        Err(e) => return JobResult::StorageFailed(e.to_string()),
    };

    if handles.is_empty() {
        debug!("No events to send");
        ctx.alarm.disable();
        return JobResult::NoEventsToSend;
    }

    let stored = match ctx.prefs.load().await {
        Ok(stored) => stored,
        Err(e) => return JobResult::StorageFailed(e.to_string()),
    };
    let credentials = match Credentials::from_stored(&stored) {
        Ok(credentials) => credentials,
        Err(e) => {
            info!(pending = handles.len(), reason = %e, "Holding events until registered");
            return JobResult::NotRegistered;
        }
    };

    let events: Vec<Event> = match ctx.events.read_many(&handles).await {
        Ok(events) => events.into_iter().map(|(_, event)| event).collect(),
        Err(e) => return JobResult::StorageFailed(e.to_string()),
    };

    if let Err(e) = ctx.events.set_status(&handles, EventStatus::Posting).await {
        return JobResult::StorageFailed(e.to_string());
    }

    match ctx.back_end.send_events(&events, &credentials).await {
        Ok(()) => {
            if let Err(e) = ctx.events.set_status(&handles, EventStatus::Posted).await {
                return JobResult::StorageFailed(e.to_string());
            }
            info!(count = events.len(), "Events delivered");

            match ctx.events.count(&EventStatus::PENDING).await {
                Ok(0) => ctx.alarm.disable(),
                Ok(remaining) => debug!(remaining, "More events pending"),
                Err(e) => warn!(error = %e, "Failed to count pending events"),
            }
            JobResult::Success
        }
        Err(send_error) => {
            warn!(
                count = events.len(),
                error = %send_error,
                retryable = send_error.is_retryable(),
                "Event delivery failed"
            );
            if let Err(e) = ctx
                .events
                .set_status(&handles, EventStatus::PostingError)
                .await
            {
                error!(error = %e, "Failed to mark events as failed");
            }
            ctx.alarm.enable_if_disabled();
            JobResult::SendFailed(send_error.to_string())
        }
    }
}
