use tracing::{info, warn};

use super::{JobContext, JobResult};
use crate::error::PushResult;
use pushwire_core::EventStatus;

/// Resets interrupted sends, purges delivered events, then arms or disarms
/// the alarm depending on what is left. Always succeeds.
pub(super) async fn prepare_database(ctx: &JobContext) -> JobResult {
    if let Err(e) = reset_and_purge(ctx).await {
        warn!(error = %e, "Failed to prepare event storage");
    }

    match ctx.events.count(&EventStatus::PENDING).await {
        Ok(0) => ctx.alarm.disable(),
        Ok(pending) => {
            info!(pending, "Pending events found at start-up");
            ctx.alarm.enable_if_disabled();
        }
        Err(e) => {
            warn!(error = %e, "Failed to count pending events");
            ctx.alarm.enable_if_disabled();
        }
    }

    JobResult::Success
}

async fn reset_and_purge(ctx: &JobContext) -> PushResult<()> {
    let interrupted = ctx
        .events
        .handles_with_status(&[EventStatus::Posting], None)
        .await?;
    if !interrupted.is_empty() {
        let reset = ctx
            .events
            .set_status(&interrupted, EventStatus::NotPosted)
            .await?;
        info!(count = reset, "Reset interrupted event sends");
    }

    let delivered = ctx
        .events
        .handles_with_status(&[EventStatus::Posted], None)
        .await?;
    if !delivered.is_empty() {
        let deleted = ctx.events.delete(&delivered).await?;
        info!(count = deleted, "Purged delivered events");
    }

    Ok(())
}
