//! Timer loop behind scheduled handlers.
//!
//! Arming spawns one task per handler that sleeps until the next cron
//! occurrence in the handler's timezone and then fires the actuation as an
//! independent task. Overlapping executions of the same handler are
//! tolerated; a failing tick only ever produces a failed outcome, logged
//! by the delivery path like any other.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::Bus;
use crate::handler::cron::ScheduledHandler;
use crate::handler::Handler;

/// Starts the timer for a scheduled handler. Cancelling the returned
/// token stops it before the next tick.
pub(crate) fn arm(handler: Arc<ScheduledHandler>, bus: Bus) -> CancellationToken {
    let token = CancellationToken::new();
    let stop = token.clone();

    tokio::spawn(async move {
        loop {
            let now = Utc::now().with_timezone(&handler.timezone());
            let Some(next) = handler.schedule().after(&now).next() else {
                warn!(
                    handler = %handler.qualified_name(),
                    "schedule has no future occurrences, disarming"
                );
                break;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            debug!(
                handler = %handler.qualified_name(),
                next = %next,
                "scheduled tick armed"
            );

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            // Fire-and-forget: a slow handler must not delay the next tick.
            tokio::spawn(fire(handler.clone(), bus.clone()));
        }
        debug!(handler = %handler.qualified_name(), "scheduler loop stopped");
    });

    token
}

/// One tick: synthesize a self-authored context, run the normal actuation
/// path and deliver the outcome like any user-triggered invocation.
pub(crate) async fn fire(handler: Arc<ScheduledHandler>, bus: Bus) {
    let ctx = bus.synthetic_context();
    let outcome = handler.actuate(ctx.clone(), "").await;
    bus.deliver(&ctx, outcome).await;
}
