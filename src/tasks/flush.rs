//! Debounced Flush Task
//!
//! Background task that coalesces bursts of metadata mutations into one
//! side-car write.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::trace;

/// A flush is never deferred longer than this many quiet periods, even under
/// continuous churn.
const MAX_DEFER_PERIODS: u32 = 10;

/// Spawns a task that runs `flush` once `dirty` has stayed silent for `quiet`.
///
/// Every notification during the wait restarts the quiet period, up to the
/// deferral cap.
pub(crate) fn spawn_flush_task<F, Fut>(
    dirty: Arc<Notify>,
    quiet: Duration,
    flush: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            dirty.notified().await;

            // sleep clamps far-future deadlines where Instant addition would panic
            let deadline = tokio::time::sleep(quiet.saturating_mul(MAX_DEFER_PERIODS));
            tokio::pin!(deadline);
            let mut coalesced = 0u64;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(quiet) => break,
                    _ = &mut deadline => break,
                    _ = dirty.notified() => coalesced += 1,
                }
            }

            trace!("Flushing metadata after {} coalesced mutations", coalesced + 1);
            flush().await;
        }
    })
}
