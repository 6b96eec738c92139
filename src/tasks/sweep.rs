//! Buffer Sweep Task
//!
//! Background task that periodically removes stale hot-read buffer values.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::cache::BufferSlots;

/// Spawns a task that sweeps `slots` every two windows, so values still
/// inside their window are never visited needlessly.
///
/// # Returns
/// A JoinHandle for the spawned task, aborted when the buffer shuts down.
pub(crate) fn spawn_sweep_task(slots: Arc<BufferSlots>, window: Duration) -> JoinHandle<()> {
    let period = window.saturating_mul(2);

    tokio::spawn(async move {
        debug!("Starting buffer sweep task every {:?}", period);

        let mut ticker = tokio::time::interval(period);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let removed = slots.sweep(window);
            if removed > 0 {
                debug!("Buffer sweep: removed {} stale values", removed);
            } else {
                trace!("Buffer sweep: nothing stale");
            }
        }
    })
}
