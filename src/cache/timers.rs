//! Expiry Timer Registry
//!
//! At most one pending expiry timer per key. Each timer is a spawned task
//! sleeping until its deadline; replacing or cancelling a timer aborts the
//! task and removes it from the registry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Debug)]
struct Armed {
    id: u64,
    handle: JoinHandle<()>,
}

// == Expiry Timers ==
#[derive(Debug, Default)]
pub struct ExpiryTimers {
    armed: Mutex<HashMap<String, Armed>>,
    next_id: AtomicU64,
}

impl ExpiryTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `on_fire` after `delay`, replacing any timer already armed
    /// for `key`.
    ///
    /// `on_fire` receives the timer id and must pass it to [`claim`] before
    /// acting, so a timer that lost a race with `cancel` or a newer `arm`
    /// does nothing.
    ///
    /// [`claim`]: ExpiryTimers::claim
    pub fn arm<F, Fut>(&self, key: &str, delay: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;

        // held across the spawn so a short timer cannot claim before it is registered
        let mut armed = self.armed.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(id).await;
        });
        if let Some(previous) = armed.insert(key.to_string(), Armed { id, handle }) {
            previous.handle.abort();
            trace!("Replaced expiry timer {} for {}", previous.id, key);
        }
        id
    }

    /// Cancels the timer for `key`. Returns false if none was armed.
    pub fn cancel(&self, key: &str) -> bool {
        match self.armed.lock().remove(key) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Removes the registry entry for `key` if it still belongs to timer `id`.
    ///
    /// Exactly one caller wins: the firing timer, or whichever of
    /// `cancel`/`arm` removed the entry first.
    pub fn claim(&self, key: &str, id: u64) -> bool {
        let mut armed = self.armed.lock();
        match armed.get(key) {
            Some(timer) if timer.id == id => {
                armed.remove(key);
                true
            }
            _ => false,
        }
    }

    #[allow(dead_code)]
    pub fn is_armed(&self, key: &str) -> bool {
        self.armed.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.armed.lock().len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.armed.lock().is_empty()
    }

    /// Aborts every pending timer.
    pub fn shutdown(&self) {
        for (_, timer) in self.armed.lock().drain() {
            timer.handle.abort();
        }
    }
}

impl Drop for ExpiryTimers {
    fn drop(&mut self) {
        for (_, timer) in self.armed.get_mut().drain() {
            timer.handle.abort();
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    type Fire = std::pin::Pin<Box<dyn Future<Output = ()> + Send>>;

    fn counting(
        timers: &Arc<ExpiryTimers>,
        key: &'static str,
        fired: &Arc<AtomicUsize>,
    ) -> impl FnOnce(u64) -> Fire + Send + 'static {
        let timers = timers.clone();
        let fired = fired.clone();
        move |id| -> Fire {
            Box::pin(async move {
                if timers.claim(key, id) {
                    fired.fetch_add(1, Ordering::SeqCst);
                }
            })
        }
    }

    #[tokio::test]
    async fn test_timer_fires_once_and_leaves_registry() {
        let timers = Arc::new(ExpiryTimers::new());
        let fired = Arc::new(AtomicUsize::new(0));

        timers.arm("k", Duration::from_millis(10), counting(&timers, "k", &fired));
        assert!(timers.is_armed("k"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timers.is_armed("k"));
    }

    #[tokio::test]
    async fn test_cancel_prevents_firing() {
        let timers = Arc::new(ExpiryTimers::new());
        let fired = Arc::new(AtomicUsize::new(0));

        timers.arm("k", Duration::from_millis(20), counting(&timers, "k", &fired));
        assert!(timers.cancel("k"));
        assert!(!timers.cancel("k"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rearm_replaces_previous_timer() {
        let timers = Arc::new(ExpiryTimers::new());
        let fired = Arc::new(AtomicUsize::new(0));

        timers.arm("k", Duration::from_millis(20), counting(&timers, "k", &fired));
        timers.arm("k", Duration::from_millis(300), counting(&timers, "k", &fired));
        assert_eq!(timers.len(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0, "first timer must not fire");
        assert!(timers.is_armed("k"));
    }

    #[tokio::test]
    async fn test_stale_claim_loses() {
        let timers = ExpiryTimers::new();
        let first = timers.arm("k", Duration::from_secs(60), |_| async {});
        let second = timers.arm("k", Duration::from_secs(60), |_| async {});

        assert!(!timers.claim("k", first));
        assert!(timers.claim("k", second));
        assert!(!timers.claim("k", second));
    }

    #[tokio::test]
    async fn test_shutdown_aborts_all() {
        let timers = Arc::new(ExpiryTimers::new());
        let fired = Arc::new(AtomicUsize::new(0));

        timers.arm("a", Duration::from_millis(20), counting(&timers, "a", &fired));
        timers.arm("b", Duration::from_millis(20), counting(&timers, "b", &fired));
        timers.shutdown();
        assert!(timers.is_empty());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
