//! Hot-Read Buffer Module
//!
//! Short-lived cache of decoded values layered above the file store. It is
//! never a source of truth: everything in it also exists in the metadata
//! store, and losing it only costs a disk read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::cache::StoredValue;
use crate::tasks::spawn_sweep_task;

#[derive(Debug)]
struct Buffered {
    value: StoredValue,
    last_accessed: Instant,
}

// == Buffer Slots ==
/// The buffered values, shared with the sweep task.
#[derive(Debug, Default)]
pub(crate) struct BufferSlots {
    map: Mutex<HashMap<String, Buffered>>,
}

impl BufferSlots {
    /// Drops every value not accessed within `window`.
    ///
    /// Returns the number of values removed.
    pub(crate) fn sweep(&self, window: Duration) -> usize {
        let mut map = self.map.lock();
        let before = map.len();
        map.retain(|_, b| b.last_accessed.elapsed() <= window);
        before - map.len()
    }
}

// == Hot Buffer ==
/// Time-windowed, access-refreshing buffer of decoded values.
///
/// A window of zero disables the buffer: `put` is ignored and `get` always
/// misses.
#[derive(Debug)]
pub struct HotBuffer {
    window: Duration,
    slots: Arc<BufferSlots>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl HotBuffer {
    /// Creates a buffer without a background sweep.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            slots: Arc::new(BufferSlots::default()),
            sweeper: Mutex::new(None),
        }
    }

    /// Creates a buffer and starts its background sweep, running every two
    /// windows. Must be called inside a tokio runtime.
    pub fn start(window: Duration) -> Self {
        let buffer = Self::new(window);
        if buffer.is_enabled() {
            let handle = spawn_sweep_task(buffer.slots.clone(), window);
            *buffer.sweeper.lock() = Some(handle);
        }
        buffer
    }

    pub fn is_enabled(&self) -> bool {
        !self.window.is_zero()
    }

    /// Stores `value` and marks it as just accessed.
    pub fn put(&self, key: &str, value: StoredValue) {
        if !self.is_enabled() {
            return;
        }
        self.slots.map.lock().insert(
            key.to_string(),
            Buffered {
                value,
                last_accessed: Instant::now(),
            },
        );
    }

    /// Returns the buffered value and refreshes its access time.
    ///
    /// Values past the window that the sweep has not reached yet count as a
    /// miss and are dropped.
    pub fn get(&self, key: &str) -> Option<StoredValue> {
        let mut map = self.slots.map.lock();
        match map.get_mut(key) {
            None => return None,
            Some(slot) if slot.last_accessed.elapsed() <= self.window => {
                slot.last_accessed = Instant::now();
                return Some(slot.value.clone());
            }
            Some(_) => {}
        }
        map.remove(key);
        None
    }

    #[allow(dead_code)]
    pub fn has(&self, key: &str) -> bool {
        self.slots.map.lock().contains_key(key)
    }

    /// Removes `key`'s value if buffered.
    pub fn evict(&self, key: &str) {
        self.slots.map.lock().remove(key);
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.slots.map.lock().len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.slots.map.lock().is_empty()
    }

    /// Runs one sweep pass immediately.
    #[allow(dead_code)]
    pub fn sweep(&self) -> usize {
        self.slots.sweep(self.window)
    }

    /// Stops the background sweep and clears the buffer. Safe to call more
    /// than once.
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        self.slots.map.lock().clear();
    }
}

impl Drop for HotBuffer {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}
