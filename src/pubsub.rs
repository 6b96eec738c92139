//! Publish/Subscribe Module
//!
//! Named-channel event fan-out carried alongside the cache. Messages are not
//! part of the cache consistency model.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

/// Per-channel buffer size; slow subscribers lag past this.
const CHANNEL_CAPACITY: usize = 64;

// == Notifier ==
/// Lazily created broadcast channels keyed by name.
#[derive(Debug, Default)]
pub struct Notifier {
    channels: Mutex<HashMap<String, broadcast::Sender<Value>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener on `channel`.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<Value> {
        let mut channels = self.channels.lock();
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Sends `message` to every current listener of `channel`.
    ///
    /// Returns the number of listeners reached; a channel nobody listens on
    /// is not an error.
    pub fn publish(&self, channel: &str, message: Value) -> usize {
        let mut channels = self.channels.lock();
        let Some(sender) = channels.get(channel) else {
            debug!("publish on channel {} with no subscribers", channel);
            return 0;
        };
        match sender.send(message) {
            Ok(reached) => reached,
            Err(_) => {
                // every receiver was dropped
                channels.remove(channel);
                0
            }
        }
    }
}
