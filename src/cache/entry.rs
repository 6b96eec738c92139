//! Cache Entry Module
//!
//! Defines the metadata record kept for every live key.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cache::{ValueType, VALUE_FILE_EXTENSION};

// == Cache Entry ==
/// Metadata describing one cached key's stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Caller-supplied key
    pub key: String,
    /// File name under the cache root, derived from the key
    pub file: String,
    /// Byte length of the formatted content before compression
    pub size_bytes: usize,
    /// Shape of the original value
    pub value_type: ValueType,
    /// Whether the on-disk bytes are codec-compressed
    pub compressed: bool,
    /// Milliseconds after `updated_at` at which the entry expires, 0 = never
    pub expire_after_ms: u64,
    /// Keywords this entry is searchable under
    #[serde(default)]
    pub search_tags: BTreeSet<String>,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
    /// Last write timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl CacheEntry {
    // == Expiry ==
    /// Absolute expiry timestamp, or None if the entry never expires.
    pub fn expires_at(&self) -> Option<i64> {
        (self.expire_after_ms > 0).then(|| {
            let after = i64::try_from(self.expire_after_ms).unwrap_or(i64::MAX);
            self.updated_at.saturating_add(after)
        })
    }

    /// Checks if the entry has expired at `now`.
    ///
    /// An entry is expired once `now` reaches the expiry timestamp.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at().is_some_and(|at| now >= at)
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds at `now`, or None if no expiry is set.
    ///
    /// # Returns
    /// - `Some(0)` if the expiry has elapsed
    /// - `Some(remaining_ms)` if the entry expires in the future
    /// - `None` if the entry never expires
    pub fn ttl_remaining_ms(&self, now: i64) -> Option<u64> {
        self.expires_at().map(|at| at.saturating_sub(now).max(0) as u64)
    }

    /// Delay for arming the expiry timer at `now`; never below 1ms so that
    /// already-elapsed entries still go through the timer path.
    pub fn timer_delay_ms(&self, now: i64) -> Option<u64> {
        self.ttl_remaining_ms(now).map(|ms| ms.max(1))
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// File name for `key`: hex SHA-256 of the key plus the value extension.
///
/// Collisions are not detected.
pub fn storage_file_name(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{}{}", hex::encode(digest), VALUE_FILE_EXTENSION)
}
