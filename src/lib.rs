//! File Cache - an embedded, file-system backed key/value cache
//!
//! Values live in one file per key; a side-car metadata file tracks expiry,
//! compression, size and keyword tags. Expiry runs on per-key timers and
//! recently read values are served from a short-lived in-memory buffer.

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod fs;
pub mod pubsub;
mod tasks;

pub use cache::{CacheEntry, CacheStats, FileCache, SearchLogic, SetOptions, StoredValue, ValueType};
pub use config::CacheConfig;
pub use error::{CacheError, ErrorSink, Result};
