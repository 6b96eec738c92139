//! Cache Module
//!
//! File-backed key/value caching with expiry timers, a hot-read buffer and
//! keyword search.

mod buffer;
mod entry;
mod index;
mod locks;
mod metadata;
mod stats;
mod store;
mod timers;
mod value;


// Re-export public types
pub(crate) use buffer::BufferSlots;
pub(crate) use buffer::HotBuffer;
pub use entry::{current_timestamp_ms, storage_file_name, CacheEntry};
pub use index::{KeywordIndex, SearchLogic};
pub use metadata::{SidecarFile, SIDECAR_FILE_NAME};
pub use stats::CacheStats;
pub use store::{FileCache, SetOptions};
pub(crate) use timers::ExpiryTimers;
pub use value::{StoredValue, ValueType};

// == Public Constants ==
/// Extension appended to the hashed key to form a value file name
pub const VALUE_FILE_EXTENSION: &str = ".cache";
