//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ErrorSink;

/// Cache configuration parameters.
///
/// All values except the error sink can be configured via environment
/// variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory holding value files and the side-car metadata file
    pub root_dir: PathBuf,
    /// Default expiry in milliseconds for entries without explicit expiry, 0 = never
    pub default_expire_ms: u64,
    /// Compress values unless a call says otherwise
    pub auto_compress: bool,
    /// Hot-read buffer freshness window in milliseconds, 0 = buffer disabled
    pub buffer_window_ms: u64,
    /// Maximum formatted content size in bytes, 0 = unchecked
    pub max_size_bytes: usize,
    /// Quiet period before a debounced metadata flush, in milliseconds
    pub persist_debounce_ms: u64,
    /// Abort writes that exceed `max_size_bytes` instead of only reporting them
    pub strict_size_limit: bool,
    /// Receives every reported error; errors are logged when unset
    pub error_sink: Option<ErrorSink>,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DIR` - Root directory (default: ./.file-cache)
    /// - `CACHE_DEFAULT_EXPIRE_MS` - Default expiry in ms (default: 0)
    /// - `CACHE_AUTO_COMPRESS` - Compress by default (default: false)
    /// - `CACHE_BUFFER_WINDOW_MS` - Hot-read buffer window in ms (default: 5000)
    /// - `CACHE_MAX_SIZE` - Maximum content size in bytes (default: 0)
    /// - `CACHE_PERSIST_DEBOUNCE_MS` - Metadata flush quiet period in ms (default: 500)
    /// - `CACHE_STRICT_SIZE_LIMIT` - Abort oversized writes (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            root_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.root_dir),
            default_expire_ms: parse_var("CACHE_DEFAULT_EXPIRE_MS")
                .unwrap_or(defaults.default_expire_ms),
            auto_compress: parse_var("CACHE_AUTO_COMPRESS").unwrap_or(defaults.auto_compress),
            buffer_window_ms: parse_var("CACHE_BUFFER_WINDOW_MS")
                .unwrap_or(defaults.buffer_window_ms),
            max_size_bytes: parse_var("CACHE_MAX_SIZE").unwrap_or(defaults.max_size_bytes),
            persist_debounce_ms: parse_var("CACHE_PERSIST_DEBOUNCE_MS")
                .unwrap_or(defaults.persist_debounce_ms),
            strict_size_limit: parse_var("CACHE_STRICT_SIZE_LIMIT")
                .unwrap_or(defaults.strict_size_limit),
            error_sink: None,
        }
    }

    /// Creates a default configuration rooted at `root_dir`.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_default_expire_ms(mut self, ms: u64) -> Self {
        self.default_expire_ms = ms;
        self
    }

    pub fn with_auto_compress(mut self, enabled: bool) -> Self {
        self.auto_compress = enabled;
        self
    }

    pub fn with_buffer_window_ms(mut self, ms: u64) -> Self {
        self.buffer_window_ms = ms;
        self
    }

    pub fn with_max_size_bytes(mut self, bytes: usize) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    pub fn with_persist_debounce_ms(mut self, ms: u64) -> Self {
        self.persist_debounce_ms = ms;
        self
    }

    pub fn with_strict_size_limit(mut self, strict: bool) -> Self {
        self.strict_size_limit = strict;
        self
    }

    pub fn with_error_sink(mut self, sink: ErrorSink) -> Self {
        self.error_sink = Some(sink);
        self
    }

    /// Hot-read buffer window as a Duration.
    pub fn buffer_window(&self) -> Duration {
        Duration::from_millis(self.buffer_window_ms)
    }

    /// Debounce quiet period as a Duration.
    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./.file-cache"),
            default_expire_ms: 0,
            auto_compress: false,
            buffer_window_ms: 5000,
            max_size_bytes: 0,
            persist_debounce_ms: 500,
            strict_size_limit: false,
            error_sink: None,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
