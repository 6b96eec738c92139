//! Error types for the file cache
//!
//! Provides unified error handling using thiserror, plus the error sink that
//! every reported error is funneled through.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the file cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not present in the metadata store
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Content cannot be stored (non-finite number, unserializable value)
    #[error("Invalid content: {0}")]
    ContentInvalid(String),

    /// Formatted content is larger than the configured ceiling
    #[error("Content for key {key} is {size} bytes, exceeding the maximum of {max} bytes")]
    SizeExceeded { key: String, size: usize, max: usize },

    /// File read, write or delete failure
    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Compress or decompress failure, or stored bytes that do not decode
    #[error("Codec failure: {0}")]
    Codec(String),

    /// Side-car metadata file could not be written
    #[error("Persist failure: {0}")]
    Persist(String),

    /// Mutation attempted after `shutdown`
    #[error("Cache is shut down; {0} rejected")]
    ShutDown(&'static str),

    /// Side-car metadata file exists but cannot be parsed
    #[error("Corrupt metadata file {}: {reason}", path.display())]
    CorruptMetadata { path: PathBuf, reason: String },
}

impl CacheError {
    /// Builds an `Io` error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the error is a missing file rather than a real I/O failure.
    pub fn is_file_not_found(&self) -> bool {
        matches!(self, CacheError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

// == Result Type Alias ==
/// Convenience Result type for the file cache.
pub type Result<T> = std::result::Result<T, CacheError>;

// == Error Sink ==
/// Receives every error the cache reports, whether or not the error is also
/// returned to the caller.
#[derive(Clone)]
pub struct ErrorSink(Arc<dyn Fn(&CacheError) + Send + Sync>);

impl ErrorSink {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&CacheError) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Forwards the error to the sink.
    pub fn report(&self, err: &CacheError) {
        (self.0)(err)
    }
}

impl fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorSink(..)")
    }
}

/// Reports through the configured sink, or logs when none is configured.
pub(crate) fn report(sink: Option<&ErrorSink>, err: &CacheError) {
    match sink {
        Some(sink) => sink.report(err),
        None => match err {
            CacheError::NotFound(_) => tracing::debug!("{}", err),
            CacheError::SizeExceeded { .. } | CacheError::ShutDown(_) => {
                tracing::warn!("{}", err)
            }
            _ => tracing::error!("{}", err),
        },
    }
}
