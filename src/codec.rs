//! Compression codec
//!
//! The cache treats compression as a pluggable byte transform. `GzipCodec`
//! is the default implementation.

use std::fmt::Debug;
use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// A reversible byte transform. `decompress(compress(x))` must equal `x`.
pub trait Codec: Send + Sync + Debug {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    fn compress(&self, bytes: &[u8]) -> std::io::Result<Vec<u8>>;

    fn decompress(&self, bytes: &[u8]) -> std::io::Result<Vec<u8>>;
}

// == Gzip Codec ==
/// Gzip via flate2.
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: Compression,
}

impl GzipCodec {
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level),
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress(&self, bytes: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), self.level);
        encoder.write_all(bytes)?;
        encoder.finish()
    }

    fn decompress(&self, bytes: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = Vec::with_capacity(bytes.len() * 2);
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_inverse() {
        let codec = GzipCodec::default();
        let input = "the quick brown fox ".repeat(50);

        let packed = codec.compress(input.as_bytes()).unwrap();
        assert!(packed.len() < input.len());
        assert_eq!(codec.decompress(&packed).unwrap(), input.as_bytes());
    }

    #[test]
    fn test_gzip_empty_input() {
        let codec = GzipCodec::new(9);
        let packed = codec.compress(b"").unwrap();
        assert!(codec.decompress(&packed).unwrap().is_empty());
    }

    #[test]
    fn test_gzip_rejects_garbage() {
        let codec = GzipCodec::default();
        assert!(codec.decompress(b"definitely not gzip").is_err());
    }
}
