//! Payload Compression Module
//!
//! LZ4 block compression for cached payloads above a size threshold.
//!
//! Compression is strictly byte-exact: whatever `encode` stores, `decode`
//! reproduces bit-for-bit. Payloads that fail to compress, or that would grow
//! by compressing, are stored raw with the `compressed` flag unset.

use bytes::Bytes;
use tracing::warn;

use crate::error::{FetchError, Result};

// == Codec ==
/// Size-thresholded LZ4 codec used by the cache store.
#[derive(Debug, Clone)]
pub struct Codec {
    /// Whether compression is enabled at all
    enabled: bool,
    /// Minimum payload size, in bytes, to attempt compression
    threshold: usize,
}

impl Codec {
    // == Constructor ==
    /// Creates a codec.
    ///
    /// # Arguments
    /// * `enabled` - Master switch; a disabled codec always stores raw bytes
    /// * `threshold` - Payloads smaller than this are stored raw
    pub fn new(enabled: bool, threshold: usize) -> Self {
        Self { enabled, threshold }
    }

    // == Encode ==
    /// Prepares a payload for storage.
    ///
    /// Returns the bytes to store and whether they are compressed. The
    /// compressed form embeds the original length so decoding needs no side
    /// channel. Falls back to the raw payload when compression fails or does
    /// not shrink the data.
    pub fn encode(&self, data: &[u8]) -> (Bytes, bool) {
        if !self.enabled || data.len() < self.threshold {
            return (Bytes::copy_from_slice(data), false);
        }

        match lz4::block::compress(data, None, true) {
            Ok(compressed) if compressed.len() < data.len() => (Bytes::from(compressed), true),
            Ok(_) => (Bytes::copy_from_slice(data), false),
            Err(e) => {
                warn!("payload compression failed, storing raw: {}", e);
                (Bytes::copy_from_slice(data), false)
            }
        }
    }

    // == Decode ==
    /// Recovers the original payload from stored bytes.
    ///
    /// # Errors
    /// Returns `FetchError::CacheCorruption` when a compressed payload cannot
    /// be decoded; the store treats that as a miss and drops the entry.
    pub fn decode(&self, data: &[u8], compressed: bool) -> Result<Bytes> {
        if !compressed {
            return Ok(Bytes::copy_from_slice(data));
        }

        lz4::block::decompress(data, None)
            .map(Bytes::from)
            .map_err(|e| FetchError::CacheCorruption(e.to_string()))
    }
}
