//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

// == Cache Entry ==
/// Represents a single cache entry with payload and access metadata.
///
/// The payload is stored as raw bytes and may be compressed; the `compressed`
/// flag tells the store which way to decode it on the way out.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored payload, possibly compressed
    pub payload: Bytes,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Time-to-live in milliseconds, measured from `created_at`
    pub ttl_ms: u64,
    /// Number of times the entry has been read
    pub access_count: u64,
    /// Last access timestamp (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Monotonic access stamp used for LRU ordering; millisecond timestamps
    /// collide under load, so eviction compares this instead
    pub access_seq: u64,
    /// Whether `payload` holds compressed bytes
    pub compressed: bool,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry.
    ///
    /// # Arguments
    /// * `payload` - The (possibly compressed) bytes to store
    /// * `ttl_ms` - TTL in milliseconds
    /// * `compressed` - Whether `payload` was compressed by the store
    /// * `access_seq` - The store's current access stamp
    pub fn new(payload: Bytes, ttl_ms: u64, compressed: bool, access_seq: u64) -> Self {
        let now = current_timestamp_ms();
        Self {
            payload,
            created_at: now,
            ttl_ms,
            access_count: 0,
            last_accessed_at: now,
            access_seq,
            compressed,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is live iff `now - created_at < ttl_ms`; once the full TTL
    /// has elapsed the entry is expired, including at the exact boundary.
    pub fn is_expired(&self) -> bool {
        current_timestamp_ms().saturating_sub(self.created_at) >= self.ttl_ms
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds (0 once expired).
    pub fn remaining_ttl_ms(&self) -> u64 {
        let age = current_timestamp_ms().saturating_sub(self.created_at);
        self.ttl_ms.saturating_sub(age)
    }

    /// Returns the remaining-TTL fraction in `[0.0, 1.0]`.
    ///
    /// A freshly written entry reports ~1.0 and decays towards 0.0 as it
    /// approaches expiry; the refresh coordinator compares this against its
    /// configured threshold.
    pub fn remaining_fraction(&self) -> f64 {
        if self.ttl_ms == 0 {
            return 0.0;
        }
        (self.remaining_ttl_ms() as f64 / self.ttl_ms as f64).clamp(0.0, 1.0)
    }

    // == Touch ==
    /// Records a read: bumps the access counter and refreshes the access
    /// timestamp and LRU stamp.
    pub fn touch(&mut self, access_seq: u64) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = current_timestamp_ms();
        self.access_seq = access_seq;
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}
