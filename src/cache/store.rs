//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with LRU eviction, TTL
//! expiration, and transparent payload compression.

use std::collections::HashMap;

use bytes::Bytes;
use regex::Regex;
use tracing::warn;

use crate::cache::{CacheEntry, CacheStats, Codec, MAX_KEY_LENGTH, MAX_PAYLOAD_SIZE};
use crate::error::{FetchError, Result};

// == Cache Store ==
/// Bounded response cache with LRU eviction and per-entry TTL.
///
/// Lookups are infallible from the caller's point of view: an absent,
/// expired, or corrupt entry is simply a miss. Expired and corrupt entries
/// are removed on the spot.
#[derive(Debug)]
pub struct CacheStore {
    /// Key to cached-response storage
    entries: HashMap<String, CacheEntry>,
    /// Payload compression codec
    codec: Codec,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// Default TTL in milliseconds for entries without an explicit TTL
    default_ttl_ms: u64,
    /// Monotonic counter stamped onto entries for LRU ordering
    access_seq: u64,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore.
    ///
    /// # Arguments
    /// * `max_entries` - Maximum number of entries the cache can hold
    /// * `default_ttl_ms` - TTL in milliseconds applied when `set` gets no TTL
    /// * `codec` - Compression codec applied to stored payloads
    pub fn new(max_entries: usize, default_ttl_ms: u64, codec: Codec) -> Self {
        Self {
            entries: HashMap::new(),
            codec,
            stats: CacheStats::new(),
            max_entries,
            default_ttl_ms,
            access_seq: 0,
        }
    }

    // == Set ==
    /// Stores a payload under a key with an optional TTL.
    ///
    /// If the key already exists, the payload is overwritten and the TTL is
    /// reset. If the cache is at capacity, the least recently used entry is
    /// evicted first.
    ///
    /// # Arguments
    /// * `key` - The cache key
    /// * `payload` - The response body to store
    /// * `ttl_ms` - Optional TTL in milliseconds (uses the default if None)
    ///
    /// # Errors
    /// Returns `FetchError::InvalidRequest` when the key or payload exceeds
    /// its size limit.
    pub fn set(&mut self, key: String, payload: &[u8], ttl_ms: Option<u64>) -> Result<()> {
        // Validate key length
        if key.len() > MAX_KEY_LENGTH {
            return Err(FetchError::InvalidRequest(format!(
                "cache key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }

        // Validate payload size before compression
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FetchError::InvalidRequest(format!(
                "payload exceeds maximum size of {} bytes",
                MAX_PAYLOAD_SIZE
            )));
        }

        let is_overwrite = self.entries.contains_key(&key);

        if !is_overwrite {
            // A zero-capacity cache stores nothing
            if self.max_entries == 0 {
                return Ok(());
            }

            // At capacity: make room before inserting
            if self.entries.len() >= self.max_entries {
                self.evict_lru();
            }
        }

        let (stored, compressed) = self.codec.encode(payload);
        let ttl = ttl_ms.unwrap_or(self.default_ttl_ms);
        let seq = self.next_seq();

        self.entries
            .insert(key, CacheEntry::new(stored, ttl, compressed, seq));
        self.stats.set_total_entries(self.entries.len());

        Ok(())
    }

    // == Get ==
    /// Retrieves a payload by key, decompressing it if needed.
    ///
    /// Returns `None` on any kind of miss: absent key, expired entry, or an
    /// entry whose stored bytes fail to decode. Expired and corrupt entries
    /// are removed eagerly. A hit refreshes the entry's LRU position.
    pub fn get(&mut self, key: &str) -> Option<Bytes> {
        let Some(entry) = self.entries.get(key) else {
            self.stats.record_miss();
            return None;
        };

        if entry.is_expired() {
            self.entries.remove(key);
            self.stats.set_total_entries(self.entries.len());
            self.stats.record_expiration();
            self.stats.record_miss();
            return None;
        }

        match self.codec.decode(&entry.payload, entry.compressed) {
            Ok(payload) => {
                let seq = self.next_seq();
                if let Some(entry) = self.entries.get_mut(key) {
                    entry.touch(seq);
                }
                self.stats.record_hit();
                Some(payload)
            }
            Err(e) => {
                warn!("dropping corrupt cache entry for '{}': {}", key, e);
                self.entries.remove(key);
                self.stats.set_total_entries(self.entries.len());
                self.stats.record_miss();
                None
            }
        }
    }

    // == Remaining Fraction ==
    /// Returns the fraction of TTL remaining for a live entry, or `None` if
    /// the key is absent or already expired.
    ///
    /// Used to decide whether a hit is close enough to expiry to warrant a
    /// background refresh. Does not touch the entry or the stats.
    pub fn remaining_fraction(&self, key: &str) -> Option<f64> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            return None;
        }
        Some(entry.remaining_fraction())
    }

    // == Entry TTL ==
    /// Returns the stored TTL of a live entry in milliseconds, or `None` if
    /// the key is absent or already expired.
    ///
    /// A background refresh re-stores under this TTL so a refill never
    /// rewrites the entry's expiry policy. Does not touch the entry or the
    /// stats.
    pub fn ttl_ms(&self, key: &str) -> Option<u64> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            return None;
        }
        Some(entry.ttl_ms)
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether an entry was present.
    pub fn delete(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.stats.set_total_entries(self.entries.len());
        }
        removed
    }

    // == Invalidate Pattern ==
    /// Removes every entry whose key matches the pattern.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_pattern(&mut self, pattern: &Regex) -> usize {
        let matched: Vec<String> = self
            .entries
            .keys()
            .filter(|key| pattern.is_match(key))
            .cloned()
            .collect();

        for key in &matched {
            self.entries.remove(key);
        }

        self.stats.set_total_entries(self.entries.len());
        matched.len()
    }

    // == Clear ==
    /// Removes all entries. Lifetime counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats.set_total_entries(0);
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired_keys.len();

        for key in expired_keys {
            self.entries.remove(&key);
            self.stats.record_expiration();
        }

        self.stats.set_total_entries(self.entries.len());
        count
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Evict LRU ==
    /// Removes the least recently used entry.
    // O(n) scan; swap in a list+map LRU if configured capacities grow.
    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.access_seq)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.stats.record_eviction();
        }
    }

    // == Next Sequence ==
    /// Hands out the next LRU stamp. Strictly increasing within a store.
    fn next_seq(&mut self) -> u64 {
        self.access_seq += 1;
        self.access_seq
    }
}
