//! Cache Module
//!
//! In-memory response caching with TTL expiration, LRU eviction, and LZ4
//! payload compression.

mod compression;
mod entry;
mod stats;
mod store;


// Re-export public types
pub use compression::Codec;
pub use entry::{current_timestamp_ms, CacheEntry};
pub use stats::CacheStats;
pub use store::CacheStore;

// == Public Constants ==
/// Maximum allowed cache key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum allowed payload size in bytes
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024; // 1 MB
