//! Configuration Module
//!
//! Handles loading and managing orchestrator configuration from environment
//! variables. Every knob has a default and can be overridden per instance.

use std::env;

/// Orchestrator configuration parameters.
///
/// All values can be configured via environment variables with sensible
/// defaults, or set directly on a struct literal before constructing the
/// orchestrator.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries the cache can hold
    pub max_cache_size: usize,
    /// Default TTL in milliseconds for cached payloads
    pub default_ttl_ms: u64,
    /// Payloads at or above this size are candidates for compression
    pub compression_threshold_bytes: usize,
    /// Whether payload compression is enabled at all
    pub enable_compression: bool,
    /// Whether stale entries are refreshed in the background on access
    pub enable_background_refresh: bool,
    /// Remaining-TTL fraction below which a background refresh is scheduled
    /// (0.2 means: refresh once 80% of the entry's lifetime has elapsed)
    pub refresh_threshold: f64,
    /// Upper bound on simultaneously dispatched requests per batch window
    pub max_concurrent_requests: usize,
    /// Exponential backoff ladder in milliseconds; retries past the end of
    /// the ladder reuse its last entry
    pub retry_delay_ladder_ms: Vec<u64>,
    /// Background expired-entry sweep interval in milliseconds
    pub cleanup_interval_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_CACHE_SIZE` - Maximum cache entries (default: 500)
    /// - `DEFAULT_TTL_MS` - Default cache TTL in ms (default: 300000)
    /// - `COMPRESSION_THRESHOLD_BYTES` - Minimum payload size to compress (default: 1024)
    /// - `ENABLE_COMPRESSION` - "true"/"false" (default: true)
    /// - `ENABLE_BACKGROUND_REFRESH` - "true"/"false" (default: true)
    /// - `REFRESH_THRESHOLD` - Remaining-TTL fraction triggering refresh (default: 0.2)
    /// - `MAX_CONCURRENT_REQUESTS` - Dispatch window size (default: 6)
    /// - `RETRY_DELAY_LADDER_MS` - Comma-separated backoff ladder (default: 1000,2000,4000,8000)
    /// - `CLEANUP_INTERVAL_MS` - Sweep frequency in ms (default: 60000)
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            max_cache_size: env::var("MAX_CACHE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_cache_size),
            default_ttl_ms: env::var("DEFAULT_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_ttl_ms),
            compression_threshold_bytes: env::var("COMPRESSION_THRESHOLD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.compression_threshold_bytes),
            enable_compression: env::var("ENABLE_COMPRESSION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enable_compression),
            enable_background_refresh: env::var("ENABLE_BACKGROUND_REFRESH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enable_background_refresh),
            refresh_threshold: env::var("REFRESH_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.refresh_threshold),
            max_concurrent_requests: env::var("MAX_CONCURRENT_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_concurrent_requests),
            retry_delay_ladder_ms: env::var("RETRY_DELAY_LADDER_MS")
                .ok()
                .map(|v| parse_ladder(&v))
                .filter(|ladder| !ladder.is_empty())
                .unwrap_or(defaults.retry_delay_ladder_ms),
            cleanup_interval_ms: env::var("CLEANUP_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cleanup_interval_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_cache_size: 500,
            default_ttl_ms: 300_000,
            compression_threshold_bytes: 1024,
            enable_compression: true,
            enable_background_refresh: true,
            refresh_threshold: 0.2,
            max_concurrent_requests: 6,
            retry_delay_ladder_ms: vec![1000, 2000, 4000, 8000],
            cleanup_interval_ms: 60_000,
        }
    }
}

/// Parses a comma-separated backoff ladder, skipping malformed entries.
fn parse_ladder(raw: &str) -> Vec<u64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_cache_size, 500);
        assert_eq!(config.default_ttl_ms, 300_000);
        assert_eq!(config.compression_threshold_bytes, 1024);
        assert!(config.enable_compression);
        assert!(config.enable_background_refresh);
        assert_eq!(config.refresh_threshold, 0.2);
        assert_eq!(config.max_concurrent_requests, 6);
        assert_eq!(config.retry_delay_ladder_ms, vec![1000, 2000, 4000, 8000]);
        assert_eq!(config.cleanup_interval_ms, 60_000);
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("MAX_CACHE_SIZE");
        env::remove_var("DEFAULT_TTL_MS");
        env::remove_var("COMPRESSION_THRESHOLD_BYTES");
        env::remove_var("ENABLE_COMPRESSION");
        env::remove_var("ENABLE_BACKGROUND_REFRESH");
        env::remove_var("REFRESH_THRESHOLD");
        env::remove_var("MAX_CONCURRENT_REQUESTS");
        env::remove_var("RETRY_DELAY_LADDER_MS");
        env::remove_var("CLEANUP_INTERVAL_MS");

        let config = Config::from_env();
        assert_eq!(config.max_cache_size, 500);
        assert_eq!(config.default_ttl_ms, 300_000);
        assert_eq!(config.max_concurrent_requests, 6);
        assert_eq!(config.retry_delay_ladder_ms, vec![1000, 2000, 4000, 8000]);
    }

    #[test]
    fn test_parse_ladder() {
        assert_eq!(parse_ladder("1000,2000,4000"), vec![1000, 2000, 4000]);
        assert_eq!(parse_ladder(" 50 , 100 "), vec![50, 100]);
        assert_eq!(parse_ladder("50,oops,100"), vec![50, 100]);
        assert!(parse_ladder("").is_empty());
    }
}
