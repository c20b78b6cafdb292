//! Metrics Module
//!
//! Passive counters fed by request lifecycle events. The collector never
//! influences behavior; it only aggregates and hands out snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CacheStats;

// == Metrics Collector ==
/// Lock-free aggregation of request outcomes.
///
/// Totals count every request the orchestrator works on, including internal
/// dispatches such as background refreshes. The response-time average covers
/// successful network dispatches only; cache-served responses would drag it
/// toward zero and say nothing about the backend.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    /// Requests seen: cache-served plus every network dispatch
    total_requests: AtomicU64,
    /// Requests that ended with a usable response
    successful_requests: AtomicU64,
    /// Network dispatches that exhausted their retries or failed outright
    failed_requests: AtomicU64,
    /// Sum of response times for successful dispatches, in milliseconds
    response_time_total_ms: AtomicU64,
    /// Number of samples behind `response_time_total_ms`
    response_time_samples: AtomicU64,
    /// Decompressed bytes served from cache instead of refetched
    bandwidth_saved_bytes: AtomicU64,
}

impl MetricsCollector {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Cache Hit ==
    /// Counts a response served from the cache.
    ///
    /// # Arguments
    /// * `payload_bytes` - Decompressed payload size, credited as bandwidth
    ///   that a network fetch would have cost
    pub fn record_cache_hit(&self, payload_bytes: usize) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
        self.bandwidth_saved_bytes
            .fetch_add(payload_bytes as u64, Ordering::Relaxed);
    }

    // == Record Dispatch ==
    /// Counts a request entering the network dispatch pipeline.
    pub fn record_dispatch(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Success ==
    /// Counts a dispatch that produced a response, with its wall time.
    pub fn record_success(&self, duration_ms: u64) {
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
        self.response_time_total_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
        self.response_time_samples.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Failure ==
    /// Counts a dispatch that failed after exhausting its retries.
    pub fn record_failure(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Cancelled ==
    /// Counts a request cancelled while still queued, before any dispatch.
    /// It terminates as one total and one failure, the same accounting an
    /// in-flight cancellation gets from `record_dispatch` plus
    /// `record_failure`. Requests rejected at submission with an
    /// already-cancelled token are not counted at all.
    pub fn record_cancelled(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Combines the collector's counters with the cache's statistics into a
    /// point-in-time view.
    pub fn snapshot(&self, cache: &CacheStats) -> MetricsSnapshot {
        let samples = self.response_time_samples.load(Ordering::Relaxed);
        let average_response_time_ms = if samples == 0 {
            0.0
        } else {
            self.response_time_total_ms.load(Ordering::Relaxed) as f64 / samples as f64
        };

        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            average_response_time_ms,
            cache_hit_rate: cache.hit_rate(),
            cache_entries: cache.total_entries,
            bandwidth_saved_bytes: self.bandwidth_saved_bytes.load(Ordering::Relaxed),
            generated_at: Utc::now(),
        }
    }

    // == Reset ==
    /// Zeroes every counter.
    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.successful_requests.store(0, Ordering::Relaxed);
        self.failed_requests.store(0, Ordering::Relaxed);
        self.response_time_total_ms.store(0, Ordering::Relaxed);
        self.response_time_samples.store(0, Ordering::Relaxed);
        self.bandwidth_saved_bytes.store(0, Ordering::Relaxed);
    }
}

// == Metrics Snapshot ==
/// Point-in-time metrics view, serializable for the periodic reporter.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time_ms: f64,
    pub cache_hit_rate: f64,
    pub cache_entries: usize,
    pub bandwidth_saved_bytes: u64,
    pub generated_at: DateTime<Utc>,
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot_is_zero() {
        let collector = MetricsCollector::new();
        let snapshot = collector.snapshot(&CacheStats::new());

        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.successful_requests, 0);
        assert_eq!(snapshot.failed_requests, 0);
        assert_eq!(snapshot.average_response_time_ms, 0.0);
        assert_eq!(snapshot.bandwidth_saved_bytes, 0);
    }

    #[test]
    fn test_dispatch_outcomes() {
        let collector = MetricsCollector::new();

        collector.record_dispatch();
        collector.record_success(30);
        collector.record_dispatch();
        collector.record_failure();

        let snapshot = collector.snapshot(&CacheStats::new());
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.successful_requests, 1);
        assert_eq!(snapshot.failed_requests, 1);
    }

    #[test]
    fn test_cancelled_counts_as_failed() {
        let collector = MetricsCollector::new();

        collector.record_cancelled();

        let snapshot = collector.snapshot(&CacheStats::new());
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.successful_requests, 0);
        // No dispatch happened, so no response time sample either
        assert_eq!(snapshot.average_response_time_ms, 0.0);
    }

    #[test]
    fn test_average_response_time() {
        let collector = MetricsCollector::new();

        collector.record_dispatch();
        collector.record_success(10);
        collector.record_dispatch();
        collector.record_success(30);

        let snapshot = collector.snapshot(&CacheStats::new());
        assert!((snapshot.average_response_time_ms - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cache_hit_counts_and_bandwidth() {
        let collector = MetricsCollector::new();

        collector.record_cache_hit(2_048);
        collector.record_cache_hit(512);

        let snapshot = collector.snapshot(&CacheStats::new());
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.successful_requests, 2);
        assert_eq!(snapshot.bandwidth_saved_bytes, 2_560);
        // Cache hits carry no response time samples
        assert_eq!(snapshot.average_response_time_ms, 0.0);
    }

    #[test]
    fn test_hit_rate_comes_from_cache_stats() {
        let collector = MetricsCollector::new();
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.set_total_entries(5);

        let snapshot = collector.snapshot(&stats);
        assert!((snapshot.cache_hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(snapshot.cache_entries, 5);
    }

    #[test]
    fn test_reset_zeroes_counters() {
        let collector = MetricsCollector::new();
        collector.record_dispatch();
        collector.record_success(42);
        collector.record_cache_hit(100);

        collector.reset();

        let snapshot = collector.snapshot(&CacheStats::new());
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.successful_requests, 0);
        assert_eq!(snapshot.average_response_time_ms, 0.0);
        assert_eq!(snapshot.bandwidth_saved_bytes, 0);
    }
}
