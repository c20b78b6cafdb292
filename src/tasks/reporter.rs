//! Metrics Reporter Task
//!
//! Optional background task that periodically logs a metrics snapshot. A
//! logging sink keeps the core free of any telemetry dependency; anything
//! richer can subscribe to the same snapshots through
//! `RequestOrchestrator::metrics`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::orchestrator::RequestOrchestrator;

/// Spawns a background task that logs orchestrator metrics at a fixed
/// interval.
///
/// # Arguments
/// * `service` - Orchestrator to snapshot; clones share the same counters
/// * `report_interval_ms` - Interval in milliseconds between reports
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
pub fn spawn_metrics_reporter(
    service: RequestOrchestrator,
    report_interval_ms: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_millis(report_interval_ms);

    tokio::spawn(async move {
        info!(
            "starting metrics reporter with interval of {} ms",
            report_interval_ms
        );

        loop {
            tokio::time::sleep(interval).await;

            let snapshot = service.metrics().await;
            info!(
                total_requests = snapshot.total_requests,
                successful_requests = snapshot.successful_requests,
                failed_requests = snapshot.failed_requests,
                average_response_time_ms = snapshot.average_response_time_ms,
                cache_hit_rate = snapshot.cache_hit_rate,
                cache_entries = snapshot.cache_entries,
                bandwidth_saved_bytes = snapshot.bandwidth_saved_bytes,
                "request metrics"
            );
        }
    })
}
