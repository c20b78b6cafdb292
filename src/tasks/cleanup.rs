//! TTL Cleanup Task
//!
//! Background task that periodically removes expired cache entries, bounding
//! memory even for keys that are never read again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;

/// Spawns a background task that periodically sweeps expired cache entries.
///
/// The task runs in an infinite loop, sleeping for the configured interval
/// between sweeps. Lazy expiry on `get` already hides dead entries from
/// callers; this sweep reclaims the ones nobody asks for anymore.
///
/// # Arguments
/// * `cache` - Shared handle to the cache store
/// * `cleanup_interval_ms` - Interval in milliseconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
pub fn spawn_cleanup_task(
    cache: Arc<RwLock<CacheStore>>,
    cleanup_interval_ms: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_millis(cleanup_interval_ms);

    tokio::spawn(async move {
        info!(
            "starting TTL cleanup task with interval of {} ms",
            cleanup_interval_ms
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = {
                let mut cache_guard = cache.write().await;
                cache_guard.cleanup_expired()
            };

            if removed > 0 {
                info!("TTL cleanup removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup found no expired entries");
            }
        }
    })
}
