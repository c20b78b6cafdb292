//! fetch-cache - client-side response caching and request orchestration
//!
//! A TTL/LRU response cache with stale-while-revalidate refresh, fronted by
//! a request orchestrator that prioritizes, batches, bounds concurrency,
//! retries with backoff, and enforces timeouts on network calls.

pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod refresh;
pub mod request;
pub mod tasks;
pub mod transport;

pub use cache::{CacheStats, CacheStore};
pub use config::Config;
pub use error::{FetchError, Result};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use orchestrator::RequestOrchestrator;
pub use refresh::{RefreshCoordinator, RefreshState};
pub use request::{
    FetchResponse, Method, PrefetchRequest, Priority, RequestDescriptor, RequestOptions,
};
pub use tasks::{spawn_cleanup_task, spawn_metrics_reporter};
pub use transport::{HttpTransport, Transport, TransportReply};
