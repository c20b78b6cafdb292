//! Request Model Module
//!
//! Types describing a fetch: the caller-facing options, the resolved
//! descriptor handed to the dispatch pipeline, and the response handed back.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// == Defaults ==
/// Per-attempt timeout applied to high priority requests without an explicit one
pub const HIGH_PRIORITY_TIMEOUT_MS: u64 = 5_000;

/// Per-attempt timeout applied to normal and low priority requests
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Retries after the initial attempt when none are configured
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Debounce window before a normal priority batch drains
pub const NORMAL_DEBOUNCE_WINDOW_MS: u64 = 50;

/// Debounce window before a low priority batch drains
pub const LOW_DEBOUNCE_WINDOW_MS: u64 = 100;

// == Method ==
/// HTTP method for a request. Defaults to GET.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    /// Returns the method's wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
        }
    }
}

// == Priority ==
/// Dispatch priority. High skips the batching queue entirely; normal and low
/// accumulate behind debounce windows of different lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Sort rank within a drained batch; lower dispatches first.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }

    /// Debounce window armed when a request of this priority enqueues first.
    ///
    /// High priority never reaches the queue, so its window is unused.
    pub fn debounce_window_ms(&self) -> u64 {
        match self {
            Priority::High => 0,
            Priority::Normal => NORMAL_DEBOUNCE_WINDOW_MS,
            Priority::Low => LOW_DEBOUNCE_WINDOW_MS,
        }
    }
}

// == Request Options ==
/// Caller-facing knobs for a single request. Every field has a default, so
/// callers set only what they need:
///
/// ```
/// use fetch_cache::{Priority, RequestOptions};
///
/// let options = RequestOptions {
///     cache_key: Some("vehicles:list".to_string()),
///     priority: Priority::High,
///     ..Default::default()
/// };
/// # let _ = options;
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// HTTP method (default GET)
    pub method: Method,
    /// Extra request headers
    pub headers: HashMap<String, String>,
    /// Request body, sent as-is
    pub body: Option<Bytes>,
    /// Cache key; when set, responses are served from and stored to the cache
    pub cache_key: Option<String>,
    /// TTL for the cached response (default: the orchestrator's default TTL)
    pub cache_ttl_ms: Option<u64>,
    /// Dispatch priority (default normal)
    pub priority: Priority,
    /// Per-attempt timeout override in milliseconds
    pub timeout_ms: Option<u64>,
    /// Retries after the initial attempt (default 3)
    pub retry_count: Option<u32>,
    /// Request id; generated when absent. Needed to cancel by id later.
    pub id: Option<Uuid>,
    /// Cancellation token; a fresh one is created when absent
    pub cancellation_token: Option<CancellationToken>,
}

// == Request Descriptor ==
/// A fully resolved request: every optional knob replaced by its effective
/// value. This is what the dispatch pipeline works with.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub id: Uuid,
    pub url: String,
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub cache_key: Option<String>,
    pub cache_ttl_ms: u64,
    pub priority: Priority,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Retries after the initial attempt
    pub retry_count: u32,
    pub token: CancellationToken,
}

impl RequestDescriptor {
    // == Resolve ==
    /// Fills in every default: id, timeout by priority, retry count, cache
    /// TTL, and cancellation token.
    pub fn resolve(
        url: impl Into<String>,
        options: RequestOptions,
        default_cache_ttl_ms: u64,
    ) -> Self {
        let priority = options.priority;
        let timeout_ms = options.timeout_ms.unwrap_or(match priority {
            Priority::High => HIGH_PRIORITY_TIMEOUT_MS,
            Priority::Normal | Priority::Low => DEFAULT_TIMEOUT_MS,
        });

        Self {
            id: options.id.unwrap_or_else(Uuid::new_v4),
            url: url.into(),
            method: options.method,
            headers: options.headers,
            body: options.body,
            cache_key: options.cache_key,
            cache_ttl_ms: options.cache_ttl_ms.unwrap_or(default_cache_ttl_ms),
            priority,
            timeout: Duration::from_millis(timeout_ms),
            retry_count: options.retry_count.unwrap_or(DEFAULT_RETRY_COUNT),
            token: options.cancellation_token.unwrap_or_default(),
        }
    }
}

// == Fetch Response ==
/// What a completed request hands back to the caller.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Response body
    pub data: Bytes,
    /// HTTP status code; 200 for cache-served responses
    pub status: u16,
    /// Response headers; empty for cache-served responses
    pub headers: HashMap<String, String>,
    /// Whether the response came from the cache instead of the network
    pub cached: bool,
    /// Wall time spent serving this request in milliseconds, measured from
    /// entry into the pipeline, so queue wait and retries are included
    pub duration_ms: u64,
}

impl FetchResponse {
    /// Deserializes the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.data)
    }
}

// == Prefetch Request ==
/// One entry in a fire-and-forget cache warm-up batch.
#[derive(Debug, Clone)]
pub struct PrefetchRequest {
    pub url: String,
    /// Cache key; defaults to the URL itself when absent
    pub cache_key: Option<String>,
    pub cache_ttl_ms: Option<u64>,
}
