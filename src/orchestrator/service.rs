//! Orchestrator Service Module
//!
//! The public entry point for callers. Performs cache-aside lookups, routes
//! misses by priority (direct dispatch or debounced batches), bounds batch
//! concurrency with a whole-window barrier, retries with exponential
//! backoff, enforces per-attempt timeouts, and honors cancellation tokens.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use regex::Regex;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{CacheStore, Codec};
use crate::config::Config;
use crate::error::{FetchError, Result};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::orchestrator::queue::{DispatchQueue, QueuedRequest};
use crate::refresh::{FlightGuard, FlightOutcome, RefreshCoordinator};
use crate::request::{
    FetchResponse, Method, PrefetchRequest, Priority, RequestDescriptor, RequestOptions,
};
use crate::transport::{HttpTransport, Transport, TransportReply};

// == Request Orchestrator ==
/// Cache-fronted request pipeline.
///
/// Cloning is cheap and every clone shares the same cache, queue, metrics,
/// and in-flight registry. Construct one per isolated cache domain; there is
/// no process-wide instance.
#[derive(Clone)]
pub struct RequestOrchestrator {
    config: Arc<Config>,
    cache: Arc<RwLock<CacheStore>>,
    refresh: Arc<RefreshCoordinator>,
    metrics: Arc<MetricsCollector>,
    transport: Arc<dyn Transport>,
    queue: Arc<DispatchQueue>,
    /// Cancellation tokens of requests currently being served, by request id
    active: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl RequestOrchestrator {
    // == Constructors ==
    /// Creates an orchestrator backed by the real HTTP transport.
    ///
    /// # Errors
    /// Returns `FetchError::Internal` when the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new()?);
        Ok(Self::with_transport(config, transport))
    }

    /// Creates an orchestrator with an injected transport.
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        let codec = Codec::new(
            config.enable_compression,
            config.compression_threshold_bytes,
        );
        let cache = CacheStore::new(config.max_cache_size, config.default_ttl_ms, codec);

        Self {
            config: Arc::new(config),
            cache: Arc::new(RwLock::new(cache)),
            refresh: Arc::new(RefreshCoordinator::new()),
            metrics: Arc::new(MetricsCollector::new()),
            transport,
            queue: Arc::new(DispatchQueue::new()),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    // == Request ==
    /// Serves one request: from cache when possible, otherwise through the
    /// priority-routed dispatch pipeline.
    ///
    /// # Errors
    /// Retries happen internally; only the final classification surfaces:
    /// a non-retryable failure, the last error after retries are exhausted,
    /// or `FetchError::Cancelled`.
    pub async fn request(&self, url: &str, options: RequestOptions) -> Result<FetchResponse> {
        let descriptor = RequestDescriptor::resolve(url, options, self.config.default_ttl_ms);

        if descriptor.token.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let id = descriptor.id;
        self.active
            .lock()
            .await
            .insert(id, descriptor.token.clone());

        let result = self.serve(descriptor).await;

        self.active.lock().await.remove(&id);
        result
    }

    // == Convenience Wrappers ==
    /// GET request.
    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<FetchResponse> {
        self.request(
            url,
            RequestOptions {
                method: Method::Get,
                ..options
            },
        )
        .await
    }

    /// POST request.
    pub async fn post(&self, url: &str, options: RequestOptions) -> Result<FetchResponse> {
        self.request(
            url,
            RequestOptions {
                method: Method::Post,
                ..options
            },
        )
        .await
    }

    /// PUT request.
    pub async fn put(&self, url: &str, options: RequestOptions) -> Result<FetchResponse> {
        self.request(
            url,
            RequestOptions {
                method: Method::Put,
                ..options
            },
        )
        .await
    }

    /// DELETE request.
    pub async fn delete(&self, url: &str, options: RequestOptions) -> Result<FetchResponse> {
        self.request(
            url,
            RequestOptions {
                method: Method::Delete,
                ..options
            },
        )
        .await
    }

    /// PATCH request.
    pub async fn patch(&self, url: &str, options: RequestOptions) -> Result<FetchResponse> {
        self.request(
            url,
            RequestOptions {
                method: Method::Patch,
                ..options
            },
        )
        .await
    }

    // == Prefetch ==
    /// Fire-and-forget cache warm-up. Each entry becomes a low priority GET
    /// whose failure is swallowed; the cache key defaults to the URL.
    pub fn prefetch(&self, requests: Vec<PrefetchRequest>) {
        for entry in requests {
            let service = self.clone();
            tokio::spawn(async move {
                let url = entry.url;
                let cache_key = entry.cache_key.unwrap_or_else(|| url.clone());
                let options = RequestOptions {
                    cache_key: Some(cache_key),
                    cache_ttl_ms: entry.cache_ttl_ms,
                    priority: Priority::Low,
                    ..Default::default()
                };

                if let Err(e) = service.request(&url, options).await {
                    debug!(url = %url, "prefetch failed: {}", e);
                }
            });
        }
    }

    // == Health Check ==
    /// Single high priority request with one retry. True when the endpoint
    /// answers with a status below 400.
    pub async fn health_check(&self, url: &str) -> bool {
        let options = RequestOptions {
            priority: Priority::High,
            retry_count: Some(1),
            ..Default::default()
        };
        self.request(url, options).await.is_ok()
    }

    // == Metrics ==
    /// Point-in-time metrics combining request counters and cache stats.
    pub async fn metrics(&self) -> MetricsSnapshot {
        let stats = self.cache.read().await.stats();
        self.metrics.snapshot(&stats)
    }

    // == Cache Administration ==
    /// Empties the cache.
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    /// Removes one cached entry. Returns whether it existed.
    pub async fn invalidate(&self, key: &str) -> bool {
        self.cache.write().await.delete(key)
    }

    /// Removes every cached entry whose key matches the pattern.
    pub async fn invalidate_pattern(&self, pattern: &Regex) -> usize {
        self.cache.write().await.invalidate_pattern(pattern)
    }

    /// Shared handle to the underlying store. Collaborators that bust cache
    /// entries after writes operate on this same store, not a private copy.
    pub fn cache(&self) -> Arc<RwLock<CacheStore>> {
        self.cache.clone()
    }

    /// The orchestrator's resolved configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    // == Cancellation ==
    /// Cancels one request by id. Returns false when no such request is
    /// being served.
    pub async fn cancel_request(&self, id: Uuid) -> bool {
        match self.active.lock().await.get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every request currently being served and returns how many.
    pub async fn cancel_all_requests(&self) -> usize {
        let active = self.active.lock().await;
        for token in active.values() {
            token.cancel();
        }
        active.len()
    }

    // == Serve ==
    /// Cache-aside lookup, then priority routing on a miss.
    async fn serve(&self, descriptor: RequestDescriptor) -> Result<FetchResponse> {
        let started = Instant::now();

        if let Some(key) = descriptor.cache_key.clone() {
            let (payload, fraction, entry_ttl_ms) = {
                let mut cache = self.cache.write().await;
                let payload = cache.get(&key);
                let fraction = cache.remaining_fraction(&key);
                let entry_ttl_ms = cache.ttl_ms(&key);
                (payload, fraction, entry_ttl_ms)
            };

            if let Some(payload) = payload {
                self.metrics.record_cache_hit(payload.len());
                self.maybe_refresh(&key, fraction, entry_ttl_ms, &descriptor);

                debug!(key = %key, "served from cache");
                return Ok(FetchResponse {
                    data: payload,
                    status: 200,
                    headers: HashMap::new(),
                    cached: true,
                    duration_ms: started.elapsed().as_millis() as u64,
                });
            }
        }

        let direct = match descriptor.priority {
            Priority::High => true,
            Priority::Normal => self.queue.is_empty().await,
            Priority::Low => false,
        };

        if direct {
            self.dispatch(&descriptor, started).await
        } else {
            self.enqueue_and_wait(descriptor, started).await
        }
    }

    // == Stale-While-Revalidate ==
    /// Spawns a background refresh when the served entry is close to expiry
    /// and no flight for its key is already running. The refreshed entry
    /// keeps the stale entry's stored TTL, not the triggering caller's.
    fn maybe_refresh(
        &self,
        key: &str,
        remaining_fraction: Option<f64>,
        entry_ttl_ms: Option<u64>,
        descriptor: &RequestDescriptor,
    ) {
        if !self.config.enable_background_refresh {
            return;
        }
        let (Some(fraction), Some(ttl_ms)) = (remaining_fraction, entry_ttl_ms) else {
            return;
        };
        if fraction >= self.config.refresh_threshold {
            return;
        }
        let Some(lead) = self.refresh.try_lead(key) else {
            return;
        };

        debug!(key = %key, fraction, "entry near expiry, refreshing in background");
        self.spawn_background_refresh(key.to_string(), lead, ttl_ms, descriptor.clone());
    }

    /// Runs one detached refresh dispatch for `key`. The task settles the
    /// flight lead it was handed: by completion, or by drop if the task
    /// itself dies.
    fn spawn_background_refresh(
        &self,
        key: String,
        lead: FlightGuard,
        entry_ttl_ms: u64,
        descriptor: RequestDescriptor,
    ) {
        let service = self.clone();
        tokio::spawn(async move {
            // The refresh outlives the caller: fresh id, fresh token, and the
            // entry's own TTL rather than whatever the trigger asked for
            let refreshed = RequestDescriptor {
                id: Uuid::new_v4(),
                token: CancellationToken::new(),
                cache_ttl_ms: entry_ttl_ms,
                ..descriptor
            };

            let outcome: FlightOutcome = match service.dispatch(&refreshed, Instant::now()).await {
                Ok(response) => Ok(response.data),
                Err(e) => {
                    warn!(key = %key, "background refresh failed, serving stale entry: {}", e);
                    Err(Arc::new(e))
                }
            };

            lead.complete(outcome);
        });
    }

    // == Enqueue ==
    /// Parks the request for batched dispatch and waits for its outcome.
    async fn enqueue_and_wait(
        &self,
        descriptor: RequestDescriptor,
        started: Instant,
    ) -> Result<FetchResponse> {
        let token = descriptor.token.clone();
        let window = Duration::from_millis(descriptor.priority.debounce_window_ms());
        let (tx, rx) = oneshot::channel();

        if self.queue.push(descriptor, tx, started).await {
            let service = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                service.run_drain().await;
            });
        }

        tokio::select! {
            _ = token.cancelled() => Err(FetchError::Cancelled),
            outcome = rx => match outcome {
                Ok(result) => result,
                Err(_) => Err(FetchError::Internal(
                    "request dropped from dispatch queue".to_string(),
                )),
            },
        }
    }

    // == Drain ==
    /// Dispatches queued batches in windows of at most
    /// `max_concurrent_requests`, awaiting full settlement of each window
    /// before starting the next. Runs until the queue is observed empty.
    async fn run_drain(&self) {
        while let Some(batch) = self.queue.take_batch().await {
            debug!(batch_size = batch.len(), "draining request queue");

            let mut remaining = batch;
            while !remaining.is_empty() {
                let window_len = remaining
                    .len()
                    .min(self.config.max_concurrent_requests.max(1));
                let window: Vec<QueuedRequest> = remaining.drain(..window_len).collect();

                let settling = window.into_iter().map(|queued| {
                    let service = self.clone();
                    async move {
                        let result = if queued.descriptor.token.is_cancelled() {
                            // Skipped before dispatch; still a terminal
                            // failure in the totals
                            service.metrics.record_cancelled();
                            Err(FetchError::Cancelled)
                        } else {
                            service.dispatch(&queued.descriptor, queued.started).await
                        };
                        // The caller may have given up (cancelled); ignore
                        let _ = queued.completion.send(result);
                    }
                });

                // Whole-window barrier, not a rolling pipeline
                join_all(settling).await;
            }
        }
    }

    // == Dispatch ==
    /// One request through the retry loop, with metrics and cache fill.
    /// The response duration runs from `started`, which the serve path
    /// anchors at entry so queue wait is part of it.
    async fn dispatch(
        &self,
        descriptor: &RequestDescriptor,
        started: Instant,
    ) -> Result<FetchResponse> {
        self.metrics.record_dispatch();

        match self.run_attempts(descriptor).await {
            Ok(reply) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                self.metrics.record_success(duration_ms);

                if let Some(key) = &descriptor.cache_key {
                    let stored = self.cache.write().await.set(
                        key.clone(),
                        &reply.body,
                        Some(descriptor.cache_ttl_ms),
                    );
                    if let Err(e) = stored {
                        warn!(key = %key, "response not cached: {}", e);
                    }
                }

                Ok(FetchResponse {
                    data: reply.body,
                    status: reply.status,
                    headers: reply.headers,
                    cached: false,
                    duration_ms,
                })
            }
            Err(e) => {
                self.metrics.record_failure();
                Err(e)
            }
        }
    }

    // == Attempts ==
    /// Retry loop: 1 initial attempt plus `retry_count` retries, backing off
    /// along the configured ladder between retryable failures.
    async fn run_attempts(&self, descriptor: &RequestDescriptor) -> Result<TransportReply> {
        let max_attempts = descriptor.retry_count + 1;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            if descriptor.token.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let error = match self.attempt_once(descriptor).await {
                Ok(reply) => return Ok(reply),
                Err(e) => e,
            };

            if !error.is_retryable() || attempt >= max_attempts {
                return Err(error);
            }

            let delay = backoff_delay(&self.config.retry_delay_ladder_ms, attempt - 1);
            debug!(
                url = %descriptor.url,
                attempt,
                "attempt failed ({}), retrying in {:?}",
                error,
                delay
            );

            tokio::select! {
                _ = descriptor.token.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One network attempt bounded by the descriptor's timeout and token.
    async fn attempt_once(&self, descriptor: &RequestDescriptor) -> Result<TransportReply> {
        let attempt = tokio::select! {
            _ = descriptor.token.cancelled() => return Err(FetchError::Cancelled),
            outcome = tokio::time::timeout(descriptor.timeout, self.transport.execute(descriptor)) => outcome,
        };

        let reply = match attempt {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(FetchError::Timeout(descriptor.timeout.as_millis() as u64));
            }
        };

        match FetchError::from_status(reply.status) {
            Some(e) => Err(e),
            None => Ok(reply),
        }
    }
}

// == Backoff ==
/// Delay before retry number `retry_index` (zero-based), clamped to the last
/// ladder entry. An empty ladder falls back to one second.
fn backoff_delay(ladder_ms: &[u64], retry_index: u32) -> Duration {
    let ms = ladder_ms
        .get(retry_index as usize)
        .or_else(|| ladder_ms.last())
        .copied()
        .unwrap_or(1_000);
    Duration::from_millis(ms)
}
