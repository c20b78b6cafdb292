//! Refresh Coordination Module
//!
//! Single-flight tracking for cache fills and background refreshes. For any
//! cache key, at most one fetch may be in flight at a time; concurrent
//! callers hitting the same cold key share the one result instead of each
//! going to the network.
//!
//! Leadership is a guard value. Completing the guard broadcasts the outcome;
//! dropping it mid-fetch (the leader timed out, lost a `select!` branch, or
//! its task died) releases the key and wakes waiters, so an abandoned fetch
//! never wedges a key.
//!
//! The same pending-set backs stale-while-revalidate: a key is only eligible
//! for a background refresh while no flight for it is already running.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::error::{FetchError, Result};

/// Terminal result of one flight, shared by the leader with every waiter.
pub type FlightOutcome = std::result::Result<Bytes, Arc<FetchError>>;

type PendingMap = HashMap<String, broadcast::Sender<FlightOutcome>>;

// == Flight ==
/// A caller's role in the flight for a key.
pub enum Flight {
    /// This caller must perform the fetch and settle the guard
    Leader(FlightGuard),
    /// Another caller is fetching; await the broadcast outcome
    Waiter(broadcast::Receiver<FlightOutcome>),
}

// == Refresh State ==
/// Whether a key currently has a flight running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

// == Flight Guard ==
/// Proof of leadership for one key's flight.
///
/// The flight ends when the guard does: `complete` removes the pending entry
/// and broadcasts the outcome, while dropping the guard uncompleted removes
/// the entry and closes the channel, waking waiters so the next caller can
/// lead a fresh flight.
pub struct FlightGuard {
    key: String,
    pending: Arc<Mutex<PendingMap>>,
    completed: bool,
}

impl FlightGuard {
    // == Complete ==
    /// Ends the flight and broadcasts its outcome to waiters.
    ///
    /// The key is removed before the send, so a caller arriving after
    /// completion starts a fresh flight instead of waiting on a finished
    /// one.
    pub fn complete(mut self, outcome: FlightOutcome) {
        self.completed = true;
        let sender = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
        if let Some(sender) = sender {
            // No waiters is fine; the leader already has the outcome
            let _ = sender.send(outcome);
        }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        // The leader vanished mid-fetch. Removing the entry drops the sender,
        // which closes the channel: waiters wake with `Closed` and the key is
        // free to lead again.
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
        debug!(key = %self.key, "flight abandoned before completion");
    }
}

// == Refresh Coordinator ==
/// Pending-set keyed on cache key. A key present in the set has exactly one
/// in-flight fetch; the stored sender fans the outcome out to waiters.
///
/// The set sits behind a synchronous lock so `FlightGuard` can release it
/// from `Drop`; no holder ever awaits while locked.
pub struct RefreshCoordinator {
    pending: Arc<Mutex<PendingMap>>,
}

impl RefreshCoordinator {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers a new flight for `key`. The pending-set lock must be held.
    fn claim(&self, pending: &mut PendingMap, key: &str) -> FlightGuard {
        let (sender, _) = broadcast::channel(1);
        pending.insert(key.to_string(), sender);
        FlightGuard {
            key: key.to_string(),
            pending: Arc::clone(&self.pending),
            completed: false,
        }
    }

    // == Join Or Lead ==
    /// Joins the flight for a key, creating one if none is running.
    ///
    /// The waiter's receiver is subscribed while the pending-set lock is
    /// held, so an outcome can never slip past between joining and
    /// listening.
    pub fn join_or_lead(&self, key: &str) -> Flight {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        match pending.get(key) {
            Some(sender) => Flight::Waiter(sender.subscribe()),
            None => Flight::Leader(self.claim(&mut pending, key)),
        }
    }

    // == Try Lead ==
    /// Claims the flight for a key only if none is running.
    ///
    /// Used by the stale-while-revalidate path, which never waits on an
    /// existing flight: if a refresh is already running, there is nothing to
    /// do.
    pub fn try_lead(&self, key: &str) -> Option<FlightGuard> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.contains_key(key) {
            None
        } else {
            Some(self.claim(&mut pending, key))
        }
    }

    // == State ==
    /// Reports whether a key currently has a flight in progress.
    pub fn state(&self, key: &str) -> RefreshState {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.contains_key(key) {
            RefreshState::Refreshing
        } else {
            RefreshState::Idle
        }
    }

    // == Get Or Fetch ==
    /// Cache read-through with single-flight.
    ///
    /// On a hit, returns the cached payload without invoking `fetch_fn`. On
    /// a miss, exactly one concurrent caller runs `fetch_fn`; its result is
    /// stored in the cache and every caller racing on the same key receives
    /// the same payload or the same error. When a leader is dropped
    /// mid-fetch, its waiters rejoin and one of them leads the retry.
    ///
    /// # Errors
    /// Waiters (and the leader itself) see a fetch failure as
    /// `FetchError::Shared` wrapping the leader's error; retryability
    /// classification is preserved through the wrapper.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        store: &RwLock<CacheStore>,
        key: &str,
        fetch_fn: F,
        ttl_ms: Option<u64>,
    ) -> Result<Bytes>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes>>,
    {
        let guard = loop {
            if let Some(payload) = store.write().await.get(key) {
                return Ok(payload);
            }

            match self.join_or_lead(key) {
                Flight::Leader(guard) => break guard,
                Flight::Waiter(mut receiver) => match receiver.recv().await {
                    Ok(Ok(payload)) => return Ok(payload),
                    Ok(Err(shared)) => return Err(FetchError::Shared(shared)),
                    // The leader was dropped without an outcome; its guard
                    // has already released the key, so rejoin
                    Err(_) => continue,
                },
            }
        };

        // A previous flight may have filled the cache between our miss and
        // claiming leadership
        if let Some(payload) = store.write().await.get(key) {
            guard.complete(Ok(payload.clone()));
            return Ok(payload);
        }

        let outcome: FlightOutcome = match fetch_fn().await {
            Ok(payload) => {
                let result = store.write().await.set(key.to_string(), &payload, ttl_ms);
                if let Err(e) = result {
                    warn!("failed to cache fetched payload for '{}': {}", key, e);
                }
                Ok(payload)
            }
            Err(e) => Err(Arc::new(e)),
        };

        guard.complete(outcome.clone());
        outcome.map_err(FetchError::Shared)
    }
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Codec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn shared_store() -> Arc<RwLock<CacheStore>> {
        Arc::new(RwLock::new(CacheStore::new(
            100,
            300_000,
            Codec::new(true, 1024),
        )))
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_ten_concurrent_callers() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let store = shared_store();
        let fetch_calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let coordinator = coordinator.clone();
            let store = store.clone();
            let fetch_calls = fetch_calls.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .get_or_fetch(&store, "cold-key", || async move {
                        fetch_calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(25)).await;
                        Ok(Bytes::from_static(b"fetched"))
                    }, None)
                    .await
            }));
        }

        for handle in handles {
            let payload = handle.await.unwrap().unwrap();
            assert_eq!(payload.as_ref(), b"fetched");
        }
        assert_eq!(fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_fetch_hit_skips_fetch() {
        let coordinator = RefreshCoordinator::new();
        let store = shared_store();
        store
            .write()
            .await
            .set("warm-key".to_string(), b"cached", None)
            .unwrap();

        let payload = coordinator
            .get_or_fetch(&*store, "warm-key", || async {
                panic!("fetch must not run on a hit")
            }, None)
            .await
            .unwrap();

        assert_eq!(payload.as_ref(), b"cached");
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_share_leader_error() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let store = shared_store();
        let fetch_calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let coordinator = coordinator.clone();
            let store = store.clone();
            let fetch_calls = fetch_calls.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .get_or_fetch(&store, "failing-key", || async move {
                        fetch_calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Err(FetchError::Network("connection reset".to_string()))
                    }, None)
                    .await
            }));
        }

        for handle in handles {
            let error = handle.await.unwrap().unwrap_err();
            assert!(error.is_retryable());
        }
        assert_eq!(fetch_calls.load(Ordering::SeqCst), 1);
        assert!(store.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_try_lead_excludes_second_claim() {
        let coordinator = RefreshCoordinator::new();

        let lead = coordinator.try_lead("key").expect("first claim leads");
        assert!(coordinator.try_lead("key").is_none());

        lead.complete(Ok(Bytes::from_static(b"done")));
        assert!(coordinator.try_lead("key").is_some());
    }

    #[tokio::test]
    async fn test_state_tracks_flight_lifecycle() {
        let coordinator = RefreshCoordinator::new();

        assert_eq!(coordinator.state("key"), RefreshState::Idle);

        let lead = coordinator.try_lead("key").expect("claim succeeds");
        assert_eq!(coordinator.state("key"), RefreshState::Refreshing);

        lead.complete(Err(Arc::new(FetchError::Cancelled)));
        assert_eq!(coordinator.state("key"), RefreshState::Idle);

        // Keys are independent
        let _other = coordinator.try_lead("other").expect("claim succeeds");
        assert_eq!(coordinator.state("other"), RefreshState::Refreshing);
        assert_eq!(coordinator.state("key"), RefreshState::Idle);
    }

    #[tokio::test]
    async fn test_dropped_guard_releases_key() {
        let coordinator = RefreshCoordinator::new();

        let lead = coordinator.try_lead("key").expect("claim succeeds");
        assert_eq!(coordinator.state("key"), RefreshState::Refreshing);

        drop(lead);

        assert_eq!(coordinator.state("key"), RefreshState::Idle);
        assert!(coordinator.try_lead("key").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_leader_releases_key() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let store = shared_store();

        // The first caller gives up mid-fetch and drops its future
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            coordinator.get_or_fetch(&store, "key", || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Bytes::from_static(b"never"))
            }, None),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(coordinator.state("key"), RefreshState::Idle);

        // The key is free: the next caller leads instead of waiting on the
        // dead flight
        let second = tokio::time::timeout(
            Duration::from_millis(200),
            coordinator.get_or_fetch(&store, "key", || async {
                Ok(Bytes::from_static(b"second"))
            }, None),
        )
        .await
        .expect("second caller must not hang")
        .unwrap();
        assert_eq!(second.as_ref(), b"second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_recover_when_leader_is_abandoned() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let store = shared_store();
        let fetch_calls = Arc::new(AtomicUsize::new(0));

        let leader = {
            let coordinator = coordinator.clone();
            let store = store.clone();
            tokio::spawn(async move {
                let _ = tokio::time::timeout(
                    Duration::from_millis(30),
                    coordinator.get_or_fetch(&store, "key", || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(Bytes::from_static(b"never"))
                    }, None),
                )
                .await;
            })
        };
        // Let the leader claim the flight before the waiter joins
        tokio::time::sleep(Duration::from_millis(5)).await;

        let waiter = {
            let coordinator = coordinator.clone();
            let store = store.clone();
            let fetch_calls = fetch_calls.clone();
            tokio::spawn(async move {
                coordinator
                    .get_or_fetch(&store, "key", || async move {
                        fetch_calls.fetch_add(1, Ordering::SeqCst);
                        Ok(Bytes::from_static(b"rescued"))
                    }, None)
                    .await
            })
        };

        leader.await.unwrap();
        let payload = tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("waiter must not hang")
            .unwrap()
            .unwrap();

        assert_eq!(payload.as_ref(), b"rescued");
        assert_eq!(fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_runs_again_after_completion() {
        let coordinator = RefreshCoordinator::new();
        let store = shared_store();
        let fetch_calls = Arc::new(AtomicUsize::new(0));

        for round in 0..2u8 {
            let fetch_calls = fetch_calls.clone();
            let payload = coordinator
                .get_or_fetch(&*store, "key", || async move {
                    fetch_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Bytes::from(vec![round]))
                }, Some(0))
                .await
                .unwrap();
            assert_eq!(payload.as_ref(), &[round]);
        }

        // TTL of zero expires instantly, so both rounds fetched
        assert_eq!(fetch_calls.load(Ordering::SeqCst), 2);
    }
}
