//! Dispatch Queue Module
//!
//! Holding pen for batched requests. Requests accumulate here during a
//! debounce window and are drained as one priority-sorted batch.

use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;

use crate::error::Result;
use crate::request::{FetchResponse, RequestDescriptor};

// == Queued Request ==
/// A parked request plus the channel that resolves its caller.
pub struct QueuedRequest {
    pub descriptor: RequestDescriptor,
    pub completion: oneshot::Sender<Result<FetchResponse>>,
    /// When serving began, so the reported duration covers queue wait
    pub started: Instant,
    /// Enqueue order, used to break priority ties
    seq: u64,
}

// == Dispatch Queue ==
/// The pending-request buffer shared between enqueuers and the drain task.
///
/// `drain_armed` tracks whether a drain timer or loop is currently alive.
/// Every transition happens under the same lock as the item list, so a
/// request is always either picked up by the live drain or responsible for
/// arming a new one.
pub struct DispatchQueue {
    inner: Mutex<QueueInner>,
}

struct QueueInner {
    items: Vec<QueuedRequest>,
    next_seq: u64,
    drain_armed: bool,
}

impl DispatchQueue {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: Vec::new(),
                next_seq: 0,
                drain_armed: false,
            }),
        }
    }

    // == Push ==
    /// Parks a request. Returns true when the caller must arm the drain
    /// timer, which happens exactly once per idle-to-busy transition.
    pub async fn push(
        &self,
        descriptor: RequestDescriptor,
        completion: oneshot::Sender<Result<FetchResponse>>,
        started: Instant,
    ) -> bool {
        let mut inner = self.inner.lock().await;

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.items.push(QueuedRequest {
            descriptor,
            completion,
            started,
            seq,
        });

        let must_arm = !inner.drain_armed;
        inner.drain_armed = true;
        must_arm
    }

    // == Take Batch ==
    /// Drains everything queued, sorted by priority rank then enqueue order.
    ///
    /// Returns `None` when the queue is empty, disarming the drain in the
    /// same critical section so the next `push` arms a fresh timer.
    pub async fn take_batch(&self) -> Option<Vec<QueuedRequest>> {
        let mut inner = self.inner.lock().await;

        if inner.items.is_empty() {
            inner.drain_armed = false;
            return None;
        }

        let mut batch = std::mem::take(&mut inner.items);
        batch.sort_by_key(|item| (item.descriptor.priority.rank(), item.seq));
        Some(batch)
    }

    // == Is Empty ==
    /// Whether anything is currently parked.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.items.is_empty()
    }
}
