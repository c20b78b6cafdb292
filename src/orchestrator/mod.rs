//! Request Orchestration Module
//!
//! Priority routing, debounced batching, windowed dispatch, retries, and
//! cancellation around the cache.

mod queue;
mod service;

pub use service::RequestOrchestrator;
