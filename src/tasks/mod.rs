//! Background Tasks Module
//!
//! Periodic maintenance tasks that run alongside the orchestrator.
//!
//! # Tasks
//! - TTL cleanup: removes expired cache entries at configured intervals
//! - Metrics reporter: logs a metrics snapshot at configured intervals

mod cleanup;
mod reporter;

pub use cleanup::spawn_cleanup_task;
pub use reporter::spawn_metrics_reporter;
