//! # Scheduler
//!
//! Strict round robin over the threads of one isolate. Threads created from
//! anywhere land in their engine's [`ThreadInbox`] and join the rotation only
//! when the owning core drains it.

pub mod inbox;
pub mod manager;
pub mod metrics;

pub use inbox::{ThreadDrain, ThreadInbox};
pub use manager::ThreadManager;
pub use metrics::SchedulerMetrics;
