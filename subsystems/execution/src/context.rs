//! # Context Switching
//!
//! What the scheduler hands to the context-switch primitive.

use crate::ThreadId;
use isokern_hal::context::ExecutionContext;

/// Context switch reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchReason {
    /// The thread finished a work unit
    Yield,
    /// Timer tick
    Preemption,
}

/// A pending transfer of the core between two saved states
#[derive(Debug)]
pub(crate) struct Transfer {
    pub(crate) from_id: ThreadId,
    pub(crate) to_id: ThreadId,
    pub(crate) from: *mut ExecutionContext,
    pub(crate) to: *const ExecutionContext,
}

/// Outcome of the selection half of a preemption
#[derive(Debug)]
pub(crate) enum Preemption {
    /// Selected thread is already current
    Stay,
    /// Switch to another thread
    Switch(Transfer),
}
