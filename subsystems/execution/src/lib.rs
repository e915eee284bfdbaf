//! # Isokern Execution Subsystem
//!
//! The execution subsystem manages:
//! - One [`Engine`](engine::Engine) per physical core (a service core and
//!   execution cores)
//! - One [`Isolate`](isolate::Isolate) per execution core, hosting a
//!   cooperative round-robin [`ThreadManager`](scheduler::ThreadManager)
//! - Threads, their mailboxes and the shared entry trampoline
//! - Processes grouping threads across engines
//! - The boot sequence that starts the first process
//!
//! ## Key Principle
//!
//! Nothing here is global. The [`Engines`](engines::Engines) registry is the
//! root object; it is constructed explicitly and hands its collaborators to
//! every engine through constructors.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod boot;
pub mod config;
pub mod context;
pub mod engine;
pub mod engines;
pub mod isolate;
pub mod platform;
pub mod process;
pub mod runtime;
pub mod scheduler;
pub mod thread;

mod percore;
mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use config::KernelConfig;
pub use engine::{Engine, EngineRole};
pub use engines::Engines;
pub use platform::Platform;

use core::fmt;
use isokern_hal::HalError;

/// Thread identifier, unique within one engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u64);

impl ThreadId {
    /// First id handed out; 0 and 1 are reserved
    pub const FIRST: Self = Self(2);

    /// Wrap a raw id
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(u64);

impl ProcessId {
    /// Wrap a raw id
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Execution result type
pub type ExecResult<T> = Result<T, ExecError>;

/// Execution errors
///
/// Every variant is fatal for the kernel: the `try_*` entry points report
/// them, everything else passes them to [`fatal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    /// Fewer than two cores; one is reserved for the service engine
    InsufficientCores(usize),
    /// The boot image has no (or an empty) startup program
    MissingStartupProgram(&'static str),
    /// Engine index out of range
    EngineOutOfRange {
        /// Requested index
        index: usize,
        /// Number of engines of the requested kind
        count: usize,
    },
    /// Operation requires an execution engine
    NotExecutionEngine(usize),
    /// `Enter` ran twice on the same core
    EngineAlreadyEntered(usize),
    /// An isolate is already attached
    EngineAlreadyInitialized(usize),
    /// No isolate is attached yet
    EngineNotInitialized(usize),
    /// Isolate state touched from a core that does not own it
    WrongCore {
        /// Owning core
        owner: usize,
        /// Calling core
        caller: usize,
    },
    /// Non-isolate sleep requested on a core with a live isolate
    SleepOnLiveEngine(usize),
    /// Thread manager has no thread to run
    NoRunnableThread(usize),
    /// Thread id space exhausted
    ThreadIdsExhausted,
    /// Thread stack could not be allocated or wired
    StackAllocation(HalError),
    /// A thread outlived its engine
    OrphanThread(ThreadId),
    /// The boot stack was resumed after handing the core to the scheduler
    BootContextResumed(usize),
    /// Configuration rejected
    InvalidConfig(&'static str),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientCores(n) => {
                write!(f, "at least 2 cores required (service + execution), found {}", n)
            }
            Self::MissingStartupProgram(path) => {
                write!(f, "Unable to load {} from initrd.", path)
            }
            Self::EngineOutOfRange { index, count } => {
                write!(f, "engine index {} out of range ({} engines)", index, count)
            }
            Self::NotExecutionEngine(id) => write!(f, "engine {} is not an execution engine", id),
            Self::EngineAlreadyEntered(id) => write!(f, "engine {} entered twice", id),
            Self::EngineAlreadyInitialized(id) => write!(f, "engine {} already has an isolate", id),
            Self::EngineNotInitialized(id) => write!(f, "engine {} has no isolate", id),
            Self::WrongCore { owner, caller } => {
                write!(f, "isolate of core {} touched from core {}", owner, caller)
            }
            Self::SleepOnLiveEngine(id) => {
                write!(f, "non-isolate sleep on engine {} with a live isolate", id)
            }
            Self::NoRunnableThread(id) => write!(f, "engine {} has no runnable thread", id),
            Self::ThreadIdsExhausted => write!(f, "thread id space exhausted"),
            Self::StackAllocation(err) => write!(f, "thread stack allocation failed: {:?}", err),
            Self::OrphanThread(id) => write!(f, "thread {} has no engine", id),
            Self::BootContextResumed(id) => write!(f, "boot context of engine {} resumed", id),
            Self::InvalidConfig(why) => write!(f, "invalid kernel configuration: {}", why),
        }
    }
}

/// Abort the kernel with a diagnostic
#[cold]
#[track_caller]
pub fn fatal(err: ExecError) -> ! {
    log::error!("FATAL: {}", err);
    panic!("{}", err)
}
