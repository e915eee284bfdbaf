//! # Kernel Configuration

use crate::{ExecError, ExecResult};

/// Registry-wide configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Timer period in milliseconds
    pub ms_per_tick: u32,
    /// Stack size of every thread, in bytes
    pub stack_size: usize,
    /// Initial capacity of a thread manager's set
    pub thread_capacity: usize,
    /// Boot image path of the startup program
    pub startup_path: &'static str,
    /// Flags handed to the script runtime at initialization
    pub script_flags: &'static str,
}

impl KernelConfig {
    /// Default timer period: 10ms
    pub const DEFAULT_MS_PER_TICK: u32 = 10;
    /// Default thread stack: 64 KiB
    pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;
    /// Default thread set reservation
    pub const DEFAULT_THREAD_CAPACITY: usize = 100;
    /// Default startup program
    pub const DEFAULT_STARTUP_PATH: &'static str = "/system/startup.js";
    /// Default runtime flags
    pub const DEFAULT_SCRIPT_FLAGS: &'static str = "--harmony_promises --harmony_collections";

    /// Create default configuration
    pub const fn new() -> Self {
        Self {
            ms_per_tick: Self::DEFAULT_MS_PER_TICK,
            stack_size: Self::DEFAULT_STACK_SIZE,
            thread_capacity: Self::DEFAULT_THREAD_CAPACITY,
            startup_path: Self::DEFAULT_STARTUP_PATH,
            script_flags: Self::DEFAULT_SCRIPT_FLAGS,
        }
    }

    /// Override the timer period
    pub const fn with_ms_per_tick(mut self, ms: u32) -> Self {
        self.ms_per_tick = ms;
        self
    }

    /// Override the thread stack size
    pub const fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    /// Override the startup program path
    pub const fn with_startup_path(mut self, path: &'static str) -> Self {
        self.startup_path = path;
        self
    }

    /// Check the configuration before any engine is built
    pub fn validate(&self) -> ExecResult<()> {
        if self.ms_per_tick == 0 {
            return Err(ExecError::InvalidConfig("timer period must be non-zero"));
        }
        if self.stack_size == 0 || self.stack_size % 16 != 0 {
            return Err(ExecError::InvalidConfig("stack size must be a non-zero multiple of 16"));
        }
        Ok(())
    }

    /// Ticks covering `ms` milliseconds, rounded up, at least one
    pub fn sleep_ticks(&self, ms: u32) -> u64 {
        u64::from(ms).div_ceil(u64::from(self.ms_per_tick)).max(1)
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}
