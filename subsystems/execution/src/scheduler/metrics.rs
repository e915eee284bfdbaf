//! # Scheduler Metrics
//!
//! Per-engine counters for scheduler activity.

use core::sync::atomic::{AtomicU64, Ordering};

/// Scheduler metrics
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    /// Total context switches
    context_switches: AtomicU64,
    /// Total timer ticks seen by the isolate
    ticks: AtomicU64,
    /// Total timer-driven preemptions
    preemptions: AtomicU64,
    /// Total voluntary yields
    voluntary_yields: AtomicU64,
    /// Total threads absorbed from the arrival queue
    threads_absorbed: AtomicU64,
}

impl SchedulerMetrics {
    /// Create new metrics
    pub const fn new() -> Self {
        Self {
            context_switches: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            preemptions: AtomicU64::new(0),
            voluntary_yields: AtomicU64::new(0),
            threads_absorbed: AtomicU64::new(0),
        }
    }

    /// Record a context switch
    pub fn record_context_switch(&self) {
        self.context_switches.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a timer tick
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a preemption
    pub fn record_preemption(&self) {
        self.preemptions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a voluntary yield
    pub fn record_yield(&self) {
        self.voluntary_yields.fetch_add(1, Ordering::Relaxed);
    }

    /// Record threads taken from the arrival queue
    pub fn record_absorbed(&self, count: usize) {
        self.threads_absorbed.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Get total context switches
    pub fn context_switches(&self) -> u64 {
        self.context_switches.load(Ordering::Relaxed)
    }

    /// Get total ticks
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Get preemptions
    pub fn preemptions(&self) -> u64 {
        self.preemptions.load(Ordering::Relaxed)
    }

    /// Get voluntary yields
    pub fn voluntary_yields(&self) -> u64 {
        self.voluntary_yields.load(Ordering::Relaxed)
    }

    /// Get absorbed threads
    pub fn threads_absorbed(&self) -> u64 {
        self.threads_absorbed.load(Ordering::Relaxed)
    }
}
