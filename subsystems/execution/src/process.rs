//! # Process Management
//!
//! A process groups threads by slot. Its threads may live on different
//! engines.

use crate::thread::ThreadHandle;
use crate::ProcessId;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::RwLock;

/// Shared handle to a process
pub type ProcessHandle = Arc<Process>;

/// Process structure
pub struct Process {
    /// Process ID
    id: ProcessId,
    /// Slot -> thread
    threads: RwLock<BTreeMap<usize, ThreadHandle>>,
}

impl Process {
    /// Create a new process
    pub fn new(id: ProcessId) -> Self {
        Self {
            id,
            threads: RwLock::new(BTreeMap::new()),
        }
    }

    /// Get process ID
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Bind `thread` at `slot`, replacing any previous binding
    pub fn set_thread(&self, thread: ThreadHandle, slot: usize) {
        log::debug!("{}: slot {} -> {} (engine {})", self.id, slot, thread.id(), thread.engine_id());
        self.threads.write().insert(slot, thread);
    }

    /// Thread bound at `slot`
    pub fn thread(&self, slot: usize) -> Option<ThreadHandle> {
        self.threads.read().get(&slot).cloned()
    }

    /// Get thread count
    pub fn thread_count(&self) -> usize {
        self.threads.read().len()
    }

    /// Every binding, in slot order
    pub fn threads(&self) -> Vec<(usize, ThreadHandle)> {
        self.threads
            .read()
            .iter()
            .map(|(&slot, thread)| (slot, Arc::clone(thread)))
            .collect()
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("threads", &self.thread_count())
            .finish()
    }
}

/// Creates and tracks processes
#[derive(Debug)]
pub struct ProcessManager {
    /// Next process ID
    next_id: AtomicU64,
    /// All processes
    processes: RwLock<BTreeMap<ProcessId, ProcessHandle>>,
}

impl ProcessManager {
    /// Create a new manager
    pub const fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            processes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create and register an empty process
    pub fn create_process(&self) -> ProcessHandle {
        let id = ProcessId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let process = Arc::new(Process::new(id));
        self.processes.write().insert(id, Arc::clone(&process));
        log::debug!("created process {}", id);
        process
    }

    /// Get a process
    pub fn get(&self, id: ProcessId) -> Option<ProcessHandle> {
        self.processes.read().get(&id).cloned()
    }

    /// Get process count
    pub fn count(&self) -> usize {
        self.processes.read().len()
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::{Thread, ThreadFlags};
    use crate::ThreadId;
    use alloc::sync::Weak;

    fn thread(id: u64, engine: usize) -> ThreadHandle {
        Arc::new(
            Thread::new(ThreadId::new(id), engine, Weak::new(), ThreadFlags::empty(), 1024).unwrap(),
        )
    }

    #[test]
    fn test_ids_are_unique() {
        let manager = ProcessManager::new();
        let a = manager.create_process();
        let b = manager.create_process();
        assert_ne!(a.id(), b.id());
        assert_eq!(manager.count(), 2);
        assert!(Arc::ptr_eq(&manager.get(a.id()).unwrap(), &a));
        assert!(manager.get(ProcessId::new(99)).is_none());
    }

    #[test]
    fn test_slots_span_engines() {
        let process = Process::new(ProcessId::new(1));
        process.set_thread(thread(2, 1), 0);
        process.set_thread(thread(2, 2), 1);
        assert_eq!(process.thread_count(), 2);
        assert_eq!(process.thread(1).unwrap().engine_id(), 2);

        process.set_thread(thread(3, 1), 0);
        assert_eq!(process.thread_count(), 2);
        assert_eq!(process.thread(0).unwrap().id(), ThreadId::new(3));

        let slots: Vec<_> = process.threads().into_iter().map(|(slot, _)| slot).collect();
        assert_eq!(slots, vec![0, 1]);
    }
}
