//! Cross-core arrival queue for new threads.

use crate::sync::IrqMutex;
use crate::thread::ThreadHandle;
use alloc::sync::Arc;
use alloc::vec::{self, Vec};
use core::mem;
use isokern_hal::cpu::Cpu;

/// Lock-protected multi-producer queue of threads waiting to join a
/// rotation. The single consumer is the owning core's drain step, which may
/// run from the timer interrupt; producers therefore hold the lock with
/// interrupts masked.
#[derive(Debug)]
pub struct ThreadInbox {
    pending: IrqMutex<Vec<ThreadHandle>>,
}

impl ThreadInbox {
    /// Create an empty inbox; `cpu` masks interrupts around the lock
    pub fn new(cpu: Arc<dyn Cpu>) -> Self {
        Self {
            pending: IrqMutex::new(cpu, Vec::new()),
        }
    }

    /// Queue a thread
    pub fn push(&self, thread: ThreadHandle) {
        self.pending.lock(|pending| pending.push(thread));
    }

    /// Number of queued threads
    pub fn len(&self) -> usize {
        self.pending.lock(|pending| pending.len())
    }

    /// Is the inbox empty?
    pub fn is_empty(&self) -> bool {
        self.pending.lock(|pending| pending.is_empty())
    }

    /// Take everything queued so far, in arrival order. Threads pushed after
    /// this call wait for the next drain.
    pub fn drain(&self) -> ThreadDrain {
        let batch = self.pending.lock(mem::take);
        ThreadDrain {
            inner: batch.into_iter(),
        }
    }
}

/// Lazy iterator over one drained batch
#[derive(Debug)]
pub struct ThreadDrain {
    inner: vec::IntoIter<ThreadHandle>,
}

impl Iterator for ThreadDrain {
    type Item = ThreadHandle;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ThreadDrain {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::detached_thread;
    use crate::ThreadId;
    use alloc::sync::Weak;
    use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use isokern_hal::cpu::SimulatedCpu;
    use std::sync::OnceLock;

    /// Core that checks the inbox lock is never held across an interrupt
    /// state change
    #[derive(Default)]
    struct WatchingCpu {
        interrupts: AtomicBool,
        masks: AtomicUsize,
        held_while_unmasked: AtomicBool,
        inbox: OnceLock<Weak<ThreadInbox>>,
    }

    impl WatchingCpu {
        fn check(&self) {
            let held = self
                .inbox
                .get()
                .and_then(Weak::upgrade)
                .is_some_and(|inbox| inbox.pending.is_locked());
            if held {
                self.held_while_unmasked.store(true, Ordering::SeqCst);
            }
        }
    }

    impl Cpu for WatchingCpu {
        fn current_cpu_id(&self) -> usize {
            1
        }

        fn cpu_count(&self) -> usize {
            2
        }

        unsafe fn enable_interrupts(&self) {
            self.check();
            self.interrupts.store(true, Ordering::SeqCst);
        }

        unsafe fn disable_interrupts(&self) {
            self.check();
            self.masks.fetch_add(1, Ordering::SeqCst);
            self.interrupts.store(false, Ordering::SeqCst);
        }

        fn interrupts_enabled(&self) -> bool {
            self.interrupts.load(Ordering::SeqCst)
        }

        fn pause(&self) {}

        fn halt(&self) {}
    }

    #[test]
    fn test_push_holds_lock_with_interrupts_masked() {
        let cpu = Arc::new(WatchingCpu::default());
        let inbox = Arc::new(ThreadInbox::new(cpu.clone()));
        cpu.inbox.set(Arc::downgrade(&inbox)).unwrap();
        unsafe { cpu.enable_interrupts() };

        inbox.push(detached_thread(2, 1));
        inbox.push(detached_thread(3, 1));
        assert_eq!(inbox.len(), 2);

        assert!(cpu.masks.load(Ordering::SeqCst) >= 3);
        assert!(!cpu.held_while_unmasked.load(Ordering::SeqCst));
        assert!(cpu.interrupts_enabled());
    }

    #[test]
    fn test_drain_is_a_snapshot() {
        let inbox = ThreadInbox::new(Arc::new(SimulatedCpu::new(2)));
        inbox.push(detached_thread(2, 1));
        inbox.push(detached_thread(3, 1));

        let mut drain = inbox.drain();
        assert!(inbox.is_empty());
        inbox.push(detached_thread(4, 1));

        assert_eq!(drain.len(), 2);
        assert_eq!(drain.next().map(|t| t.id()), Some(ThreadId::new(2)));
        assert_eq!(drain.next().map(|t| t.id()), Some(ThreadId::new(3)));
        assert!(drain.next().is_none());
        assert_eq!(inbox.len(), 1);
    }
}
