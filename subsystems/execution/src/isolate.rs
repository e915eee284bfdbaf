//! # Isolate
//!
//! The single script context of an execution core. It owns the core's thread
//! manager and is the rendezvous point of every yield.

use crate::context::{Preemption, Transfer};
use crate::scheduler::{ThreadInbox, ThreadManager};
use crate::thread::{ThreadHandle, ThreadState};
use crate::{ExecError, ExecResult};
use alloc::sync::Arc;

/// Script context bound to one execution engine
#[derive(Debug)]
pub struct Isolate {
    engine_id: usize,
    threads: ThreadManager,
}

impl Isolate {
    /// Create an isolate for `engine_id` with an empty rotation
    pub fn new(engine_id: usize, capacity: usize) -> Self {
        Self {
            engine_id,
            threads: ThreadManager::with_capacity(capacity),
        }
    }

    /// Engine this isolate is bound to
    pub fn engine_id(&self) -> usize {
        self.engine_id
    }

    /// The isolate's thread manager
    pub fn thread_manager(&self) -> &ThreadManager {
        &self.threads
    }

    /// Thread that owns the core
    pub fn current_thread(&self) -> Option<&ThreadHandle> {
        self.threads.current_thread()
    }

    /// Move every thread that arrived since the last drain into the rotation.
    pub fn process_new_threads(&mut self, inbox: &ThreadInbox) -> usize {
        let mut absorbed = 0;
        for thread in inbox.drain() {
            log::debug!("engine {}: {} joins the rotation", self.engine_id, thread.id());
            self.threads.adopt(thread);
            absorbed += 1;
        }
        absorbed
    }

    /// Selection half of a preemption.
    ///
    /// The next thread is chosen from the set as it stood before this call;
    /// arrivals are drained only afterwards, so they first compete in the
    /// following rotation step. Returns the decision and the number of
    /// absorbed threads.
    pub(crate) fn preempt_step(&mut self, inbox: &ThreadInbox) -> ExecResult<(Preemption, usize)> {
        let no_thread = ExecError::NoRunnableThread(self.engine_id);
        let current = self.threads.current_thread().cloned().ok_or(no_thread)?;
        let next = self.threads.switch_to_next_thread().ok_or(no_thread)?;
        let absorbed = self.process_new_threads(inbox);

        if Arc::ptr_eq(&current, &next) {
            return Ok((Preemption::Stay, absorbed));
        }

        if current.state() == ThreadState::Running {
            current.set_state(ThreadState::Yielded);
        }
        if next.state() == ThreadState::Yielded {
            next.set_state(ThreadState::Running);
        }

        let transfer = Transfer {
            from_id: current.id(),
            to_id: next.id(),
            from: current.context_ptr(),
            to: next.context_ptr().cast_const(),
        };
        Ok((Preemption::Switch(transfer), absorbed))
    }
}
