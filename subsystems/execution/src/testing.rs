//! Host test fixtures.

use crate::platform::Platform;
use crate::runtime::{BufferAllocator, ScriptRuntime};
use crate::thread::{Thread, ThreadFlags, ThreadHandle};
use crate::ThreadId;
use alloc::string::{String, ToString};
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use isokern_hal::context::SoftContextSwitch;
use isokern_hal::cpu::SimulatedCpu;

/// Runtime that records what the kernel asks of it
#[derive(Debug, Default)]
pub(crate) struct RecordingRuntime {
    flags: spin::Mutex<Option<String>>,
    attached: spin::Mutex<Vec<ThreadId>>,
    evaluated: spin::Mutex<Vec<(ThreadId, Vec<u8>)>>,
}

impl RecordingRuntime {
    pub(crate) fn flags(&self) -> Option<String> {
        self.flags.lock().clone()
    }

    pub(crate) fn attached(&self) -> Vec<ThreadId> {
        self.attached.lock().clone()
    }

    pub(crate) fn evaluated(&self) -> Vec<(ThreadId, Vec<u8>)> {
        self.evaluated.lock().clone()
    }
}

impl ScriptRuntime for RecordingRuntime {
    fn initialize(&self, flags: &str, allocator: &'static dyn BufferAllocator) {
        let block = allocator.allocate(32);
        assert!(!block.is_null());
        unsafe { allocator.free(block, 32) };
        *self.flags.lock() = Some(flags.to_string());
    }

    fn attach_thread(&self, thread: &Thread) {
        self.attached.lock().push(thread.id());
    }

    fn evaluate(&self, thread: &Thread, source: &[u8], _reply_to: Option<&ThreadHandle>) {
        self.evaluated.lock().push((thread.id(), source.to_vec()));
    }
}

/// Simulated machine plus the concrete handles behind its platform
pub(crate) struct Harness {
    pub(crate) platform: Platform,
    pub(crate) cpu: Arc<SimulatedCpu>,
    pub(crate) switch: Arc<SoftContextSwitch>,
    pub(crate) runtime: Arc<RecordingRuntime>,
}

pub(crate) fn harness(cpus: usize) -> Harness {
    let cpu = Arc::new(SimulatedCpu::new(cpus));
    let switch = Arc::new(SoftContextSwitch::new());
    let runtime = Arc::new(RecordingRuntime::default());
    let platform = Platform::new(cpu.clone(), switch.clone(), runtime.clone());
    Harness {
        platform,
        cpu,
        switch,
        runtime,
    }
}

/// Thread with no owning engine
pub(crate) fn detached_thread(id: u64, engine_id: usize) -> ThreadHandle {
    let thread = Thread::new(ThreadId::new(id), engine_id, Weak::new(), ThreadFlags::empty(), 1024);
    Arc::new(thread.unwrap())
}
