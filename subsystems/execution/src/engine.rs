//! # Engine
//!
//! One engine per physical core. Core 0 is the service engine and never hosts
//! an isolate; every other core is an execution engine that gets exactly one
//! isolate once it is initialized.
//!
//! ## State machine
//!
//! ```text
//! UNINITIALIZED --init_isolate--> INITIALIZED   (execution engines only)
//! ```

use crate::config::KernelConfig;
use crate::context::{Preemption, SwitchReason};
use crate::engines::NonIsolateClock;
use crate::isolate::Isolate;
use crate::percore::CoreLocal;
use crate::platform::Platform;
use crate::scheduler::{SchedulerMetrics, ThreadInbox, ThreadManager};
use crate::thread::{Thread, ThreadFlags, ThreadHandle, ThreadState};
use crate::{fatal, ExecError, ExecResult, ThreadId};
use alloc::sync::{Arc, Weak};
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use isokern_hal::context::ExecutionContext;
use isokern_hal::cpu::InterruptGuard;
use isokern_hal::interrupts::InterruptContext;

/// Engine role, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineRole {
    /// Core 0; services only, no isolate
    Service,
    /// Hosts one isolate
    Execution,
}

/// Per-core engine
pub struct Engine {
    id: usize,
    role: EngineRole,
    platform: Platform,
    config: KernelConfig,
    /// Registry-wide pre-isolate tick counter
    clock: Arc<NonIsolateClock>,
    entered: AtomicBool,
    is_init: AtomicBool,
    next_thread_id: AtomicU64,
    /// Threads created for this engine that have not joined the rotation
    arrivals: ThreadInbox,
    isolate: CoreLocal<Option<Isolate>>,
    /// Saved state of the boot stack after `launch`
    boot_context: CoreLocal<ExecutionContext>,
    metrics: SchedulerMetrics,
    this: Weak<Engine>,
}

impl Engine {
    pub(crate) fn new(
        id: usize,
        role: EngineRole,
        platform: Platform,
        config: KernelConfig,
        clock: Arc<NonIsolateClock>,
    ) -> Arc<Self> {
        let arrivals = ThreadInbox::new(platform.cpu.clone());
        Arc::new_cyclic(|this| Self {
            id,
            role,
            platform,
            config,
            clock,
            entered: AtomicBool::new(false),
            is_init: AtomicBool::new(false),
            next_thread_id: AtomicU64::new(ThreadId::FIRST.as_u64()),
            arrivals,
            isolate: CoreLocal::new(id, None),
            boot_context: CoreLocal::new(id, ExecutionContext::new()),
            metrics: SchedulerMetrics::new(),
            this: this.clone(),
        })
    }

    /// Core index
    pub fn id(&self) -> usize {
        self.id
    }

    /// Engine role
    pub fn role(&self) -> EngineRole {
        self.role
    }

    /// Is this an execution engine?
    pub fn is_execution(&self) -> bool {
        self.role == EngineRole::Execution
    }

    /// Has an isolate been attached?
    pub fn is_initialized(&self) -> bool {
        self.is_init.load(Ordering::Acquire)
    }

    /// Has the owning core entered?
    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }

    /// Scheduler counters
    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.metrics
    }

    /// Mark the engine active for its core. Once per core, at boot.
    pub fn enter(&self) -> ExecResult<()> {
        if self.entered.swap(true, Ordering::AcqRel) {
            return Err(ExecError::EngineAlreadyEntered(self.id));
        }
        log::info!("engine {} ({:?}) entered", self.id, self.role);
        Ok(())
    }

    fn alloc_thread_id(&self) -> ExecResult<ThreadId> {
        self.next_thread_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(1))
            .map(ThreadId::new)
            .map_err(|_| ExecError::ThreadIdsExhausted)
    }

    fn spawn(&self, flags: ThreadFlags) -> ExecResult<ThreadHandle> {
        if !self.is_execution() {
            return Err(ExecError::NotExecutionEngine(self.id));
        }

        let id = self.alloc_thread_id()?;
        let thread = Arc::new(Thread::new(
            id,
            self.id,
            self.this.clone(),
            flags,
            self.config.stack_size,
        )?);
        ThreadManager::thread_init(&*self.platform.switch, &thread)?;
        self.arrivals.push(Arc::clone(&thread));

        log::debug!("engine {}: created {} ({:?})", self.id, id, flags);
        Ok(thread)
    }

    /// Create a thread on this engine.
    ///
    /// The thread gets an id, a stack and a saved state entering the shared
    /// trampoline. It joins the rotation at the engine's next preemption.
    pub fn try_create_thread(&self) -> ExecResult<ThreadHandle> {
        self.spawn(ThreadFlags::empty())
    }

    /// [`try_create_thread`](Self::try_create_thread), aborting on failure
    pub fn create_thread(&self) -> ThreadHandle {
        self.try_create_thread().unwrap_or_else(|err| fatal(err))
    }

    pub(crate) fn create_idle_thread(&self) -> ExecResult<ThreadHandle> {
        self.spawn(ThreadFlags::IDLE)
    }

    /// Threads created but not yet in the rotation
    pub fn pending_threads(&self) -> usize {
        self.arrivals.len()
    }

    fn check_core(&self) -> ExecResult<()> {
        let caller = self.platform.cpu.current_cpu_id();
        if caller != self.isolate.owner() {
            return Err(ExecError::WrongCore { owner: self.id, caller });
        }
        Ok(())
    }

    /// Attach this engine's isolate. Runs once, on the owning core.
    ///
    /// Threads created so far (at least the idle thread) join the rotation
    /// immediately; the first of them becomes current.
    pub fn try_init_isolate(&self) -> ExecResult<()> {
        if !self.is_execution() {
            return Err(ExecError::NotExecutionEngine(self.id));
        }
        self.check_core()?;
        if self.is_initialized() {
            return Err(ExecError::EngineAlreadyInitialized(self.id));
        }

        let _guard = InterruptGuard::new(&*self.platform.cpu);
        let mut isolate = Isolate::new(self.id, self.config.thread_capacity);
        let absorbed = isolate.process_new_threads(&self.arrivals);
        if isolate.current_thread().is_none() {
            return Err(ExecError::NoRunnableThread(self.id));
        }

        // SAFETY: owning core, interrupts masked, not yet visible to ticks.
        unsafe { self.isolate.with(|slot| *slot = Some(isolate)) };
        self.is_init.store(true, Ordering::Release);
        self.metrics.record_absorbed(absorbed);

        log::info!("engine {}: isolate attached ({} threads)", self.id, absorbed);
        Ok(())
    }

    /// [`try_init_isolate`](Self::try_init_isolate), aborting on failure
    pub fn init_isolate(&self) {
        if let Err(err) = self.try_init_isolate() {
            fatal(err);
        }
    }

    /// Run `f` on the isolate, on the owning core, with interrupts masked.
    /// `f` must not re-enter the isolate.
    pub(crate) fn with_isolate<R>(&self, f: impl FnOnce(&mut Isolate) -> R) -> ExecResult<R> {
        if !self.is_initialized() {
            return Err(ExecError::EngineNotInitialized(self.id));
        }
        self.check_core()?;

        let _guard = InterruptGuard::new(&*self.platform.cpu);
        // SAFETY: owning core, interrupts masked, and no caller re-enters
        // the isolate from `f`.
        unsafe { self.isolate.with(|slot| slot.as_mut().map(f)) }
            .ok_or(ExecError::EngineNotInitialized(self.id))
    }

    /// Thread that owns the core
    pub fn current_thread(&self) -> ExecResult<ThreadHandle> {
        self.with_isolate(|isolate| isolate.current_thread().cloned())?
            .ok_or(ExecError::NoRunnableThread(self.id))
    }

    /// Give up the core: select the next thread, absorb arrivals, and switch
    /// unless the selected thread is already current.
    ///
    /// Returns once the calling thread is scheduled again.
    pub fn preempt(&self, reason: SwitchReason) -> ExecResult<()> {
        let _guard = InterruptGuard::new(&*self.platform.cpu);
        let (step, absorbed) = self.with_isolate(|isolate| isolate.preempt_step(&self.arrivals))??;

        match reason {
            SwitchReason::Yield => self.metrics.record_yield(),
            SwitchReason::Preemption => self.metrics.record_preemption(),
        }
        if absorbed > 0 {
            self.metrics.record_absorbed(absorbed);
        }

        match step {
            Preemption::Stay => {
                log::trace!("engine {}: {:?}, no switch", self.id, reason);
            }
            Preemption::Switch(transfer) => {
                log::trace!(
                    "engine {}: {:?}, {} -> {}",
                    self.id,
                    reason,
                    transfer.from_id,
                    transfer.to_id
                );
                self.metrics.record_context_switch();
                // SAFETY: both blocks belong to threads held by the rotation,
                // `to` was primed at creation, and interrupts are masked.
                unsafe { self.platform.switch.switch_context(transfer.from, transfer.to) };
            }
        }
        Ok(())
    }

    /// Periodic timer interrupt for this core.
    ///
    /// With an isolate attached this is a preemption point; before that it
    /// only advances the registry's pre-isolate tick counter.
    pub fn timer_tick(&self, frame: &dyn InterruptContext) -> ExecResult<()> {
        if self.is_initialized() {
            self.metrics.record_tick();
            log::trace!("engine {}: tick at {:#x}", self.id, frame.instruction_pointer());
            self.preempt(SwitchReason::Preemption)
        } else {
            self.clock.tick();
            Ok(())
        }
    }

    /// One pass of the current thread's run loop: first-run initialization,
    /// one work unit, then a voluntary yield.
    pub fn run_slice(&self) -> ExecResult<()> {
        let cpu = &*self.platform.cpu;
        let runtime = &*self.platform.runtime;
        let thread = self.current_thread()?;

        if thread.state() == ThreadState::Created {
            // SAFETY: the thread owns the core and its saved state is live.
            unsafe { cpu.enable_interrupts() };
            runtime.attach_thread(&thread);
            thread.set_state(ThreadState::Running);
            log::debug!("engine {}: {} started", self.id, thread.id());
        }

        // SAFETY: as above.
        unsafe { cpu.enable_interrupts() };
        let handled = thread.run(runtime);
        if handled == 0 && thread.is_idle() {
            cpu.halt();
        }
        drop(thread);

        self.preempt(SwitchReason::Yield)
    }

    /// Leave the boot stack for the current thread. Never returns.
    pub fn launch(&self) -> ! {
        let err = match self.current_thread() {
            Ok(thread) => {
                let _guard = InterruptGuard::new(&*self.platform.cpu);
                log::info!("engine {}: launching {}", self.id, thread.id());
                // SAFETY: the boot context is only saved into, on this core;
                // the thread was primed at creation and interrupts are masked.
                unsafe {
                    self.platform
                        .switch
                        .switch_context(self.boot_context.as_ptr(), thread.context_ptr());
                }
                ExecError::BootContextResumed(self.id)
            }
            Err(err) => err,
        };
        fatal(err)
    }

    #[cfg(test)]
    pub(crate) fn set_next_thread_id(&self, raw: u64) {
        self.next_thread_id.store(raw, Ordering::SeqCst);
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("is_init", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
