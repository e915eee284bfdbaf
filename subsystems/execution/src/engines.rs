//! # Engine Registry
//!
//! Root object of the execution subsystem. Owns one [`Engine`] per core, the
//! process manager and the pre-isolate tick counter, and runs the boot
//! sequence.

use crate::boot::BootImage;
use crate::config::KernelConfig;
use crate::engine::{Engine, EngineRole};
use crate::platform::Platform;
use crate::process::{ProcessHandle, ProcessManager};
use crate::runtime::SYSTEM_BUFFER_ALLOCATOR;
use crate::thread::{MessageType, ThreadMessage, TransportData};
use crate::{fatal, ExecError, ExecResult};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use isokern_hal::interrupts::InterruptContext;

/// Tick counter used before any isolate exists.
///
/// Incremented from interrupt context; a single atomic, never a lock.
#[derive(Debug, Default)]
pub struct NonIsolateClock {
    ticks: AtomicU64,
}

impl NonIsolateClock {
    /// Counter at zero
    pub const fn new() -> Self {
        Self { ticks: AtomicU64::new(0) }
    }

    /// Advance by one tick; returns the new value
    pub fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Current value
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }
}

/// Engine registry
pub struct Engines {
    engines: Vec<Arc<Engine>>,
    execution: Vec<Arc<Engine>>,
    clock: Arc<NonIsolateClock>,
    process_manager: ProcessManager,
    platform: Platform,
    config: KernelConfig,
}

impl Engines {
    /// Build one engine per core and one idle thread per execution engine,
    /// and initialize the script runtime.
    pub fn try_new(platform: Platform, config: KernelConfig) -> ExecResult<Self> {
        config.validate()?;

        let cpu_count = platform.cpu.cpu_count();
        if cpu_count < 2 {
            return Err(ExecError::InsufficientCores(cpu_count));
        }

        platform
            .runtime
            .initialize(config.script_flags, &SYSTEM_BUFFER_ALLOCATOR);

        let clock = Arc::new(NonIsolateClock::new());
        let engines: Vec<_> = (0..cpu_count)
            .map(|id| {
                let role = if id == 0 { EngineRole::Service } else { EngineRole::Execution };
                Engine::new(id, role, platform.clone(), config, Arc::clone(&clock))
            })
            .collect();
        let execution = engines[1..].to_vec();

        for engine in &execution {
            engine.create_idle_thread()?;
        }

        log::info!(
            "engines: {} cores, {} execution engines, {}ms ticks",
            cpu_count,
            execution.len(),
            config.ms_per_tick
        );

        Ok(Self {
            engines,
            execution,
            clock,
            process_manager: ProcessManager::new(),
            platform,
            config,
        })
    }

    /// [`try_new`](Self::try_new), aborting on failure
    pub fn new(platform: Platform, config: KernelConfig) -> Self {
        Self::try_new(platform, config).unwrap_or_else(|err| fatal(err))
    }

    /// Create the first process and queue the startup program on it.
    ///
    /// Enqueueing is not execution: the program runs once the first
    /// execution engine schedules the thread.
    pub fn try_startup(&self, image: &dyn BootImage) -> ExecResult<ProcessHandle> {
        let path = self.config.startup_path;
        let source = image.get(path).ok_or(ExecError::MissingStartupProgram(path))?;

        let process = self.process_manager.create_process();
        let thread = self.try_execution_engine(0)?.try_create_thread()?;
        process.set_thread(Arc::clone(&thread), 0);

        let data = TransportData::from_bytes(source);
        thread.push_message(ThreadMessage::new(MessageType::Evaluate, None, data));

        log::info!(
            "startup: {} queued on {} ({} bytes of {})",
            process.id(),
            thread.id(),
            source.len(),
            path
        );
        Ok(process)
    }

    /// [`try_startup`](Self::try_startup), aborting on failure
    pub fn startup(&self, image: &dyn BootImage) -> ProcessHandle {
        self.try_startup(image).unwrap_or_else(|err| fatal(err))
    }

    /// Number of engines (cores)
    pub fn engines_count(&self) -> usize {
        self.engines.len()
    }

    /// Number of execution engines
    pub fn execution_engines_count(&self) -> usize {
        self.execution.len()
    }

    /// Engine of core `index`
    pub fn try_engine(&self, index: usize) -> ExecResult<&Arc<Engine>> {
        self.engines.get(index).ok_or(ExecError::EngineOutOfRange {
            index,
            count: self.engines.len(),
        })
    }

    /// [`try_engine`](Self::try_engine), aborting on failure
    pub fn engine(&self, index: usize) -> &Arc<Engine> {
        self.try_engine(index).unwrap_or_else(|err| fatal(err))
    }

    /// `index`-th execution engine
    pub fn try_execution_engine(&self, index: usize) -> ExecResult<&Arc<Engine>> {
        self.execution.get(index).ok_or(ExecError::EngineOutOfRange {
            index,
            count: self.execution.len(),
        })
    }

    /// [`try_execution_engine`](Self::try_execution_engine), aborting on failure
    pub fn execution_engine(&self, index: usize) -> &Arc<Engine> {
        self.try_execution_engine(index).unwrap_or_else(|err| fatal(err))
    }

    /// Is core `index` an execution engine?
    pub fn is_execution_engine(&self, index: usize) -> bool {
        self.engines.get(index).is_some_and(|e| e.is_execution())
    }

    /// Index of the calling core
    pub fn cpu_id(&self) -> usize {
        self.platform.cpu.current_cpu_id()
    }

    /// Engine of the calling core
    pub fn try_cpu_engine(&self) -> ExecResult<&Arc<Engine>> {
        self.try_engine(self.cpu_id())
    }

    /// [`try_cpu_engine`](Self::try_cpu_engine), aborting on failure
    pub fn cpu_engine(&self) -> &Arc<Engine> {
        self.engine(self.cpu_id())
    }

    /// Mark the calling core's engine as entered
    pub fn cpu_enter(&self) -> ExecResult<()> {
        self.try_cpu_engine()?.enter()
    }

    /// Timer period
    pub fn ms_per_tick(&self) -> u32 {
        self.config.ms_per_tick
    }

    /// Registry configuration
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// The process manager
    pub fn process_manager(&self) -> &ProcessManager {
        &self.process_manager
    }

    /// Route a timer interrupt to the calling core's engine
    pub fn timer_tick(&self, frame: &dyn InterruptContext) {
        if let Err(err) = self.cpu_engine().timer_tick(frame) {
            fatal(err);
        }
    }

    /// Advance the pre-isolate tick counter
    pub fn non_isolate_tick(&self) {
        self.clock.tick();
    }

    /// Current pre-isolate tick count
    pub fn non_isolate_ticks(&self) -> u64 {
        self.clock.ticks()
    }

    /// Busy-wait for `ms` milliseconds on the pre-isolate tick counter.
    ///
    /// Waits until the counter passes `now + ceil(ms / period)`. Refused on a
    /// core whose execution engine already has an isolate.
    pub fn try_non_isolate_sleep(&self, ms: u32) -> ExecResult<()> {
        if ms == 0 {
            return Ok(());
        }

        let engine = self.try_cpu_engine()?;
        if engine.is_execution() && engine.is_initialized() {
            return Err(ExecError::SleepOnLiveEngine(engine.id()));
        }

        let target = self.clock.ticks() + self.config.sleep_ticks(ms);
        while self.clock.ticks() <= target {
            self.platform.cpu.pause();
        }
        Ok(())
    }

    /// [`try_non_isolate_sleep`](Self::try_non_isolate_sleep), aborting on failure
    pub fn non_isolate_sleep(&self, ms: u32) {
        if let Err(err) = self.try_non_isolate_sleep(ms) {
            fatal(err);
        }
    }

    /// Per-core boot path. The service core idles; execution cores attach
    /// their isolate and hand the core to the scheduler.
    pub fn cpu_main(&self) -> ! {
        let cpu = &*self.platform.cpu;
        let engine = self.cpu_engine();
        if let Err(err) = engine.enter() {
            fatal(err);
        }

        match engine.role() {
            EngineRole::Service => {
                // SAFETY: the boot path of this core is complete.
                unsafe { cpu.enable_interrupts() };
                loop {
                    cpu.halt();
                }
            }
            EngineRole::Execution => {
                engine.init_isolate();
                engine.launch()
            }
        }
    }
}

impl fmt::Debug for Engines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engines")
            .field("engines", &self.engines)
            .field("non_isolate_ticks", &self.non_isolate_ticks())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::MemoryBootImage;
    use crate::testing::{harness, RecordingRuntime};
    use isokern_hal::context::SoftContextSwitch;
    use isokern_hal::cpu::{Cpu, SimulatedCpu};
    use isokern_hal::interrupts::IrqFrame;
    use std::sync::OnceLock;

    const STARTUP: &[u8] = b"runtime.boot();";

    fn image() -> MemoryBootImage {
        MemoryBootImage::new().with_file(KernelConfig::DEFAULT_STARTUP_PATH, STARTUP)
    }

    #[test]
    fn test_roles_by_core() {
        for cpus in 2..=8 {
            let h = harness(cpus);
            let engines = Engines::new(h.platform.clone(), KernelConfig::new());

            assert_eq!(engines.engines_count(), cpus);
            assert_eq!(engines.execution_engines_count(), cpus - 1);
            assert_eq!(engines.engine(0).role(), EngineRole::Service);
            assert!(!engines.is_execution_engine(0));
            for i in 1..cpus {
                assert_eq!(engines.engine(i).role(), EngineRole::Execution);
                assert_eq!(engines.execution_engine(i - 1).id(), i);
            }
            assert!(!engines.is_execution_engine(cpus));
        }
    }

    #[test]
    fn test_one_idle_thread_per_execution_engine() {
        let h = harness(4);
        let engines = Engines::new(h.platform.clone(), KernelConfig::new());

        assert_eq!(engines.engine(0).pending_threads(), 0);
        for i in 1..4 {
            let engine = engines.engine(i);
            assert_eq!(engine.pending_threads(), 1);

            h.cpu.switch_to(i).unwrap();
            engine.init_isolate();
            let idle = engine.current_thread().unwrap();
            assert!(idle.is_idle());
            assert_eq!(idle.id().as_u64(), 2);
        }
        assert_eq!(
            h.runtime.flags().as_deref(),
            Some(KernelConfig::DEFAULT_SCRIPT_FLAGS)
        );
    }

    #[test]
    fn test_single_core_refused() {
        let h = harness(1);
        let err = Engines::try_new(h.platform.clone(), KernelConfig::new()).unwrap_err();
        assert_eq!(err, ExecError::InsufficientCores(1));
        assert!(h.runtime.flags().is_none());
    }

    #[test]
    #[should_panic(expected = "at least 2 cores required")]
    fn test_single_core_is_fatal() {
        let h = harness(1);
        Engines::new(h.platform.clone(), KernelConfig::new());
    }

    #[test]
    fn test_engine_index_out_of_range() {
        let h = harness(2);
        let engines = Engines::new(h.platform.clone(), KernelConfig::new());
        assert_eq!(
            engines.try_engine(2).unwrap_err(),
            ExecError::EngineOutOfRange { index: 2, count: 2 }
        );
        assert_eq!(
            engines.try_execution_engine(1).unwrap_err(),
            ExecError::EngineOutOfRange { index: 1, count: 1 }
        );
    }

    #[test]
    fn test_startup_queues_program() {
        let h = harness(3);
        let engines = Engines::new(h.platform.clone(), KernelConfig::new());
        let process = engines.startup(&image());

        assert_eq!(engines.process_manager().count(), 1);
        assert_eq!(process.thread_count(), 1);

        let thread = process.thread(0).unwrap();
        assert_eq!(thread.engine_id(), 1);
        assert!(!thread.is_idle());
        assert_eq!(thread.pending_messages(), 1);

        let msg = thread.take_message().unwrap();
        assert_eq!(msg.kind(), MessageType::Evaluate);
        assert!(msg.sender().is_none());
        assert_eq!(msg.data().as_bytes(), STARTUP);

        // Queued, not executed
        assert!(h.runtime.evaluated().is_empty());
    }

    #[test]
    fn test_startup_runs_on_first_execution_engine() {
        let h = harness(2);
        let engines = Engines::new(h.platform.clone(), KernelConfig::new());
        let process = engines.startup(&image());
        let thread = process.thread(0).unwrap();

        h.cpu.switch_to(1).unwrap();
        let engine = engines.execution_engine(0);
        engine.init_isolate();
        while engine.current_thread().unwrap().id() != thread.id() {
            engine.run_slice().unwrap();
        }
        engine.run_slice().unwrap();

        assert_eq!(h.runtime.evaluated(), vec![(thread.id(), STARTUP.to_vec())]);
    }

    #[test]
    fn test_startup_without_program() {
        let h = harness(2);
        let engines = Engines::new(h.platform.clone(), KernelConfig::new());

        for image in [
            MemoryBootImage::new(),
            MemoryBootImage::new().with_file(KernelConfig::DEFAULT_STARTUP_PATH, b""),
        ] {
            assert_eq!(
                engines.try_startup(&image).unwrap_err(),
                ExecError::MissingStartupProgram(KernelConfig::DEFAULT_STARTUP_PATH)
            );
        }
        assert_eq!(engines.process_manager().count(), 0);
        assert_eq!(engines.engine(1).pending_threads(), 1);
        assert!(h.runtime.evaluated().is_empty());
    }

    #[test]
    #[should_panic(expected = "Unable to load /system/startup.js from initrd.")]
    fn test_startup_without_program_is_fatal() {
        let h = harness(2);
        let engines = Engines::new(h.platform.clone(), KernelConfig::new());
        engines.startup(&MemoryBootImage::new());
    }

    #[test]
    fn test_timer_routing_before_isolates() {
        let h = harness(3);
        let engines = Engines::new(h.platform.clone(), KernelConfig::new());
        let frame = IrqFrame::timer(0, 0);

        for core in 0..3 {
            h.cpu.switch_to(core).unwrap();
            engines.timer_tick(&frame);
        }
        engines.non_isolate_tick();
        assert_eq!(engines.non_isolate_ticks(), 4);
    }

    #[test]
    fn test_sleep_zero_returns_immediately() {
        let h = harness(2);
        let engines = Engines::new(h.platform.clone(), KernelConfig::new());
        h.cpu.switch_to(1).unwrap();
        engines.execution_engine(0).init_isolate();

        // Allowed even on a live engine: nothing is waited for
        assert_eq!(engines.try_non_isolate_sleep(0), Ok(()));
        assert_eq!(engines.non_isolate_ticks(), 0);
    }

    #[test]
    fn test_sleep_on_live_engine_refused() {
        let h = harness(2);
        let engines = Engines::new(h.platform.clone(), KernelConfig::new());
        h.cpu.switch_to(1).unwrap();
        engines.execution_engine(0).init_isolate();

        assert_eq!(engines.try_non_isolate_sleep(5), Err(ExecError::SleepOnLiveEngine(1)));
    }

    /// Core whose every pause lets exactly one timer tick through
    struct TickingCpu {
        inner: SimulatedCpu,
        clock: OnceLock<Arc<NonIsolateClock>>,
        pauses: AtomicU64,
    }

    impl Cpu for TickingCpu {
        fn current_cpu_id(&self) -> usize {
            self.inner.current_cpu_id()
        }

        fn cpu_count(&self) -> usize {
            self.inner.cpu_count()
        }

        unsafe fn enable_interrupts(&self) {
            unsafe { self.inner.enable_interrupts() }
        }

        unsafe fn disable_interrupts(&self) {
            unsafe { self.inner.disable_interrupts() }
        }

        fn interrupts_enabled(&self) -> bool {
            self.inner.interrupts_enabled()
        }

        fn pause(&self) {
            self.pauses.fetch_add(1, Ordering::SeqCst);
            if let Some(clock) = self.clock.get() {
                clock.tick();
            }
        }

        fn halt(&self) {}
    }

    fn ticking_engines() -> (Engines, Arc<TickingCpu>) {
        let cpu = Arc::new(TickingCpu {
            inner: SimulatedCpu::new(2),
            clock: OnceLock::new(),
            pauses: AtomicU64::new(0),
        });
        let platform = Platform::new(
            cpu.clone(),
            Arc::new(SoftContextSwitch::new()),
            Arc::new(RecordingRuntime::default()),
        );
        let engines = Engines::new(platform, KernelConfig::new());
        assert!(cpu.clock.set(Arc::clone(&engines.clock)).is_ok());
        (engines, cpu)
    }

    #[test]
    fn test_sleep_wakes_one_tick_past_target() {
        let (engines, cpu) = ticking_engines();
        engines.non_isolate_tick();

        let start = engines.non_isolate_ticks();
        engines.non_isolate_sleep(25);
        let elapsed = engines.non_isolate_ticks() - start;

        // 25 ms at 10 ms per tick is 3 ticks; the wait ends on the 4th
        assert_eq!(elapsed, 4);
        assert_eq!(cpu.pauses.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_sleep_bounds_across_durations() {
        let (engines, _cpu) = ticking_engines();
        for ms in [1, 10, 11, 25, 30, 100] {
            let wanted = engines.config().sleep_ticks(ms);
            let start = engines.non_isolate_ticks();
            engines.non_isolate_sleep(ms);
            let elapsed = engines.non_isolate_ticks() - start;
            assert!(elapsed > wanted, "{} ms woke early after {} ticks", ms, elapsed);
            assert!(elapsed <= wanted + 1, "{} ms overslept by {} ticks", ms, elapsed - wanted);
        }
    }

    #[test]
    fn test_cpu_enter() {
        let h = harness(2);
        let engines = Engines::new(h.platform.clone(), KernelConfig::new());
        h.cpu.switch_to(1).unwrap();
        assert_eq!(engines.cpu_enter(), Ok(()));
        assert!(engines.engine(1).is_entered());
        assert!(!engines.engine(0).is_entered());
        assert_eq!(engines.cpu_enter(), Err(ExecError::EngineAlreadyEntered(1)));
    }
}
