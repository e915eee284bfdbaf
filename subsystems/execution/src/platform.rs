//! Hardware and runtime collaborators shared by every engine.

use crate::runtime::ScriptRuntime;
use alloc::sync::Arc;
use core::fmt;
use isokern_hal::context::ContextSwitch;
use isokern_hal::cpu::Cpu;

/// Handles passed from the registry to each engine
#[derive(Clone)]
pub struct Platform {
    /// Core control
    pub cpu: Arc<dyn Cpu>,
    /// Context-switch primitive
    pub switch: Arc<dyn ContextSwitch>,
    /// Script-execution engine
    pub runtime: Arc<dyn ScriptRuntime>,
}

impl Platform {
    /// Bundle the collaborators
    pub fn new(
        cpu: Arc<dyn Cpu>,
        switch: Arc<dyn ContextSwitch>,
        runtime: Arc<dyn ScriptRuntime>,
    ) -> Self {
        Self { cpu, switch, runtime }
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("cpus", &self.cpu.cpu_count())
            .finish_non_exhaustive()
    }
}
