//! # x86_64 Implementation
//!
//! CPU control and the context-switch primitive for bare-metal x86_64.

pub mod context;
pub mod cpu;

pub use context::X86_64ContextSwitch;
pub use cpu::X86_64Cpu;
