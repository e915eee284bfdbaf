//! # Interrupt Frames
//!
//! What a timer handler gets to see about the interrupted code.

/// Interrupt vector number
pub type InterruptVector = u8;

/// Interrupt context trait
///
/// Provides access to the processor state at the time of the interrupt.
pub trait InterruptContext: Send {
    /// Get the interrupt vector number
    fn vector(&self) -> InterruptVector;

    /// Get the instruction pointer at the time of the interrupt
    fn instruction_pointer(&self) -> u64;

    /// Get the stack pointer at the time of the interrupt
    fn stack_pointer(&self) -> u64;

    /// Check if the interrupt occurred in user mode
    fn from_user_mode(&self) -> bool {
        false
    }
}

/// Plain interrupt frame, filled in by the low-level handler stub
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct IrqFrame {
    /// Vector that fired
    pub vector: InterruptVector,
    /// Interrupted instruction pointer
    pub rip: u64,
    /// Interrupted stack pointer
    pub rsp: u64,
}

impl IrqFrame {
    /// Frame for the periodic timer vector
    pub const fn timer(rip: u64, rsp: u64) -> Self {
        Self { vector: TIMER_VECTOR, rip, rsp }
    }
}

impl InterruptContext for IrqFrame {
    fn vector(&self) -> InterruptVector {
        self.vector
    }

    fn instruction_pointer(&self) -> u64 {
        self.rip
    }

    fn stack_pointer(&self) -> u64 {
        self.rsp
    }
}

/// Vector the local timer is programmed to fire on
pub const TIMER_VECTOR: InterruptVector = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_frame() {
        let frame = IrqFrame::timer(0x1000, 0x2000);
        let ctx: &dyn InterruptContext = &frame;
        assert_eq!(ctx.vector(), TIMER_VECTOR);
        assert_eq!(ctx.instruction_pointer(), 0x1000);
        assert_eq!(ctx.stack_pointer(), 0x2000);
        assert!(!ctx.from_user_mode());
    }
}
