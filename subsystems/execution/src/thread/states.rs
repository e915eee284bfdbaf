//! # Thread States
//!
//! Thread state machine definition.

/// Thread state (unit-only for atomic storage)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum ThreadState {
    /// Created, never ran
    #[default]
    Created = 0,
    /// Currently owns its core
    Running = 1,
    /// Left the core through a preemption
    Yielded = 2,
}

impl ThreadState {
    /// Convert from u32
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Created),
            1 => Some(Self::Running),
            2 => Some(Self::Yielded),
            _ => None,
        }
    }

    /// Convert to u32
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Valid transitions from this state
    pub fn valid_transitions(&self) -> &[ThreadState] {
        match self {
            ThreadState::Created => &[ThreadState::Running],
            ThreadState::Running => &[ThreadState::Yielded],
            ThreadState::Yielded => &[ThreadState::Running],
        }
    }

    /// Check a transition against the state machine
    pub fn can_transition_to(&self, next: ThreadState) -> bool {
        self.valid_transitions().contains(&next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_raw() {
        for state in [ThreadState::Created, ThreadState::Running, ThreadState::Yielded] {
            assert_eq!(ThreadState::from_u32(state.as_u32()), Some(state));
        }
        assert_eq!(ThreadState::from_u32(3), None);
    }

    #[test]
    fn test_transitions() {
        assert!(ThreadState::Created.can_transition_to(ThreadState::Running));
        assert!(!ThreadState::Created.can_transition_to(ThreadState::Yielded));
        assert!(ThreadState::Running.can_transition_to(ThreadState::Yielded));
        assert!(ThreadState::Yielded.can_transition_to(ThreadState::Running));
        assert!(!ThreadState::Yielded.can_transition_to(ThreadState::Created));
    }
}
