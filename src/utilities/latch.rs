/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shareable boolean switch with a race-deciding transition.
///
/// Clones observe the same state. [`set()`](Latch::set) reports `true` only
/// for the caller that actually flipped the switch, which is how the
/// cancellation paths pick a single winner: closing a socket once, stopping
/// a timer once, seizing a busy slot once.
#[derive(Debug, Clone)]
pub(crate) struct Latch {
    state: Arc<AtomicBool>,
}

impl Latch {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flips the switch on. `true` only for the one caller that made the
    /// transition.
    pub fn set(&self) -> bool {
        self.state.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    /// Returns the switch to its initial state. `true` if it was set.
    pub fn reset(&self) -> bool {
        self.state.compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    pub fn is_set(&self) -> bool {
        self.state.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_caller_wins_the_transition() {
        let latch = Latch::new();
        assert!(!latch.is_set());
        assert!(latch.set());
        assert!(!latch.set());
        assert!(latch.clone().is_set());
        assert!(latch.reset());
        assert!(!latch.reset());
        assert!(!latch.is_set());
    }
}
