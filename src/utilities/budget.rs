/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */
use std::time::{Duration, Instant};

/// Remaining-time accounting for operations that are split into stages, all
/// sharing one overall deadline. Each stage asks for `remaining()` when it
/// starts, so time spent in earlier stages shrinks the budget of later ones.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimeBudget {
    start: Instant,
    total: Duration,
}

impl TimeBudget {
    pub fn start(total: Duration) -> Self {
        Self {
            start: Instant::now(),
            total,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.start.elapsed())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }
}
