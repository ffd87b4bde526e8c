/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::utilities::lock;

/// A blocker over a set of named completion flags
///
/// A `Waiter` owns the readiness states of the [`Waitable`](Waitable)s
/// created from it. [`wait_for()`](Waiter::wait_for) blocks the calling
/// thread until a boolean [`WaitExpr`](WaitExpr) over those states holds.
/// Every state transition happens under the waiter's lock, so a transition
/// between evaluating the expression and going to sleep cannot be missed.
#[derive(Debug)]
pub struct Waiter {
    shared: Arc<WaiterShared>,
}

#[derive(Debug)]
struct WaiterShared {
    states: Mutex<Vec<bool>>,
    readiness_changed: Condvar,
}

impl Waiter {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(WaiterShared {
                states: Mutex::new(Vec::new()),
                readiness_changed: Condvar::new(),
            }),
        }
    }

    /// Creates a new [`Waitable`](Waitable) bound to this waiter, initially
    /// in the *waiting* state.
    pub fn waitable(&self) -> Waitable {
        let mut states = lock(&self.shared.states);
        states.push(false);
        Waitable {
            shared: self.shared.clone(),
            index: states.len() - 1,
        }
    }

    /// Blocks until `expression` evaluates to `true` over the current
    /// readiness states. Returns immediately if it already holds.
    pub fn wait_for(&self, expression: &WaitExpr) {
        let mut states = lock(&self.shared.states);
        while !expression.evaluate(&states) {
            states = self
                .shared
                .readiness_changed
                .wait(states)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new()
    }
}

/// A single completion flag owned by a [`Waiter`](Waiter)
///
/// Clones refer to the same flag. A waitable becomes *ready* through
/// [`set_ready()`](Waitable::set_ready) or by invoking a closure produced by
/// [`wrap()`](Waitable::wrap); [`set_waiting()`](Waitable::set_waiting)
/// rearms it.
#[derive(Debug, Clone)]
pub struct Waitable {
    shared: Arc<WaiterShared>,
    index: usize,
}

impl Waitable {
    pub fn set_ready(&self) {
        self.set(true);
    }

    pub fn set_waiting(&self) {
        self.set(false);
    }

    pub fn ready(&self) -> bool {
        lock(&self.shared.states)[self.index]
    }

    fn set(&self, ready: bool) {
        let mut states = lock(&self.shared.states);
        states[self.index] = ready;
        self.shared.readiness_changed.notify_all();
    }

    /// Wraps `task` so that invoking the returned closure first runs `task`
    /// and then marks this waitable ready.
    pub fn wrap<F>(&self, task: F) -> impl FnOnce() + Send + 'static
    where
        F: FnOnce() + Send + 'static,
    {
        let waitable = self.clone();
        move || {
            task();
            waitable.set_ready();
        }
    }
}

/// A boolean expression tree over [`Waitable`](Waitable)s
///
/// Leaves evaluate to the current readiness of a waitable; `Not`, `And` and
/// `Or` compose them. Evaluation is purely functional over the states at the
/// moment the waiter's lock is held. Expressions must only combine waitables
/// of the waiter they are passed to.
#[derive(Debug, Clone)]
pub enum WaitExpr {
    Ready(usize),
    Not(Box<WaitExpr>),
    And(Box<WaitExpr>, Box<WaitExpr>),
    Or(Box<WaitExpr>, Box<WaitExpr>),
}

impl WaitExpr {
    pub fn and(self, other: WaitExpr) -> WaitExpr {
        WaitExpr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: WaitExpr) -> WaitExpr {
        WaitExpr::Or(Box::new(self), Box::new(other))
    }

    pub fn not(self) -> WaitExpr {
        WaitExpr::Not(Box::new(self))
    }

    fn evaluate(&self, states: &[bool]) -> bool {
        match self {
            WaitExpr::Ready(index) => states.get(*index).copied().unwrap_or(false),
            WaitExpr::Not(inner) => !inner.evaluate(states),
            WaitExpr::And(left, right) => left.evaluate(states) && right.evaluate(states),
            WaitExpr::Or(left, right) => left.evaluate(states) || right.evaluate(states),
        }
    }
}

impl From<&Waitable> for WaitExpr {
    fn from(waitable: &Waitable) -> Self {
        WaitExpr::Ready(waitable.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn expression_algebra() {
        let waiter = Waiter::new();
        let first = waiter.waitable();
        let second = waiter.waitable();

        let both = WaitExpr::from(&first).and(WaitExpr::from(&second));
        let either = WaitExpr::from(&first).or(WaitExpr::from(&second));
        let neither = WaitExpr::from(&first).not().and(WaitExpr::from(&second).not());

        waiter.wait_for(&neither);

        first.set_ready();
        waiter.wait_for(&either);
        assert!(first.ready());
        assert!(!second.ready());

        second.set_ready();
        waiter.wait_for(&both);

        first.set_waiting();
        waiter.wait_for(&WaitExpr::from(&first).not());
    }

    #[test]
    fn wrap_marks_ready_after_the_task() {
        let waiter = Waiter::new();
        let waitable = waiter.waitable();
        let wrapped = waitable.wrap(|| ());
        assert!(!waitable.ready());
        wrapped();
        assert!(waitable.ready());
    }

    // Three tasks and the composite `w1 && (w2 || w3)`: the wait must not
    // return before w1 and at least one of w2, w3 are ready.
    #[test]
    fn composite_wait_blocks_until_satisfied() {
        let waiter = Waiter::new();
        let w1 = waiter.waitable();
        let w2 = waiter.waitable();
        let w3 = waiter.waitable();

        let started = Instant::now();
        let delayed = [(w1.clone(), 120u64), (w2.clone(), 200), (w3.clone(), 350)];
        let mut tasks = Vec::new();
        for (waitable, delay) in delayed {
            tasks.push(thread::spawn(move || {
                thread::sleep(Duration::from_millis(delay));
                waitable.set_ready();
            }));
        }

        let expression = WaitExpr::from(&w1).and(WaitExpr::from(&w2).or(WaitExpr::from(&w3)));
        waiter.wait_for(&expression);

        // w1 (120ms) and w2 (200ms) must both have fired.
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(w1.ready());
        assert!(w2.ready() || w3.ready());

        for task in tasks {
            task.join().expect("Readiness thread panicked!");
        }
    }
}
