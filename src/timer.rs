/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::utilities::{lock, Latch};
use crate::Context;

/// A one-shot deadline over a [`Context`](crate::Context)
///
/// [`start_timeout()`](Timer::start_timeout) schedules a callback to be
/// posted onto the context's worker queue once the duration has elapsed;
/// [`stop()`](Timer::stop) cancels it. A callback that has not yet started
/// executing when `stop()` is called never runs. A callback that is already
/// running cannot be recalled; compose the timer with a
/// [`WorkSerializer`](crate::WorkSerializer) when the caller must not race
/// it, as [`timed_async_operation()`](crate::closeable::timed_async_operation)
/// does.
///
/// Timers are cheap to clone; clones drive the same deadline, which lets a
/// completion handler stop the timer that was armed by the code that
/// launched it.
#[derive(Debug, Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
}

#[derive(Debug)]
struct TimerInner {
    context: Arc<Context>,
    armed: Mutex<Option<Latch>>,
}

impl Timer {
    pub fn new(context: &Arc<Context>) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                context: context.clone(),
                armed: Mutex::new(None),
            }),
        }
    }

    /// Arms the timer: `callback` is posted to the context after `delay`.
    /// Arming an already armed timer cancels the previous deadline.
    pub fn start_timeout<F>(&self, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let cancelled = Latch::new();
        {
            let mut armed = lock(&self.inner.armed);
            if let Some(previous) = armed.replace(cancelled.clone()) {
                previous.set();
            }
        }
        self.inner.context.schedule(delay, cancelled, Box::new(callback));
    }

    /// Cancels the pending deadline. A no-op if the timer is idle or has
    /// already fired.
    pub fn stop(&self) {
        if let Some(cancelled) = lock(&self.inner.armed).as_ref() {
            cancelled.set();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Instant;

    fn wait_until(condition: impl Fn() -> bool, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn fires_after_the_delay() {
        let context = Context::new().expect("Failed to create context!");
        let workers = context.spawn_workers(1).expect("Failed to spawn workers!");

        let fired = Arc::new(AtomicBool::new(false));
        let observed = fired.clone();
        let timer = Timer::new(&context);
        let started = Instant::now();
        timer.start_timeout(Duration::from_millis(50), move || {
            observed.store(true, Ordering::SeqCst);
        });

        assert!(wait_until(|| fired.load(Ordering::SeqCst), Duration::from_secs(5)));
        assert!(started.elapsed() >= Duration::from_millis(50));

        context.stop();
        for worker in workers {
            worker.join().expect("Worker thread panicked!");
        }
    }

    #[test]
    fn stop_prevents_the_callback() {
        let context = Context::new().expect("Failed to create context!");
        let workers = context.spawn_workers(1).expect("Failed to spawn workers!");

        let fired = Arc::new(AtomicBool::new(false));
        let observed = fired.clone();
        let timer = Timer::new(&context);
        timer.start_timeout(Duration::from_millis(100), move || {
            observed.store(true, Ordering::SeqCst);
        });
        timer.stop();

        thread::sleep(Duration::from_millis(250));
        assert!(!fired.load(Ordering::SeqCst));

        context.stop();
        for worker in workers {
            worker.join().expect("Worker thread panicked!");
        }
    }

    #[test]
    fn rearming_cancels_the_previous_deadline() {
        let context = Context::new().expect("Failed to create context!");
        let workers = context.spawn_workers(1).expect("Failed to spawn workers!");

        let early = Arc::new(AtomicBool::new(false));
        let late = Arc::new(AtomicBool::new(false));
        let timer = Timer::new(&context);

        let observed = early.clone();
        timer.start_timeout(Duration::from_millis(50), move || {
            observed.store(true, Ordering::SeqCst);
        });
        let observed = late.clone();
        timer.start_timeout(Duration::from_millis(100), move || {
            observed.store(true, Ordering::SeqCst);
        });

        assert!(wait_until(|| late.load(Ordering::SeqCst), Duration::from_secs(5)));
        assert!(!early.load(Ordering::SeqCst));

        context.stop();
        for worker in workers {
            worker.join().expect("Worker thread panicked!");
        }
    }
}
