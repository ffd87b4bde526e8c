/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */
use std::sync::{Arc, Mutex};

use crate::utilities::lock;

/// A token that makes callbacks mutually exclusive
///
/// Any two closures executed through [`run()`](WorkSerializer::run) on the
/// *same* serializer (or on clones of it) never overlap, and each one
/// observes the memory effects of every previously completed one. Distinct
/// serializers are fully independent. No FIFO order is promised between
/// different callbacks, only mutual exclusion.
///
/// This is the mechanism that keeps a deadline handler and an operation's
/// completion handler from racing in
/// [`timed_async_operation()`](crate::closeable::timed_async_operation).
#[derive(Debug, Clone)]
pub struct WorkSerializer {
    guard: Arc<Mutex<()>>,
}

impl WorkSerializer {
    pub fn new() -> Self {
        Self {
            guard: Arc::new(Mutex::new(())),
        }
    }

    /// Runs `task` while holding the serializer.
    pub fn run<R>(&self, task: impl FnOnce() -> R) -> R {
        let _held = lock(&self.guard);
        task()
    }

    /// Wraps `task` so that every invocation of the returned closure runs
    /// under this serializer. The wrapper may be cloned and invoked any
    /// number of times.
    pub fn wrap<F>(&self, task: F) -> impl Fn() + Send + 'static
    where
        F: Fn() + Send + 'static,
    {
        let serializer = self.clone();
        move || serializer.run(&task)
    }
}

impl Default for WorkSerializer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn wrapped_callbacks_never_overlap() {
        let serializer = WorkSerializer::new();
        let inside = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        let mut threads = Vec::new();
        for _ in 0..8 {
            let serializer = serializer.clone();
            let inside = inside.clone();
            let overlaps = overlaps.clone();
            let runs = runs.clone();
            threads.push(thread::spawn(move || {
                for _ in 0..100 {
                    serializer.run(|| {
                        if inside.swap(true, Ordering::SeqCst) {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        runs.fetch_add(1, Ordering::SeqCst);
                        inside.store(false, Ordering::SeqCst);
                    });
                }
            }));
        }
        for thread in threads {
            thread.join().expect("Serializer thread panicked!");
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 800);
    }

    #[test]
    fn wrapper_is_reusable() {
        let serializer = WorkSerializer::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        let wrapped = serializer.wrap(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        wrapped();
        wrapped();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn distinct_serializers_are_independent() {
        let first = WorkSerializer::new();
        let second = WorkSerializer::new();
        // Holding one serializer must not block the other.
        first.run(|| second.run(|| ()));
    }
}
