/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */

//! Binding asynchronous operations to deadlines by closing their target.
//!
//! The crate has no per-operation cancel token. Instead, every timed
//! operation arms a [`Timer`](crate::Timer) whose expiry closes the socket
//! the operation is pending on, which forces the operation to complete. A
//! shared [`WorkSerializer`](crate::WorkSerializer) keeps the deadline
//! handler and the completion handler from racing, so every operation
//! resolves to exactly one classification: completed, failed, or aborted.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::utilities::lock;
use crate::wait::{WaitExpr, Waiter};
use crate::{Context, NetError, Timer, WorkSerializer};

/// A resource that can be closed from any thread while an operation on it is
/// pending, forcing that operation to complete.
pub trait Closeable {
    /// Closes the resource. Errors are ignored; closing an already closed
    /// resource is a no-op.
    fn close(&self);

    fn is_open(&self) -> bool;
}

/// Scoped guard that closes a [`Closeable`](Closeable) when dropped
///
/// The guard is armed on construction; [`disarm()`](Closer::disarm) turns
/// the drop into a no-op. Close errors are swallowed, per the contract of
/// [`Closeable::close()`](Closeable::close).
#[derive(Debug)]
pub struct Closer<C: Closeable> {
    target: Arc<C>,
    armed: bool,
}

impl<C: Closeable> Closer<C> {
    pub fn new(target: Arc<C>) -> Self {
        Self {
            target,
            armed: true,
        }
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<C: Closeable> Drop for Closer<C> {
    fn drop(&mut self) {
        if self.armed {
            self.target.close();
        }
    }
}

/// Runs `operation` on a worker thread with a deadline of `timeout`,
/// delivering exactly one classified outcome to `handler`.
///
/// `operation` must be a readiness loop on `target` that blocks until the
/// operation completes or until `target` is closed; it must never time out
/// on its own. The deadline works by closing `target`, so after an abort the
/// target is unusable, which is the intended cancellation semantic.
///
/// Classification (evaluated under a serializer shared with the deadline
/// handler):
/// - target closed when the operation completed: [`NetError::Aborted`],
///   even if the operation notionally succeeded;
/// - operation failed with the target still open: the operation's error;
/// - otherwise: the operation's result.
///
/// A dispatcher that was stopped before the operation could be posted also
/// counts as an abort; that one classification is delivered on the calling
/// thread, since no worker will ever run it.
pub fn timed_async_operation<C, T, Op, H>(
    context: &Arc<Context>,
    target: &Arc<C>,
    timeout: Duration,
    operation: Op,
    handler: H,
) where
    C: Closeable + Send + Sync + 'static,
    T: Send + 'static,
    Op: FnOnce() -> Result<T, NetError> + Send + 'static,
    H: FnOnce(Result<T, NetError>) + Send + 'static,
{
    // One serializer shared by the deadline handler and the completion
    // handler. The completion can therefore only observe the target either
    // before the deadline closed it or after, never halfway.
    let serializer = WorkSerializer::new();
    let timer = Timer::new(context);

    let deadline_target = target.clone();
    let deadline_serializer = serializer.clone();
    timer.start_timeout(timeout, move || {
        deadline_serializer.run(|| deadline_target.close());
    });

    // The handler lives in a shared slot so that exactly one of the two
    // delivery paths below can take it, even when stop() races the launch.
    let target = target.clone();
    let handler = Arc::new(Mutex::new(Some(handler)));
    let undelivered = handler.clone();
    let armed_timer = timer.clone();
    let launched = context.try_post(Box::new(move || {
        let outcome = operation();
        serializer.run(move || {
            timer.stop();
            let outcome = if !target.is_open() {
                Err(NetError::Aborted)
            } else {
                outcome
            };
            if let Some(handler) = lock(&handler).take() {
                handler(outcome);
            }
        });
    }));
    if launched.is_err() {
        // The dispatcher is stopped: the operation can never run, and the
        // scheduler dropped the deadline with it. Surface the abort on the
        // calling thread rather than losing the handler.
        armed_timer.stop();
        if let Some(handler) = lock(&undelivered).take() {
            handler(Err(NetError::Aborted));
        }
    }
}

/// Blocking flavor of [`timed_async_operation()`](timed_async_operation):
/// parks the calling thread on a [`Waiter`](crate::Waiter) until the
/// classification lands and returns it.
pub fn timed_operation<C, T, Op>(
    context: &Arc<Context>,
    target: &Arc<C>,
    timeout: Duration,
    operation: Op,
) -> Result<T, NetError>
where
    C: Closeable + Send + Sync + 'static,
    T: Send + 'static,
    Op: FnOnce() -> Result<T, NetError> + Send + 'static,
{
    let waiter = Waiter::new();
    let waitable = waiter.waitable();
    let outcome = Arc::new(Mutex::new(None));

    let slot = outcome.clone();
    let completed = waitable.clone();
    timed_async_operation(context, target, timeout, operation, move |result| {
        *lock(&slot) = Some(result);
        completed.set_ready();
    });

    waiter.wait_for(&WaitExpr::from(&waitable));
    let result = lock(&outcome)
        .take()
        .expect("timed operation signalled completion without a result");
    result
}
