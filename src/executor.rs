/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */
use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex};

use crate::utilities::lock;

type QueuedOperation = Box<dyn FnOnce(Completion) + Send + 'static>;

/// A FIFO of deferred asynchronous operations, running one at a time
///
/// [`execute()`](QueuedExecutor::execute) either starts the operation right
/// away (when nothing is in flight) or enqueues it. Every operation receives
/// a [`Completion`](Completion) token; finishing or dropping the token
/// dequeues and starts the next operation. Completions therefore fire
/// strictly in enqueue order.
///
/// [`ServiceClient`](crate::ServiceClient) uses one executor per client to
/// turn overlapping `async_call`s into sequential sessions on one socket.
#[derive(Clone)]
pub struct QueuedExecutor {
    state: Arc<Mutex<ExecutorState>>,
}

struct ExecutorState {
    queue: VecDeque<QueuedOperation>,
    running: bool,
}

impl QueuedExecutor {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ExecutorState {
                queue: VecDeque::new(),
                running: false,
            })),
        }
    }

    /// Runs `operation` once every previously executed operation has
    /// finished. The operation must eventually resolve its
    /// [`Completion`](Completion), or the queue stays blocked behind it.
    pub fn execute<F>(&self, operation: F)
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        let mut state = lock(&self.state);
        if state.running {
            state.queue.push_back(Box::new(operation));
            return;
        }
        state.running = true;
        drop(state);
        operation(Completion::new(self.state.clone()));
    }

    /// Drops all pending operations without running them. The operation in
    /// flight, if any, is not affected.
    pub fn clear(&self) {
        lock(&self.state).queue.clear();
    }

    pub fn pending(&self) -> usize {
        lock(&self.state).queue.len()
    }
}

impl Default for QueuedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for QueuedExecutor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("QueuedExecutor")
            .field("running", &state.running)
            .field("pending", &state.queue.len())
            .finish()
    }
}

/// Token handed to every queued operation; resolving it advances the queue
///
/// Resolve explicitly with [`finish()`](Completion::finish) at the end of
/// the operation's callback chain. Dropping an unresolved token resolves it
/// too, so an abandoned chain cannot wedge the queue head forever.
pub struct Completion {
    state: Arc<Mutex<ExecutorState>>,
    finished: bool,
}

impl Completion {
    fn new(state: Arc<Mutex<ExecutorState>>) -> Self {
        Self {
            state,
            finished: false,
        }
    }

    pub fn finish(mut self) {
        self.advance();
    }

    fn advance(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let next = {
            let mut state = lock(&self.state);
            match state.queue.pop_front() {
                Some(operation) => Some(operation),
                None => {
                    state.running = false;
                    None
                },
            }
        };
        if let Some(operation) = next {
            operation(Completion::new(self.state.clone()));
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.advance();
    }
}

impl Debug for Completion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion").field("finished", &self.finished).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn operations_complete_in_submission_order() {
        let executor = QueuedExecutor::new();
        let (order_tx, order_rx) = mpsc::channel();

        // Each operation finishes on its own thread after a delay that
        // *reverses* the natural ordering; FIFO must win anyway.
        for index in 0..3usize {
            let order_tx = order_tx.clone();
            executor.execute(move |completion| {
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(60 - 20 * index as u64));
                    order_tx.send(index).expect("Failed to record completion!");
                    completion.finish();
                });
            });
        }

        for expected in 0..3usize {
            let observed = order_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("Operation never completed!");
            assert_eq!(observed, expected);
        }
    }

    #[test]
    fn at_most_one_operation_in_flight() {
        let executor = QueuedExecutor::new();
        let (first_tx, first_rx) = mpsc::channel::<Completion>();

        executor.execute(move |completion| {
            first_tx.send(completion).expect("Failed to park completion!");
        });
        executor.execute(|completion| {
            completion.finish();
        });

        // The second operation must not have started yet.
        assert_eq!(executor.pending(), 1);
        let parked = first_rx.recv().expect("First operation never started!");
        parked.finish();
        assert_eq!(executor.pending(), 0);
    }

    #[test]
    fn clear_drops_pending_operations() {
        let executor = QueuedExecutor::new();
        let (first_tx, first_rx) = mpsc::channel::<Completion>();

        executor.execute(move |completion| {
            first_tx.send(completion).expect("Failed to park completion!");
        });
        executor.execute(|_completion| {
            panic!("cleared operation must never run");
        });

        executor.clear();
        assert_eq!(executor.pending(), 0);
        first_rx.recv().expect("First operation never started!").finish();
    }

    #[test]
    fn dropped_completion_advances_the_queue() {
        let executor = QueuedExecutor::new();
        let (done_tx, done_rx) = mpsc::channel();

        executor.execute(|completion| {
            // Dropped without an explicit finish().
            drop(completion);
        });
        executor.execute(move |completion| {
            done_tx.send(()).expect("Failed to signal completion!");
            completion.finish();
        });

        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("Queue stalled after a dropped completion!");
    }
}
