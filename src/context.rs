/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::io::Result as IoResult;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use log::warn;

use crate::utilities::{lock, Latch};

pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

/// The dispatcher shared by everything in **netio**
///
/// A `Context` owns a queue of posted callbacks and hands them to whichever
/// worker thread asks first. Workers are just threads executing
/// [`run()`](Context::run); the [`spawn_workers()`](Context::spawn_workers)
/// helper creates them in bulk. There is **no** ordering between two
/// independently posted callbacks; callers that need mutual exclusion wrap
/// their callbacks in a [`WorkSerializer`](crate::WorkSerializer).
///
/// A dedicated scheduler thread (started by [`new()`](Context::new)) keeps
/// the armed deadlines of all [`Timer`](crate::Timer) instances in a min-heap
/// and posts each callback back onto the task queue when its deadline is
/// reached.
///
/// Synchronous operations like [`ServiceClient::call()`](crate::ServiceClient)
/// block their calling thread and run the underlying socket operation on a
/// worker, so the pool must have at least one free worker for every
/// concurrently blocked caller.
///
/// [`stop()`](Context::stop) closes the queue: workers finish the tasks that
/// were already posted and then return from `run()`.
#[derive(Debug)]
pub struct Context {
    tasks_tx: Mutex<Option<Sender<Task>>>,
    tasks_rx: Receiver<Task>,
    timer_tx: Mutex<Option<Sender<TimerCmd>>>,
    stopped: Latch,
}

enum TimerCmd {
    Arm(Scheduled),
    Shutdown,
}

struct Scheduled {
    deadline: Instant,
    cancelled: Latch,
    task: Task,
}

impl Context {
    /// Creates a new `Context` and starts its scheduler thread.
    pub fn new() -> IoResult<Arc<Self>> {
        let (tasks_tx, tasks_rx) = crossbeam_channel::unbounded();
        let (timer_tx, timer_rx) = crossbeam_channel::unbounded();

        let scheduler_tasks = tasks_tx.clone();
        thread::Builder::new()
            .name("netio-scheduler".into())
            .spawn(move || scheduler_loop(timer_rx, scheduler_tasks))?;

        Ok(Arc::new(Self {
            tasks_tx: Mutex::new(Some(tasks_tx)),
            tasks_rx,
            timer_tx: Mutex::new(Some(timer_tx)),
            stopped: Latch::new(),
        }))
    }

    /// Default worker count, one per available processor.
    pub fn default_worker_count() -> usize {
        num_cpus::get().max(1)
    }

    /// Spawns `count` worker threads, each executing [`run()`](Context::run).
    /// The returned handles become joinable once [`stop()`](Context::stop)
    /// has been called.
    pub fn spawn_workers(self: &Arc<Self>, count: usize) -> IoResult<Vec<JoinHandle<()>>> {
        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let context = self.clone();
            let handle = thread::Builder::new()
                .name(format!("netio-worker-{}", index))
                .spawn(move || context.run())?;
            workers.push(handle);
        }
        Ok(workers)
    }

    /// Enqueues `task` for execution on some worker thread. After
    /// [`stop()`](Context::stop) the task is dropped, with a warning so the
    /// loss is observable.
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.try_post(Box::new(task)).is_err() {
            warn!("Task was posted after the dispatcher stopped; it will not run");
        }
    }

    /// Enqueues `task`, handing it back when the dispatcher is stopped.
    pub(crate) fn try_post(&self, task: Task) -> Result<(), Task> {
        let sender = match lock(&self.tasks_tx).as_ref() {
            Some(sender) => sender.clone(),
            None => return Err(task),
        };
        sender.send(task).map_err(|rejected| rejected.into_inner())
    }

    /// Enqueues `task`, falling back to the calling thread when the
    /// dispatcher is stopped. For delivering completion handlers that must
    /// run exactly once even while everything shuts down.
    pub(crate) fn post_or_run<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(task) = self.try_post(Box::new(task)) {
            warn!("Dispatcher is stopped; delivering the callback on the calling thread");
            task();
        }
    }

    /// Executes posted tasks on the calling thread until the queue is
    /// stopped and drained.
    pub fn run(&self) {
        let tasks = self.tasks_rx.clone();
        while let Ok(task) = tasks.recv() {
            task();
        }
    }

    /// Shuts the dispatcher down. Already posted tasks still run; new posts
    /// are dropped; armed timers never fire.
    pub fn stop(&self) {
        if !self.stopped.set() {
            return;
        }
        if let Some(sender) = lock(&self.timer_tx).take() {
            let _ = sender.send(TimerCmd::Shutdown);
        }
        lock(&self.tasks_tx).take();
    }

    pub fn stopped(&self) -> bool {
        self.stopped.is_set()
    }

    pub(crate) fn schedule(&self, delay: Duration, cancelled: Latch, task: Task) {
        let scheduled = Scheduled {
            deadline: Instant::now() + delay,
            cancelled,
            task,
        };
        if let Some(sender) = lock(&self.timer_tx).as_ref() {
            let _ = sender.send(TimerCmd::Arm(scheduled));
        }
    }
}

fn scheduler_loop(commands: Receiver<TimerCmd>, tasks: Sender<Task>) {
    let mut pending: BinaryHeap<Reverse<Scheduled>> = BinaryHeap::new();

    loop {
        let now = Instant::now();
        while pending.peek().map_or(false, |Reverse(entry)| entry.deadline <= now) {
            if let Some(Reverse(entry)) = pending.pop() {
                if entry.cancelled.is_set() {
                    continue;
                }
                let cancelled = entry.cancelled;
                let task = entry.task;
                // Re-checked on the worker: the cancellation may land
                // between here and the moment a worker picks the task up.
                let _ = tasks.send(Box::new(move || {
                    if !cancelled.is_set() {
                        task();
                    }
                }));
            }
        }

        let command = match pending.peek() {
            Some(Reverse(next)) => {
                let wait = next.deadline.saturating_duration_since(Instant::now());
                match commands.recv_timeout(wait) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            },
            None => match commands.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
        };

        match command {
            TimerCmd::Arm(entry) => pending.push(Reverse(entry)),
            TimerCmd::Shutdown => break,
        }
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.deadline.cmp(&other.deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn posted_tasks_run_on_workers() {
        let context = Context::new().expect("Failed to create context!");
        let workers = context.spawn_workers(2).expect("Failed to spawn workers!");

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            let counter = counter.clone();
            context.post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) < 16 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 16);

        context.stop();
        for worker in workers {
            worker.join().expect("Worker thread panicked!");
        }
    }

    #[test]
    fn stop_drains_and_releases_workers() {
        let context = Context::new().expect("Failed to create context!");
        let workers = context.spawn_workers(1).expect("Failed to spawn workers!");

        let ran = Arc::new(AtomicUsize::new(0));
        let observed = ran.clone();
        context.post(move || {
            observed.fetch_add(1, Ordering::SeqCst);
        });
        context.stop();
        assert!(context.stopped());

        for worker in workers {
            worker.join().expect("Worker thread panicked!");
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        // Posting after stop drops the task (with a warning).
        context.post(|| panic!("must not run"));
    }
}
