/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */
use std::io::{ErrorKind, Result as IoResult};
use std::sync::Mutex;

use mio::event::Source;
use mio::{Events, Interest, Poll, Token, Waker};

use log::warn;

use crate::utilities::{lock, Latch};
use crate::NetError;

const SOCKET: Token = Token(0);
const WAKE: Token = Token(1);

/// Readiness-polling core owned by every socket type in this crate.
///
/// Each socket gets its own `Poll` plus a `Waker` and a closed flag, so a
/// `close()` issued from any thread (typically a deadline handler) can
/// interrupt the one operation pending on that socket without touching the
/// poll itself. The operation's readiness loop re-checks the flag after
/// every wake-up and bails out with [`NetError::Aborted`].
#[derive(Debug)]
pub(crate) struct PollCore {
    state: Mutex<PollState>,
    waker: Waker,
    closed: Latch,
}

#[derive(Debug)]
struct PollState {
    poll: Poll,
    events: Events,
}

impl PollCore {
    pub fn new() -> IoResult<Self> {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKE)?;
        Ok(Self {
            state: Mutex::new(PollState {
                poll,
                events: Events::with_capacity(8),
            }),
            waker,
            closed: Latch::new(),
        })
    }

    pub fn register<S: Source>(&self, source: &mut S, interests: Interest) -> IoResult<()> {
        lock(&self.state).poll.registry().register(source, SOCKET, interests)
    }

    /// Marks the core closed and wakes the pending readiness loop, if any.
    /// Returns `false` if the core was closed before.
    pub fn raise_closed(&self) -> bool {
        if !self.closed.set() {
            return false;
        }
        if let Err(error) = self.waker.wake() {
            warn!("Failed to wake pending operation: {:?}", error);
        }
        true
    }

    pub fn closed(&self) -> bool {
        self.closed.is_set()
    }

    /// Runs `attempt` until it yields a value, polling for readiness in
    /// between. `attempt` returns `Ok(None)` for "would block". The loop
    /// never times out on its own; it ends when the attempt completes, the
    /// attempt fails, or the closed flag is raised (then
    /// [`NetError::Aborted`]).
    pub fn wait_ready<T, F>(&self, mut attempt: F) -> Result<T, NetError>
    where
        F: FnMut() -> Result<Option<T>, NetError>,
    {
        loop {
            if self.closed.is_set() {
                return Err(NetError::Aborted);
            }
            if let Some(value) = attempt()? {
                return Ok(value);
            }
            if self.closed.is_set() {
                return Err(NetError::Aborted);
            }
            let mut state = lock(&self.state);
            let PollState { poll, events } = &mut *state;
            if let Err(error) = poll.poll(events, None) {
                if error.kind() != ErrorKind::Interrupted {
                    return Err(error.into());
                }
            }
        }
    }
}
