/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */
use crate::utilities::Latch;
use crate::NetError;

/// An exclusive-use marker preventing overlapping operations on a resource
///
/// [`try_lock()`](Busyable::try_lock) transitions *free* → *busy* and hands
/// out a [`BusyLock`](BusyLock) guard, or fails with [`NetError::Busy`] if
/// the resource is already held. Dropping the guard transitions back to
/// *free*.
#[derive(Debug)]
pub struct Busyable {
    busy: Latch,
}

impl Busyable {
    pub fn new() -> Self {
        Self {
            busy: Latch::new(),
        }
    }

    pub fn try_lock(&self) -> Result<BusyLock, NetError> {
        if self.busy.set() {
            Ok(BusyLock {
                busy: self.busy.clone(),
            })
        } else {
            Err(NetError::Busy)
        }
    }

    pub fn busy(&self) -> bool {
        self.busy.is_set()
    }
}

impl Default for Busyable {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped ownership of a [`Busyable`](Busyable)'s busy state
#[derive(Debug)]
pub struct BusyLock {
    busy: Latch,
}

impl Drop for BusyLock {
    fn drop(&mut self) {
        self.busy.reset();
    }
}
