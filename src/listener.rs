/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use mio::net::{TcpListener as MioTcpListener, TcpStream as MioTcpStream};
use mio::Interest;

use crate::closeable::Closeable;
use crate::poller::PollCore;
use crate::stream::TcpSocket;
use crate::NetError;

/// A TCP socket server, listening for connections
///
/// [`accept()`](TcpListenerSocket::accept) blocks until a connection
/// arrives or the listener is closed from another thread, which makes the
/// pending accept fail with [`NetError::Aborted`]. This is the shutdown
/// path of [`ServiceServer`](crate::ServiceServer).
#[derive(Debug)]
pub struct TcpListenerSocket {
    listener: MioTcpListener,
    core: PollCore,
}

impl TcpListenerSocket {
    /// Creates a new listener bound to the specified socket address.
    pub fn bind(addr: SocketAddr) -> Result<Arc<Self>, NetError> {
        let mut listener = MioTcpListener::bind(addr)?;
        let core = PollCore::new()?;
        core.register(&mut listener, Interest::READABLE)?;
        Ok(Arc::new(Self {
            listener,
            core,
        }))
    }

    /// Get the *local* socket address to which this listener is bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Accept a new incoming connection, already registered as a
    /// [`TcpSocket`](crate::TcpSocket) of its own. Blocks until one
    /// arrives, an error occurs, or the listener is closed
    /// ([`NetError::Aborted`]).
    pub fn accept(&self) -> Result<Arc<TcpSocket>, NetError> {
        let stream = self.core.wait_ready(|| Self::event_accept(&self.listener))?;
        TcpSocket::from_stream(stream)
    }

    fn event_accept(listener: &MioTcpListener) -> Result<Option<MioTcpStream>, NetError> {
        loop {
            match listener.accept() {
                Ok((stream, _addr)) => return Ok(Some(stream)),
                Err(error) => match error.kind() {
                    ErrorKind::Interrupted => (),
                    ErrorKind::WouldBlock => return Ok(None),
                    _ => return Err(error.into()),
                },
            }
        }
    }
}

impl Closeable for TcpListenerSocket {
    fn close(&self) {
        self.core.raise_closed();
    }

    fn is_open(&self) -> bool {
        !self.core.closed()
    }
}
