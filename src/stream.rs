/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */

//! Framed, deadline-bound I/O on TCP streams.
//!
//! [`TcpSocket`](TcpSocket) is the closeable stream endpoint; the free
//! functions in this module ([`connect()`], [`write_frame()`],
//! [`read_frame()`] and their `async_` counterparts) bind its operations to
//! a deadline through
//! [`timed_operation()`](crate::closeable::timed_operation).

use std::io::{Error as IoError, ErrorKind, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mio::net::TcpStream as MioTcpStream;
use mio::Interest;

use dns_lookup::lookup_host;
use log::warn;

use crate::closeable::{timed_async_operation, timed_operation, Closeable};
use crate::frame::{Frame, HEADER_SIZE};
use crate::poller::PollCore;
use crate::utilities::{lock, TimeBudget};
use crate::{Context, NetError};

/// A TCP stream endpoint whose pending operation can be aborted by closing
/// it from any thread
///
/// All read/write primitives on a `TcpSocket` are readiness loops without a
/// deadline of their own; they complete, fail, or observe the socket being
/// closed. Deadlines are applied by the framed operations in this module,
/// which close the socket when the timer fires. A socket that was closed
/// (by a deadline or explicitly) stays closed; sessions open a fresh socket
/// per call.
#[derive(Debug)]
pub struct TcpSocket {
    stream: Mutex<MioTcpStream>,
    core: PollCore,
}

impl TcpSocket {
    /// Registers `stream` with its own poll core. Accepted connections come
    /// through here via [`TcpListenerSocket::accept()`](crate::TcpListenerSocket::accept).
    pub(crate) fn from_stream(mut stream: MioTcpStream) -> Result<Arc<Self>, NetError> {
        let core = PollCore::new()?;
        core.register(&mut stream, Interest::READABLE | Interest::WRITABLE)?;
        Ok(Arc::new(Self {
            stream: Mutex::new(stream),
            core,
        }))
    }

    /// Starts a non-blocking connect towards `addr`. The connection is
    /// established once [`await_connected()`](TcpSocket::await_connected)
    /// returns.
    pub(crate) fn start_connect(addr: SocketAddr) -> Result<Arc<Self>, NetError> {
        let stream = MioTcpStream::connect(addr)?;
        Self::from_stream(stream)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        lock(&self.stream).peer_addr().ok()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.stream).local_addr().ok()
    }

    pub(crate) fn await_connected(&self) -> Result<(), NetError> {
        self.core.wait_ready(|| Self::event_conn(&mut lock(&self.stream)))
    }

    fn event_conn(stream: &mut MioTcpStream) -> Result<Option<()>, NetError> {
        loop {
            if let Some(error) = stream.take_error()? {
                return Err(error.into());
            }
            match stream.peer_addr() {
                Ok(_addr) => return Ok(Some(())),
                Err(error) => match error.kind() {
                    ErrorKind::Interrupted => (),
                    ErrorKind::NotConnected => return Ok(None),
                    _ => return Err(error.into()),
                },
            }
        }
    }

    /// Reads exactly `length` bytes. A stream that ends early fails with
    /// [`NetError::InvalidFrame`].
    pub(crate) fn read_exact(&self, length: usize) -> Result<Vec<u8>, NetError> {
        let mut buffer = vec![0u8; length];
        let mut filled = 0usize;
        self.core.wait_ready(|| {
            let mut stream = lock(&self.stream);
            loop {
                if filled == buffer.len() {
                    return Ok(Some(()));
                }
                match stream.read(&mut buffer[filled..]) {
                    Ok(0) => return Err(NetError::InvalidFrame),
                    Ok(count) => filled += count,
                    Err(error) => match error.kind() {
                        ErrorKind::Interrupted => (),
                        ErrorKind::WouldBlock => return Ok(None),
                        _ => return Err(error.into()),
                    },
                }
            }
        })?;
        Ok(buffer)
    }

    pub(crate) fn write_all(&self, bytes: &[u8]) -> Result<(), NetError> {
        let mut written = 0usize;
        self.core.wait_ready(|| {
            let mut stream = lock(&self.stream);
            loop {
                if written == bytes.len() {
                    return Ok(Some(()));
                }
                match stream.write(&bytes[written..]) {
                    Ok(0) => return Err(IoError::from(ErrorKind::WriteZero).into()),
                    Ok(count) => written += count,
                    Err(error) => match error.kind() {
                        ErrorKind::Interrupted => (),
                        ErrorKind::WouldBlock => return Ok(None),
                        _ => return Err(error.into()),
                    },
                }
            }
        })
    }
}

impl Closeable for TcpSocket {
    fn close(&self) {
        if self.core.raise_closed() {
            if let Err(error) = lock(&self.stream).shutdown(Shutdown::Both) {
                if error.kind() != ErrorKind::NotConnected {
                    warn!("Failed to shut down stream: {:?}", error);
                }
            }
        }
    }

    fn is_open(&self) -> bool {
        !self.core.closed()
    }
}

/// Resolves `host` (an IP literal or a DNS name) to a socket address.
pub(crate) fn resolve(host: &str, port: u16) -> Result<SocketAddr, NetError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    let addrs = lookup_host(host)?;
    match addrs.into_iter().next() {
        Some(ip) => Ok(SocketAddr::new(ip, port)),
        None => Err(IoError::new(ErrorKind::NotFound, "host has no addresses").into()),
    }
}

/// Connects to `host:port`, bounded by `timeout`. On success the returned
/// socket is open and connected; on a deadline the half-open socket has been
/// closed and the error is [`NetError::Aborted`].
pub fn connect(
    context: &Arc<Context>,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<Arc<TcpSocket>, NetError> {
    let addr = resolve(host, port)?;
    let socket = TcpSocket::start_connect(addr)?;
    let connecting = socket.clone();
    timed_operation(context, &socket, timeout, move || connecting.await_connected())?;
    Ok(socket)
}

/// Asynchronous flavor of [`connect()`]: the handler receives the connected
/// socket or the classified error. The handler always runs on a worker, even
/// when resolution fails before any I/O was started.
pub fn async_connect<H>(context: &Arc<Context>, host: &str, port: u16, timeout: Duration, handler: H)
where
    H: FnOnce(Result<Arc<TcpSocket>, NetError>) + Send + 'static,
{
    let socket = match resolve(host, port).and_then(TcpSocket::start_connect) {
        Ok(socket) => socket,
        Err(error) => {
            context.post_or_run(move || handler(Err(error)));
            return;
        },
    };
    let connecting = socket.clone();
    let connected = socket.clone();
    timed_async_operation(
        context,
        &socket,
        timeout,
        move || connecting.await_connected(),
        move |outcome| handler(outcome.map(|_| connected)),
    );
}

/// Writes one frame containing `payload`, bounded by `timeout`.
pub fn write_frame(
    context: &Arc<Context>,
    socket: &Arc<TcpSocket>,
    payload: &[u8],
    timeout: Duration,
) -> Result<(), NetError> {
    let bytes = Frame::new(payload.to_vec())?.into_bytes();
    let writing = socket.clone();
    timed_operation(context, socket, timeout, move || writing.write_all(&bytes))
}

/// Asynchronous flavor of [`write_frame()`].
pub fn async_write_frame<H>(
    context: &Arc<Context>,
    socket: &Arc<TcpSocket>,
    payload: Vec<u8>,
    timeout: Duration,
    handler: H,
) where
    H: FnOnce(Result<(), NetError>) + Send + 'static,
{
    let bytes = match Frame::new(payload) {
        Ok(frame) => frame.into_bytes(),
        Err(error) => {
            context.post_or_run(move || handler(Err(error)));
            return;
        },
    };
    let writing = socket.clone();
    timed_async_operation(context, socket, timeout, move || writing.write_all(&bytes), handler);
}

/// Reads one frame, bounded by `timeout` across both phases.
///
/// Phase one reads the header; phase two reads the payload with whatever
/// part of the budget phase one left over. A header announcing more than
/// `max_message_size` bytes fails with [`NetError::TooBig`] before any
/// payload byte is read; a short header or payload fails with
/// [`NetError::InvalidFrame`].
pub fn read_frame(
    context: &Arc<Context>,
    socket: &Arc<TcpSocket>,
    max_message_size: usize,
    timeout: Duration,
) -> Result<Vec<u8>, NetError> {
    let budget = TimeBudget::start(timeout);

    let reading = socket.clone();
    let header = timed_operation(context, socket, budget.remaining(), move || {
        reading.read_exact(HEADER_SIZE)
    })?;
    let length = parse_header(&header)?;
    if length == 0 {
        return Ok(Vec::new());
    }
    if length > max_message_size {
        return Err(NetError::TooBig);
    }
    if budget.expired() {
        return Err(NetError::TimedOut);
    }

    let reading = socket.clone();
    timed_operation(context, socket, budget.remaining(), move || {
        reading.read_exact(length)
    })
}

/// Asynchronous flavor of [`read_frame()`], chaining the two phases as
/// continuations while preserving the shared budget.
pub fn async_read_frame<H>(
    context: &Arc<Context>,
    socket: &Arc<TcpSocket>,
    max_message_size: usize,
    timeout: Duration,
    handler: H,
) where
    H: FnOnce(Result<Vec<u8>, NetError>) + Send + 'static,
{
    let budget = TimeBudget::start(timeout);
    let phase_two_context = context.clone();
    let phase_two_socket = socket.clone();

    let reading = socket.clone();
    timed_async_operation(
        context,
        socket,
        budget.remaining(),
        move || reading.read_exact(HEADER_SIZE),
        move |outcome| {
            let length = match outcome.and_then(|header| parse_header(&header)) {
                Ok(length) => length,
                Err(error) => return handler(Err(error)),
            };
            if length == 0 {
                return handler(Ok(Vec::new()));
            }
            if length > max_message_size {
                return handler(Err(NetError::TooBig));
            }
            if budget.expired() {
                return handler(Err(NetError::TimedOut));
            }
            let reading = phase_two_socket.clone();
            timed_async_operation(
                &phase_two_context,
                &phase_two_socket,
                budget.remaining(),
                move || reading.read_exact(length),
                handler,
            );
        },
    );
}

fn parse_header(header: &[u8]) -> Result<usize, NetError> {
    let header: &[u8; HEADER_SIZE] = header.try_into().map_err(|_| NetError::InvalidFrame)?;
    Ok(Frame::payload_len(header))
}
