/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */

//! Deadline-bound, single-shot UDP send and receive.
//!
//! No framing is applied on datagram transports; the datagram boundary *is*
//! the message boundary. Receives report the sender's endpoint.

use std::io::{Error as IoError, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mio::net::UdpSocket as MioUdpSocket;
use mio::Interest;

use crate::closeable::{timed_async_operation, timed_operation, Closeable};
use crate::poller::PollCore;
use crate::stream::resolve;
use crate::{Context, NetError};

/// A UDP endpoint whose pending operation can be aborted by closing it from
/// any thread, akin to [`TcpSocket`](crate::TcpSocket) for streams
#[derive(Debug)]
pub struct UdpSocket {
    socket: MioUdpSocket,
    core: PollCore,
}

impl UdpSocket {
    /// Creates a new UDP socket bound to the specified local address. Use
    /// port `0` for an ephemeral sender port.
    pub fn bind(addr: SocketAddr) -> Result<Arc<Self>, NetError> {
        let mut socket = MioUdpSocket::bind(addr)?;
        let core = PollCore::new()?;
        core.register(&mut socket, Interest::READABLE | Interest::WRITABLE)?;
        Ok(Arc::new(Self {
            socket,
            core,
        }))
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    pub(crate) fn send_pending(&self, bytes: &[u8], target: SocketAddr) -> Result<(), NetError> {
        self.core.wait_ready(|| Self::event_send(&self.socket, bytes, target))
    }

    /// Receives one datagram of at most `max_message_size` bytes. A longer
    /// datagram would be truncated by the kernel, so it is rejected as
    /// [`NetError::Failed`] instead of being delivered short.
    pub(crate) fn receive_pending(
        &self,
        max_message_size: usize,
    ) -> Result<(Vec<u8>, SocketAddr), NetError> {
        let mut buffer = vec![0u8; max_message_size + 1];
        let (count, sender) = self
            .core
            .wait_ready(|| Self::event_receive(&self.socket, &mut buffer))?;
        if count > max_message_size {
            return Err(IoError::new(ErrorKind::InvalidData, "datagram was truncated").into());
        }
        buffer.truncate(count);
        Ok((buffer, sender))
    }

    fn event_send(
        socket: &MioUdpSocket,
        bytes: &[u8],
        target: SocketAddr,
    ) -> Result<Option<()>, NetError> {
        loop {
            match socket.send_to(bytes, target) {
                Ok(count) if count == bytes.len() => return Ok(Some(())),
                Ok(_) => {
                    return Err(IoError::new(ErrorKind::Other, "datagram was sent partially").into())
                },
                Err(error) => match error.kind() {
                    ErrorKind::Interrupted => (),
                    ErrorKind::WouldBlock => return Ok(None),
                    _ => return Err(error.into()),
                },
            }
        }
    }

    fn event_receive(
        socket: &MioUdpSocket,
        buffer: &mut [u8],
    ) -> Result<Option<(usize, SocketAddr)>, NetError> {
        loop {
            match socket.recv_from(buffer) {
                Ok((count, sender)) => return Ok(Some((count, sender))),
                Err(error) => match error.kind() {
                    ErrorKind::Interrupted => (),
                    ErrorKind::WouldBlock => return Ok(None),
                    _ => return Err(error.into()),
                },
            }
        }
    }
}

impl Closeable for UdpSocket {
    fn close(&self) {
        self.core.raise_closed();
    }

    fn is_open(&self) -> bool {
        !self.core.closed()
    }
}

/// Sends `payload` as one datagram to `host:port`, bounded by `timeout`.
pub fn send_to(
    context: &Arc<Context>,
    socket: &Arc<UdpSocket>,
    payload: Vec<u8>,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<(), NetError> {
    let target = resolve(host, port)?;
    let sending = socket.clone();
    timed_operation(context, socket, timeout, move || {
        sending.send_pending(&payload, target)
    })
}

/// Asynchronous flavor of [`send_to()`].
pub fn async_send_to<H>(
    context: &Arc<Context>,
    socket: &Arc<UdpSocket>,
    payload: Vec<u8>,
    host: &str,
    port: u16,
    timeout: Duration,
    handler: H,
) where
    H: FnOnce(Result<(), NetError>) + Send + 'static,
{
    let target = match resolve(host, port) {
        Ok(target) => target,
        Err(error) => {
            context.post_or_run(move || handler(Err(error)));
            return;
        },
    };
    let sending = socket.clone();
    timed_async_operation(
        context,
        socket,
        timeout,
        move || sending.send_pending(&payload, target),
        handler,
    );
}

/// Receives one datagram, bounded by `timeout`. Returns the payload and the
/// sender's endpoint as `(bytes, host, port)`.
pub fn receive_from(
    context: &Arc<Context>,
    socket: &Arc<UdpSocket>,
    max_message_size: usize,
    timeout: Duration,
) -> Result<(Vec<u8>, String, u16), NetError> {
    let receiving = socket.clone();
    let (payload, sender) = timed_operation(context, socket, timeout, move || {
        receiving.receive_pending(max_message_size)
    })?;
    Ok((payload, sender.ip().to_string(), sender.port()))
}

/// Asynchronous flavor of [`receive_from()`].
pub fn async_receive_from<H>(
    context: &Arc<Context>,
    socket: &Arc<UdpSocket>,
    max_message_size: usize,
    timeout: Duration,
    handler: H,
) where
    H: FnOnce(Result<(Vec<u8>, String, u16), NetError>) + Send + 'static,
{
    let receiving = socket.clone();
    timed_async_operation(
        context,
        socket,
        timeout,
        move || receiving.receive_pending(max_message_size),
        move |outcome| {
            handler(outcome.map(|(payload, sender)| {
                (payload, sender.ip().to_string(), sender.port())
            }))
        },
    );
}
