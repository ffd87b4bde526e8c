/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */

//! Typed messages over the framed stream and datagram transports.
//!
//! The transports move raw bytes; this module plugs a user codec on top.
//! Sending is encode-then-transmit, receiving is receive-then-decode. Codec
//! failures surface as [`NetError::Encoding`] / [`NetError::Decoding`]; on
//! the asynchronous paths an encode failure is still delivered through the
//! context, so a handler *always* runs asynchronously, exactly once.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use crate::{datagram, stream, Context, NetError, TcpSocket, UdpSocket};

/// Frame payloads a receiver accepts by default.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 512;

/// Rejection raised by a user codec. Deliberately opaque: the transport only
/// cares *that* encoding or decoding failed, not why.
#[derive(Debug)]
pub struct CodecError;

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "The message codec rejected the data!")
    }
}

impl Error for CodecError { }

/// A user message type with a byte-level codec
///
/// `decode(encode(m))` must reproduce `m` for every supported value. The
/// transports never interpret the bytes in between.
pub trait Message: Sized {
    fn encode(&self) -> Result<Vec<u8>, CodecError>;

    fn decode(data: &[u8]) -> Result<Self, CodecError>;
}

impl Message for String {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.as_bytes().to_vec())
    }

    fn decode(data: &[u8]) -> Result<Self, CodecError> {
        std::str::from_utf8(data).map(str::to_owned).map_err(|_| CodecError)
    }
}

impl Message for Vec<u8> {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.clone())
    }

    fn decode(data: &[u8]) -> Result<Self, CodecError> {
        Ok(data.to_vec())
    }
}

/// A request/response pairing of message types, implemented by the services
/// a [`ServiceClient`](crate::ServiceClient) calls and a
/// [`ServiceServer`](crate::ServiceServer) serves.
pub trait Service {
    type Request: Message + Send + 'static;
    type Response: Message + Send + 'static;
}

/// Encodes `message` and writes it as one frame, bounded by `timeout`.
pub fn send<M: Message>(
    context: &Arc<Context>,
    socket: &Arc<TcpSocket>,
    message: &M,
    timeout: Duration,
) -> Result<(), NetError> {
    let data = message.encode().map_err(|_| NetError::Encoding)?;
    stream::write_frame(context, socket, &data, timeout)
}

/// Asynchronous flavor of [`send()`].
pub fn async_send<M, H>(
    context: &Arc<Context>,
    socket: &Arc<TcpSocket>,
    message: &M,
    timeout: Duration,
    handler: H,
) where
    M: Message,
    H: FnOnce(Result<(), NetError>) + Send + 'static,
{
    let data = match message.encode() {
        Ok(data) => data,
        Err(_) => {
            context.post_or_run(move || handler(Err(NetError::Encoding)));
            return;
        },
    };
    stream::async_write_frame(context, socket, data, timeout, handler);
}

/// Reads one frame and decodes it, bounded by `timeout`.
pub fn receive<M: Message>(
    context: &Arc<Context>,
    socket: &Arc<TcpSocket>,
    max_message_size: usize,
    timeout: Duration,
) -> Result<M, NetError> {
    let data = stream::read_frame(context, socket, max_message_size, timeout)?;
    M::decode(&data).map_err(|_| NetError::Decoding)
}

/// Asynchronous flavor of [`receive()`].
pub fn async_receive<M, H>(
    context: &Arc<Context>,
    socket: &Arc<TcpSocket>,
    max_message_size: usize,
    timeout: Duration,
    handler: H,
) where
    M: Message,
    H: FnOnce(Result<M, NetError>) + Send + 'static,
{
    stream::async_read_frame(context, socket, max_message_size, timeout, move |outcome| {
        handler(outcome.and_then(|data| M::decode(&data).map_err(|_| NetError::Decoding)))
    });
}

/// Encodes `message` and sends it as one datagram to `host:port`.
pub fn send_datagram<M: Message>(
    context: &Arc<Context>,
    socket: &Arc<UdpSocket>,
    message: &M,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<(), NetError> {
    let data = message.encode().map_err(|_| NetError::Encoding)?;
    datagram::send_to(context, socket, data, host, port, timeout)
}

/// Asynchronous flavor of [`send_datagram()`].
pub fn async_send_datagram<M, H>(
    context: &Arc<Context>,
    socket: &Arc<UdpSocket>,
    message: &M,
    host: &str,
    port: u16,
    timeout: Duration,
    handler: H,
) where
    M: Message,
    H: FnOnce(Result<(), NetError>) + Send + 'static,
{
    let data = match message.encode() {
        Ok(data) => data,
        Err(_) => {
            context.post_or_run(move || handler(Err(NetError::Encoding)));
            return;
        },
    };
    datagram::async_send_to(context, socket, data, host, port, timeout, handler);
}

/// Receives one datagram and decodes it. Returns the message and the
/// sender's endpoint.
pub fn receive_datagram<M: Message>(
    context: &Arc<Context>,
    socket: &Arc<UdpSocket>,
    max_message_size: usize,
    timeout: Duration,
) -> Result<(M, String, u16), NetError> {
    let (data, host, port) = datagram::receive_from(context, socket, max_message_size, timeout)?;
    let message = M::decode(&data).map_err(|_| NetError::Decoding)?;
    Ok((message, host, port))
}

/// Asynchronous flavor of [`receive_datagram()`].
pub fn async_receive_datagram<M, H>(
    context: &Arc<Context>,
    socket: &Arc<UdpSocket>,
    max_message_size: usize,
    timeout: Duration,
    handler: H,
) where
    M: Message,
    H: FnOnce(Result<(M, String, u16), NetError>) + Send + 'static,
{
    datagram::async_receive_from(context, socket, max_message_size, timeout, move |outcome| {
        handler(outcome.and_then(|(data, host, port)| {
            match M::decode(&data) {
                Ok(message) => Ok((message, host, port)),
                Err(_) => Err(NetError::Decoding),
            }
        }))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_codec_round_trip() {
        let message = String::from("hello");
        let data = message.encode().expect("Failed to encode!");
        assert_eq!(String::decode(&data).expect("Failed to decode!"), message);
    }

    #[test]
    fn string_decode_rejects_invalid_utf8() {
        assert!(String::decode(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn byte_codec_is_identity() {
        let message = vec![0u8, 1, 2, 255];
        let data = message.encode().expect("Failed to encode!");
        assert_eq!(Vec::<u8>::decode(&data).expect("Failed to decode!"), message);
    }
}
