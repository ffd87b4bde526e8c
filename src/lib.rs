/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */

//! **netio** provides request/response and datagram networking where every
//! operation is bound to a ***deadline*** and cancellation is expressed by
//! ***closing*** the underlying socket.
//!
//! The crate is built on three layers:
//!
//! 1. Timed operations: [`closeable::timed_operation`] and
//!    [`closeable::timed_async_operation`] race any pending socket
//!    operation against a [`Timer`](Timer) whose expiry closes the socket.
//!    A shared [`WorkSerializer`](WorkSerializer) guarantees that the
//!    deadline handler and the completion handler never run concurrently,
//!    so every operation resolves to exactly one of *completed*, *failed*
//!    or *aborted*, regardless of how many worker threads are draining the
//!    [`Context`](Context).
//! 2. Framed transport: on streams, every message travels as a 4-byte
//!    big-endian length header followed by the payload
//!    ([`Frame`](Frame)); on datagrams the datagram boundary is the
//!    message boundary. The [`message`](message) module plugs a user codec
//!    ([`Message`](Message)) on top of both.
//! 3. Coordination: [`Waiter`](Waiter)/[`Waitable`](Waitable) block a
//!    thread on a boolean expression of completion flags,
//!    [`Busyable`](Busyable) prevents overlapping use of one connection,
//!    and [`QueuedExecutor`](QueuedExecutor) turns overlapping calls into
//!    a strictly ordered sequence.
//!
//! [`ServiceClient`](ServiceClient) and [`ServiceServer`](ServiceServer)
//! compose all of the above into a one-frame-per-direction RPC shape: the
//! client connects, sends the encoded request, receives the response, and
//! closes the connection on every exit path.
//!
//! # Usage
//!
//! Create a [`Context`](Context) and spawn workers for it, then hand it to
//! whichever pieces you need. Synchronous operations (`call`, `send`,
//! `receive`) block the calling thread until their internal asynchronous
//! chain completes and therefore need a free worker; asynchronous
//! operations return immediately and deliver their outcome to a handler,
//! exactly once.
//!
//! # Examples
//!
//! Runnable demo programs can be found in the `demos` sub-directory: a
//! framed echo server and a matching client.

mod busyable;
mod client;
pub mod closeable;
mod context;
pub mod datagram;
mod error;
mod executor;
mod frame;
mod listener;
pub mod message;
mod poller;
mod serializer;
mod server;
pub mod stream;
mod timer;
mod utilities;
mod wait;

pub use busyable::{Busyable, BusyLock};
pub use client::ServiceClient;
pub use closeable::{Closeable, Closer};
pub use context::Context;
pub use datagram::UdpSocket;
pub use error::NetError;
pub use executor::{Completion, QueuedExecutor};
pub use frame::{Frame, HEADER_SIZE};
pub use listener::TcpListenerSocket;
pub use message::{CodecError, Message, Service, DEFAULT_MAX_MESSAGE_SIZE};
pub use serializer::WorkSerializer;
pub use server::ServiceServer;
pub use stream::TcpSocket;
pub use timer::Timer;
pub use wait::{WaitExpr, Waitable, Waiter};
