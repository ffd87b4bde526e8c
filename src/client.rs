/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::busyable::{Busyable, BusyLock};
use crate::closeable::{Closeable, Closer};
use crate::executor::{Completion, QueuedExecutor};
use crate::message::{self, Service, DEFAULT_MAX_MESSAGE_SIZE};
use crate::stream::{self, TcpSocket};
use crate::utilities::{lock, TimeBudget};
use crate::{Context, NetError};

/// A request/response client for a [`Service`](crate::Service)
///
/// Each call opens a fresh connection, sends the encoded request as one
/// frame, receives one response frame and closes the connection again on
/// *every* exit path, including deadline and error paths. The three stages
/// (connect, send, receive) share the call's total timeout: time spent in an
/// earlier stage shrinks the budget of the later ones.
///
/// A client drives at most one connection at a time.
/// [`call()`](ServiceClient::call) fails with [`NetError::Busy`] while
/// another call is in flight; [`async_call()`](ServiceClient::async_call)
/// instead queues the new call and runs it once the current one finished.
pub struct ServiceClient<S: Service + 'static> {
    context: Arc<Context>,
    max_message_size: usize,
    busyable: Busyable,
    executor: QueuedExecutor,
    active: Mutex<Option<Arc<TcpSocket>>>,
    _service: PhantomData<fn(S)>,
}

impl<S: Service + 'static> ServiceClient<S> {
    pub fn new(context: &Arc<Context>) -> Arc<Self> {
        Self::with_max_message_size(context, DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(context: &Arc<Context>, max_message_size: usize) -> Arc<Self> {
        Arc::new(Self {
            context: context.clone(),
            max_message_size,
            busyable: Busyable::new(),
            executor: QueuedExecutor::new(),
            active: Mutex::new(None),
            _service: PhantomData,
        })
    }

    /// Performs one synchronous request/response exchange. Blocks the
    /// calling thread for at most `timeout` (plus dispatch latency).
    pub fn call(
        &self,
        request: &S::Request,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<S::Response, NetError> {
        let _busy = self.busyable.try_lock()?;

        let budget = TimeBudget::start(timeout);
        let socket = stream::connect(&self.context, host, port, budget.remaining())?;
        let _closer = Closer::new(socket.clone());
        *lock(&self.active) = Some(socket.clone());

        let result = self.exchange(&socket, request, &budget);
        lock(&self.active).take();
        result
    }

    fn exchange(
        &self,
        socket: &Arc<TcpSocket>,
        request: &S::Request,
        budget: &TimeBudget,
    ) -> Result<S::Response, NetError> {
        if budget.expired() {
            return Err(NetError::TimedOut);
        }
        message::send(&self.context, socket, request, budget.remaining())?;
        if budget.expired() {
            return Err(NetError::TimedOut);
        }
        message::receive(&self.context, socket, self.max_message_size, budget.remaining())
    }

    /// Queues one asynchronous request/response exchange. Returns
    /// immediately; `handler` runs on a worker exactly once with the
    /// response or the classified error. Overlapping `async_call`s execute
    /// sequentially in submission order.
    pub fn async_call<H>(
        self: &Arc<Self>,
        request: S::Request,
        host: &str,
        port: u16,
        timeout: Duration,
        handler: H,
    ) where
        H: FnOnce(Result<S::Response, NetError>) + Send + 'static,
    {
        let client = self.clone();
        let host = host.to_string();
        self.executor.execute(move |completion| {
            client.start_session(request, host, port, timeout, handler, completion);
        });
    }

    /// Aborts the call in flight (its handler fires with
    /// [`NetError::Aborted`]) and drops all queued calls.
    pub fn stop(&self) {
        if let Some(socket) = lock(&self.active).take() {
            socket.close();
        }
        self.executor.clear();
    }

    fn start_session<H>(
        self: Arc<Self>,
        request: S::Request,
        host: String,
        port: u16,
        timeout: Duration,
        handler: H,
        completion: Completion,
    ) where
        H: FnOnce(Result<S::Response, NetError>) + Send + 'static,
    {
        let busy = match self.busyable.try_lock() {
            Ok(busy) => busy,
            Err(error) => {
                // A synchronous call holds the connection; the completion
                // token is dropped and the queue moves on.
                self.context.post_or_run(move || handler(Err(error)));
                return;
            },
        };

        let session = Arc::new(Session {
            client: self.clone(),
            busy: Mutex::new(Some(busy)),
            socket: Mutex::new(None),
            handler: Mutex::new(Some(handler)),
            budget: TimeBudget::start(timeout),
            completion: Mutex::new(Some(completion)),
        });

        let connected = session.clone();
        stream::async_connect(&self.context, &host, port, timeout, move |outcome| {
            let socket = match outcome {
                Ok(socket) => socket,
                Err(error) => return connected.finish(Err(error)),
            };
            connected.attach_socket(&socket);
            if connected.budget.expired() {
                return connected.finish(Err(NetError::TimedOut));
            }

            let session = connected;
            let sent = session.clone();
            let context = session.client.context.clone();
            let remaining = session.budget.remaining();
            message::async_send(&context, &socket, &request, remaining, move |outcome| {
                if let Err(error) = outcome {
                    return sent.finish(Err(error));
                }
                if sent.budget.expired() {
                    return sent.finish(Err(NetError::TimedOut));
                }

                let session = sent;
                let received = session.clone();
                let context = session.client.context.clone();
                let max_message_size = session.client.max_message_size;
                let remaining = session.budget.remaining();
                let socket = match lock(&session.socket).clone() {
                    Some(socket) => socket,
                    None => return session.finish(Err(NetError::Aborted)),
                };
                message::async_receive(&context, &socket, max_message_size, remaining, move |outcome| {
                    received.finish(outcome);
                });
            });
        });
    }
}

impl<S: Service + 'static> Drop for ServiceClient<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State of one in-flight asynchronous call, shared by its continuations.
/// The terminal continuation takes the handler, closes the socket and
/// resolves the executor completion, in that order.
struct Session<S: Service + 'static, H> {
    client: Arc<ServiceClient<S>>,
    busy: Mutex<Option<BusyLock>>,
    socket: Mutex<Option<Arc<TcpSocket>>>,
    handler: Mutex<Option<H>>,
    budget: TimeBudget,
    completion: Mutex<Option<Completion>>,
}

impl<S: Service + 'static, H> Session<S, H>
where
    H: FnOnce(Result<S::Response, NetError>) + Send + 'static,
{
    fn attach_socket(&self, socket: &Arc<TcpSocket>) {
        *lock(&self.socket) = Some(socket.clone());
        *lock(&self.client.active) = Some(socket.clone());
    }

    fn finish(&self, outcome: Result<S::Response, NetError>) {
        if let Some(handler) = lock(&self.handler).take() {
            handler(outcome);
        }
        self.release();
    }

    fn release(&self) {
        if let Some(socket) = lock(&self.socket).take() {
            socket.close();
        }
        lock(&self.client.active).take();
        // The busy lock must fall before the completion resolves, or the
        // next queued call would observe the connection as still held.
        lock(&self.busy).take();
        lock(&self.completion).take();
    }
}

impl<S: Service + 'static, H> Drop for Session<S, H> {
    fn drop(&mut self) {
        if let Some(socket) = lock(&self.socket).take() {
            socket.close();
        }
    }
}
