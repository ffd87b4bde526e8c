/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */
use std::io::Result as IoResult;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};

use crate::closeable::{Closeable, Closer};
use crate::listener::TcpListenerSocket;
use crate::message::{self, Service};
use crate::stream::TcpSocket;
use crate::{Context, NetError};

/// A request/response server for a [`Service`](crate::Service), symmetric to
/// [`ServiceClient`](crate::ServiceClient)
///
/// [`start()`](ServiceServer::start) runs the accept loop on a dedicated
/// thread and posts every accepted connection to the context's workers. A
/// session performs one exchange (timed receive, decode, user handler,
/// encode, timed send) and always closes the connection, also on failures.
/// [`stop()`](ServiceServer::stop) closes the listener, which aborts the
/// pending accept and ends the loop.
pub struct ServiceServer<S: Service + 'static> {
    context: Arc<Context>,
    listener: Arc<TcpListenerSocket>,
    max_message_size: usize,
    timeout: Duration,
    _service: PhantomData<fn(S)>,
}

impl<S: Service + 'static> ServiceServer<S> {
    /// Binds a server to `addr`. `max_message_size` caps accepted request
    /// frames; `timeout` bounds each receive and send stage of a session.
    pub fn bind(
        context: &Arc<Context>,
        addr: SocketAddr,
        max_message_size: usize,
        timeout: Duration,
    ) -> Result<Arc<Self>, NetError> {
        let listener = TcpListenerSocket::bind(addr)?;
        Ok(Arc::new(Self {
            context: context.clone(),
            listener,
            max_message_size,
            timeout,
            _service: PhantomData,
        }))
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    /// Starts accepting connections; `handler` produces the response for
    /// every decoded request. The returned handle becomes joinable after
    /// [`stop()`](ServiceServer::stop).
    pub fn start<H>(self: &Arc<Self>, handler: H) -> IoResult<JoinHandle<()>>
    where
        H: Fn(S::Request) -> S::Response + Send + Sync + 'static,
    {
        let server = self.clone();
        let handler = Arc::new(handler);
        thread::Builder::new()
            .name("netio-accept".into())
            .spawn(move || server.accept_loop(handler))
    }

    /// Closes the listener and thereby ends the accept loop. Sessions
    /// already in flight run to completion.
    pub fn stop(&self) {
        self.listener.close();
    }

    fn accept_loop<H>(&self, handler: Arc<H>)
    where
        H: Fn(S::Request) -> S::Response + Send + Sync + 'static,
    {
        loop {
            match self.listener.accept() {
                Ok(socket) => {
                    let context = self.context.clone();
                    let max_message_size = self.max_message_size;
                    let timeout = self.timeout;
                    let handler = handler.clone();
                    self.context.post(move || {
                        serve_connection::<S, H>(context, socket, max_message_size, timeout, handler);
                    });
                },
                Err(NetError::Aborted) => break,
                Err(error) => {
                    warn!("Accept failed: {:?}", error);
                    break;
                },
            }
        }
    }
}

fn serve_connection<S, H>(
    context: Arc<Context>,
    socket: Arc<TcpSocket>,
    max_message_size: usize,
    timeout: Duration,
    handler: Arc<H>,
) where
    S: Service,
    H: Fn(S::Request) -> S::Response + Send + Sync + 'static,
{
    let peer = socket.peer_addr();
    let _closer = Closer::new(socket.clone());

    let request = match message::receive::<S::Request>(&context, &socket, max_message_size, timeout) {
        Ok(request) => request,
        Err(error) => {
            debug!("Session with {:?} failed to receive a request: {:?}", peer, error);
            return;
        },
    };

    let response = handler(request);

    if let Err(error) = message::send(&context, &socket, &response, timeout) {
        debug!("Session with {:?} failed to send the response: {:?}", peer, error);
    }
}
