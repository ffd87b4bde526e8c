/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */

//! End-to-end loopback checks for the framed stream and datagram layers.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use netio_rs::closeable::Closeable;
use netio_rs::{
    datagram, message, stream, Closer, Context, NetError, TcpListenerSocket, UdpSocket,
};

const LOCALHOST: &str = "127.0.0.1";

fn start_context(workers: usize) -> (Arc<Context>, Vec<JoinHandle<()>>) {
    let context = Context::new().expect("Failed to create context!");
    let workers = context.spawn_workers(workers).expect("Failed to spawn workers!");
    (context, workers)
}

fn shut_down(context: Arc<Context>, workers: Vec<JoinHandle<()>>) {
    context.stop();
    for worker in workers {
        worker.join().expect("Worker thread panicked!");
    }
}

fn ephemeral(host: &str) -> SocketAddr {
    format!("{}:0", host).parse().expect("Failed to parse address!")
}

// S1: a datagram receiver observes the payload and the sender's endpoint.
#[test]
fn datagram_echo_reports_the_sender() {
    let (context, workers) = start_context(4);

    let receiver = UdpSocket::bind(ephemeral(LOCALHOST)).expect("Failed to bind receiver!");
    let receiver_port = receiver.local_addr().expect("Receiver has no address!").port();
    let sender = UdpSocket::bind(ephemeral(LOCALHOST)).expect("Failed to bind sender!");
    let sender_port = sender.local_addr().expect("Sender has no address!").port();

    let (result_tx, result_rx) = mpsc::channel();
    message::async_receive_datagram::<String, _>(
        &context,
        &receiver,
        512,
        Duration::from_secs(1),
        move |outcome| {
            result_tx.send(outcome).expect("Failed to report the received datagram!");
        },
    );

    message::send_datagram(
        &context,
        &sender,
        &String::from("hello"),
        LOCALHOST,
        receiver_port,
        Duration::from_secs(1),
    )
    .expect("Failed to send the datagram!");

    let (received, host, port) = result_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("Receive handler never fired!")
        .expect("Receive failed!");
    assert_eq!(received, "hello");
    assert_eq!(host, LOCALHOST);
    assert_eq!(port, sender_port);

    shut_down(context, workers);
}

// S2: the framed bytes on the wire are `length (big-endian) || payload`.
#[test]
fn framed_wire_bytes_are_length_prefixed() {
    let (context, workers) = start_context(4);

    let listener = std::net::TcpListener::bind((LOCALHOST, 0)).expect("Failed to bind listener!");
    let port = listener.local_addr().expect("Listener has no address!").port();

    let peer = thread::spawn(move || {
        let (mut connection, _addr) = listener.accept().expect("Failed to accept!");
        let mut wire = [0u8; 8];
        connection.read_exact(&mut wire).expect("Failed to read the frame!");
        assert_eq!(wire, [0x00, 0x00, 0x00, 0x04, 0x70, 0x69, 0x6e, 0x67]);
        // Echo the very same bytes back.
        connection.write_all(&wire).expect("Failed to echo the frame!");
    });

    let socket = stream::connect(&context, LOCALHOST, port, Duration::from_secs(2))
        .expect("Failed to connect!");
    let _closer = Closer::new(socket.clone());

    message::send(&context, &socket, &String::from("ping"), Duration::from_secs(2))
        .expect("Failed to send!");
    let echoed: String = message::receive(&context, &socket, 512, Duration::from_secs(2))
        .expect("Failed to receive!");
    assert_eq!(echoed, "ping");

    peer.join().expect("Peer thread panicked!");
    shut_down(context, workers);
}

// P7: any payload within the limit survives a framed round trip intact.
#[test]
fn framed_round_trip_preserves_payloads() {
    let (context, workers) = start_context(4);

    let listener = TcpListenerSocket::bind(ephemeral(LOCALHOST)).expect("Failed to bind!");
    let port = listener.local_addr().expect("Listener has no address!").port();

    let echo_context = context.clone();
    let echo_listener = listener.clone();
    let peer = thread::spawn(move || {
        let socket = echo_listener.accept().expect("Failed to accept!");
        let _closer = Closer::new(socket.clone());
        for _ in 0..3 {
            let payload = stream::read_frame(&echo_context, &socket, 4096, Duration::from_secs(2))
                .expect("Echo read failed!");
            stream::write_frame(&echo_context, &socket, &payload, Duration::from_secs(2))
                .expect("Echo write failed!");
        }
    });

    let socket = stream::connect(&context, LOCALHOST, port, Duration::from_secs(2))
        .expect("Failed to connect!");
    let _closer = Closer::new(socket.clone());

    let empty: Vec<u8> = Vec::new();
    let binary: Vec<u8> = (0u16..256).map(|value| value as u8).collect();
    let text: Vec<u8> = b"the quick brown fox".to_vec();
    for payload in [&empty, &binary, &text] {
        stream::write_frame(&context, &socket, payload, Duration::from_secs(2))
            .expect("Write failed!");
        let delivered = stream::read_frame(&context, &socket, 4096, Duration::from_secs(2))
            .expect("Read failed!");
        assert_eq!(&delivered, payload);
    }

    peer.join().expect("Peer thread panicked!");
    shut_down(context, workers);
}

// P8 / S3 semantics: when the deadline fires before the operation
// completes, the classification is `Aborted` and the socket is closed.
#[test]
fn deadline_aborts_a_read_on_a_silent_peer() {
    let (context, workers) = start_context(4);

    // Bound but never accepted: the loopback connection is established via
    // the backlog, then stays silent forever.
    let listener = TcpListenerSocket::bind(ephemeral(LOCALHOST)).expect("Failed to bind!");
    let port = listener.local_addr().expect("Listener has no address!").port();

    let socket = stream::connect(&context, LOCALHOST, port, Duration::from_secs(2))
        .expect("Failed to connect!");

    let started = Instant::now();
    let result = stream::read_frame(&context, &socket, 512, Duration::from_millis(100));
    assert!(matches!(result, Err(NetError::Aborted)), "unexpected: {:?}", result);
    assert!(!socket.is_open());
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(started.elapsed() < Duration::from_secs(2));

    shut_down(context, workers);
}

// S4: a frame announcing more than the configured maximum is rejected
// before its payload is read.
#[test]
fn oversized_frame_is_rejected() {
    let (context, workers) = start_context(4);

    let listener = std::net::TcpListener::bind((LOCALHOST, 0)).expect("Failed to bind listener!");
    let port = listener.local_addr().expect("Listener has no address!").port();

    let peer = thread::spawn(move || {
        let (mut connection, _addr) = listener.accept().expect("Failed to accept!");
        let mut wire = Vec::with_capacity(104);
        wire.extend_from_slice(&100u32.to_be_bytes());
        wire.extend_from_slice(&[0x2a; 100]);
        connection.write_all(&wire).expect("Failed to write the oversized frame!");
        // Keep the connection open until the receiver has judged it.
        let mut sink = [0u8; 1];
        let _ = connection.read(&mut sink);
    });

    let socket = stream::connect(&context, LOCALHOST, port, Duration::from_secs(2))
        .expect("Failed to connect!");
    let closer = Closer::new(socket.clone());

    let result = stream::read_frame(&context, &socket, 16, Duration::from_secs(2));
    assert!(matches!(result, Err(NetError::TooBig)), "unexpected: {:?}", result);

    drop(closer);
    assert!(!socket.is_open());

    peer.join().expect("Peer thread panicked!");
    shut_down(context, workers);
}

// A short frame (header announces more than the peer delivers) is invalid.
#[test]
fn truncated_frame_is_invalid() {
    let (context, workers) = start_context(4);

    let listener = std::net::TcpListener::bind((LOCALHOST, 0)).expect("Failed to bind listener!");
    let port = listener.local_addr().expect("Listener has no address!").port();

    let peer = thread::spawn(move || {
        let (mut connection, _addr) = listener.accept().expect("Failed to accept!");
        let mut wire = Vec::with_capacity(7);
        wire.extend_from_slice(&8u32.to_be_bytes());
        wire.extend_from_slice(b"abc");
        connection.write_all(&wire).expect("Failed to write the short frame!");
        // Closing here ends the stream in the middle of the payload.
    });

    let socket = stream::connect(&context, LOCALHOST, port, Duration::from_secs(2))
        .expect("Failed to connect!");
    let _closer = Closer::new(socket.clone());

    let result = stream::read_frame(&context, &socket, 512, Duration::from_secs(2));
    assert!(matches!(result, Err(NetError::InvalidFrame)), "unexpected: {:?}", result);

    peer.join().expect("Peer thread panicked!");
    shut_down(context, workers);
}

struct Unencodable;

impl netio_rs::Message for Unencodable {
    fn encode(&self) -> Result<Vec<u8>, netio_rs::CodecError> {
        Err(netio_rs::CodecError)
    }

    fn decode(_data: &[u8]) -> Result<Self, netio_rs::CodecError> {
        Err(netio_rs::CodecError)
    }
}

// An encode failure is still delivered through the context, asynchronously,
// exactly once.
#[test]
fn encode_failure_is_delivered_asynchronously() {
    let (context, workers) = start_context(2);

    let socket = UdpSocket::bind(ephemeral(LOCALHOST)).expect("Failed to bind sender!");
    let (result_tx, result_rx) = mpsc::channel();
    message::async_send_datagram(
        &context,
        &socket,
        &Unencodable,
        LOCALHOST,
        9,
        Duration::from_secs(1),
        move |outcome| {
            result_tx.send(outcome).expect("Failed to report the outcome!");
        },
    );

    let outcome = result_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("Handler never fired!");
    assert!(matches!(outcome, Err(NetError::Encoding)), "unexpected: {:?}", outcome);
    assert!(
        result_rx.recv_timeout(Duration::from_millis(200)).is_err(),
        "handler fired more than once"
    );

    shut_down(context, workers);
}

// A datagram longer than the receiver's maximum is rejected, not truncated.
#[test]
fn oversized_datagram_is_rejected() {
    let (context, workers) = start_context(4);

    let receiver = UdpSocket::bind(ephemeral(LOCALHOST)).expect("Failed to bind receiver!");
    let receiver_port = receiver.local_addr().expect("Receiver has no address!").port();
    let sender = UdpSocket::bind(ephemeral(LOCALHOST)).expect("Failed to bind sender!");

    let receive_context = context.clone();
    let receiving = receiver.clone();
    let receive = thread::spawn(move || {
        datagram::receive_from(&receive_context, &receiving, 16, Duration::from_secs(2))
    });

    datagram::send_to(
        &context,
        &sender,
        vec![0x2a; 100],
        LOCALHOST,
        receiver_port,
        Duration::from_secs(1),
    )
    .expect("Failed to send the datagram!");

    let result = receive.join().expect("Receiver thread panicked!");
    assert!(matches!(result, Err(NetError::Failed(_))), "unexpected: {:?}", result);

    shut_down(context, workers);
}
