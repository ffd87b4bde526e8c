/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::mpsc;
use std::time::Duration;

use netio_rs::{Context, Service, ServiceServer, DEFAULT_MAX_MESSAGE_SIZE};

use log::{error, info, warn};

const PORT_NUMBER: u16 = 5000;
const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

struct EchoService;

impl Service for EchoService {
    type Request = String;
    type Response = String;
}

fn main() {
    /* Initialize the log output */
    env_logger::init_from_env(env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"));

    /* Print logo */
    info!("netio - Example Echo Server [Version {}]", PKG_VERSION);

    /* Initialize the dispatcher and its workers */
    /* A session occupies one worker and runs its timed stages on another,
     * so the pool must never shrink below two. */
    let context = Context::new().expect("Failed to create context!");
    let workers = context
        .spawn_workers(Context::default_worker_count().max(2))
        .expect("Failed to spawn worker threads!");

    /* Bind the server to the local socket */
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), PORT_NUMBER);
    let server = match ServiceServer::<EchoService>::bind(&context, addr, DEFAULT_MAX_MESSAGE_SIZE, Duration::from_secs(15)) {
        Ok(server) => server,
        Err(error) => return error!("Failed to bind server: {:?}", error),
    };

    /* Register the Ctrl+C handler */
    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        warn!("Shutdown has been requested!");
        let _ = shutdown_tx.send(());
    })
    .expect("Failed to register CTRL+C handler!");

    /* Serve echo requests until shutdown */
    info!("Waiting for incoming calls on port {}...", PORT_NUMBER);
    let accept = server
        .start(|request| {
            info!("Request: {:?}", request);
            request
        })
        .expect("Failed to start the accept loop!");

    /* Wait for the shutdown signal */
    shutdown_rx.recv().expect("Failed to await the shutdown signal!");

    /* Tear everything down */
    server.stop();
    accept.join().expect("Failed to join with the accept thread!");
    context.stop();
    workers.into_iter().for_each(|worker| worker.join().expect("Failed to join with worker thread!"));

    /* Bye! */
    info!("That's it, goodbye!");
}
