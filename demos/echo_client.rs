/*
 * netio - request/response networking with timeout/cancellation support
 * This is free and unencumbered software released into the public domain.
 */
use std::time::Duration;

use netio_rs::{Context, NetError, Service, ServiceClient};

use log::{error, info};

const REMOTE_HOST: &str = "127.0.0.1";
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
    info!("netio - Example Echo Client [Version {}]", PKG_VERSION);

    /* Initialize the dispatcher and its workers */
    let context = Context::new().expect("Failed to create context!");
    let workers = context
        .spawn_workers(Context::default_worker_count())
        .expect("Failed to spawn worker threads!");

    /* Call the echo service */
    let client = ServiceClient::<EchoService>::new(&context);
    for argument in std::env::args().skip(1) {
        info!("Calling {}:{} with {:?}...", REMOTE_HOST, PORT_NUMBER, argument);
        match client.call(&argument, REMOTE_HOST, PORT_NUMBER, Duration::from_secs(10)) {
            Ok(response) => info!("Response: {:?}", response),
            Err(NetError::Aborted) => error!("Call aborted, the deadline has expired!"),
            Err(error) => error!("Call failed: {:?}", error),
        }
    }

    /* Tear everything down */
    context.stop();
    workers.into_iter().for_each(|worker| worker.join().expect("Failed to join with worker thread!"));

    /* Bye! */
    info!("That's it, goodbye!");
}
