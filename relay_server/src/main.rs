//! Tip relay server.
//!
//! This binary turns tip messages from an upstream feed into `PlaceBet` commands
//! and streams them to every connected WebSocket subscriber. Internally, it wires
//! together four building blocks:
//!
//! - `FeedHandler`: parses each raw feed event with `FeedParser` and publishes the
//!   JSON-encoded command to the bus. Runs on its own thread and stops when the
//!   feed input ends, without affecting subscribers.
//! - `Bus`: fans every published frame out to one bounded queue per subscriber.
//! - `Server`: accepts WebSocket connections and runs one `SubscriberSession`
//!   (inbound and outbound loops) per subscriber.
//! - Console: every stdin line is broadcast verbatim; `quit` exits the process.
//!
//! Concurrency and shutdown:
//! - Ctrl+C requests an orderly shutdown through the `ServerHandle`: the accept loop
//!   stops, sessions are signalled and the bus is closed.
//! - `quit` on the console exits immediately with `QUIT_EXIT_CODE`.
//! - Errors inside a session only end that session.
//!
//! Usage example:
//! ```bash
//! relay_server --port 5999 --feed ./tips.jsonl
//! ```
#![warn(missing_docs)]
mod args;

use crate::args::Args;
use clap::Parser;
use log::{error, info, warn};
use relay_common::net::QUIT_EXIT_CODE;
use relay_common::{RelayError, Result};
use relay_server::console::{self, ConsoleExit};
use relay_server::feed::{FeedHandler, run_json_lines};
use relay_server::{Bus, FeedParser, Server};
use std::fs::File;
use std::io::{self, BufReader};
use std::process;
use std::thread;

fn main() -> Result<(), RelayError> {
    init_logger();
    let args = Args::parse();

    let server = Server::bind(&args.server_config())?;
    let handle = server.handle();
    {
        let handle = handle.clone();
        ctrlc::set_handler(move || {
            info!("Ctrl+C received. Shutting down server...");
            handle.shutdown();
        })
        .map_err(|e| RelayError::Format(format!("Error setting Ctrl+C handler: {}", e)))?;
    }

    let feed_handler = FeedHandler::new(FeedParser::new(args.parser_config())?, handle.bus().clone());
    match args.feed.clone() {
        Some(path) => start_feed(path, feed_handler)?,
        None => warn!("No --feed given; only console lines will be broadcast"),
    }

    if !args.feed_on_stdin() {
        start_console(handle.bus().clone())?;
    }

    let accept = thread::Builder::new()
        .name("accept".to_string())
        .spawn(move || server.run())?;
    match accept.join() {
        Ok(result) => result,
        Err(_) => Err(RelayError::Format("accept loop panicked".to_string())),
    }
}

/// Spawn the ingestion thread reading JSON-lines events from `path` (`-` is stdin).
fn start_feed(path: String, handler: FeedHandler) -> Result<()> {
    thread::Builder::new()
        .name("feed".to_string())
        .spawn(move || {
            let result = if path == "-" {
                info!("Reading feed from stdin");
                run_json_lines(io::stdin().lock(), &handler)
            } else {
                match File::open(&path) {
                    Ok(file) => {
                        info!("Reading feed from {}", path);
                        run_json_lines(BufReader::new(file), &handler)
                    }
                    Err(e) => Err(e.into()),
                }
            };
            if let Err(e) = result {
                error!("Feed ingestion stopped: {}", e);
            }
        })?;
    Ok(())
}

/// Spawn the console thread; `quit` exits the whole process.
fn start_console(bus: Bus) -> Result<()> {
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || match console::run(io::stdin().lock(), &bus) {
            Ok(ConsoleExit::Quit) => process::exit(QUIT_EXIT_CODE),
            Ok(ConsoleExit::EndOfInput) => info!("Console input closed"),
            Err(e) => error!("Console stopped: {}", e),
        })?;
    Ok(())
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
