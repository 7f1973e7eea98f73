//! Relay Client: a WebSocket subscriber that connects to the relay server and logs
//! every broadcast `PlaceBet` command. Frames that are not commands (for example
//! lines typed on the server console) are logged as plain text.
//!
//! Usage example (CLI):
//! ```bash
//! relay_client --url ws://192.168.0.10:5999
//! ```
#![warn(missing_docs)]
mod args;

use crate::args::Args;
use clap::Parser;
use log::{debug, error, info};
use relay_common::command::PlaceBet;
use relay_common::{Command, RelayError, Result};
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

/// How long a blocking read may wait before the shutdown flag is checked again.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

type Connection = WebSocket<MaybeTlsStream<TcpStream>>;

/// One-line summary of a wager for the log.
fn describe(place: &PlaceBet) -> String {
    let bet = match place.bet.line() {
        Some(line) => format!("{} {}", line.direction, line.threshold),
        None => "no line".to_string(),
    };
    format!(
        "{} | {} @ {:.2} stake={} | {}",
        place.id,
        bet,
        place.odds.base,
        place.stake,
        place.url()
    )
}

/// Runs a blocking loop that receives frames from the server and logs them.
/// Returns when the server closes the connection or `shutdown` is set.
fn start_receiver_loop(conn: &mut Connection, raw: bool, shutdown: Arc<AtomicBool>) -> Result<()> {
    while !shutdown.load(Ordering::Relaxed) {
        match conn.read() {
            Ok(Message::Text(text)) => {
                if raw {
                    info!("FRAME: {}", text);
                    continue;
                }
                match Command::from_json(&text) {
                    Ok(Command::PlaceBet(place)) => info!("PLACE BET: {}", describe(&place)),
                    Err(_) => info!("MESSAGE: {}", text),
                }
            }
            Ok(Message::Close(frame)) => {
                info!("Server closed the connection: {:?}", frame);
                return Ok(());
            }
            Ok(other) => debug!("Ignoring frame: {:?}", other),
            Err(tungstenite::Error::Io(e))
                if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(tungstenite::Error::ConnectionClosed) => return Ok(()),
            Err(e) => {
                error!("Receive data error: {}", e);
                return Err(e.into());
            }
        }
    }
    info!("Receiver loop stopping...");
    let _ = conn.close(None);
    let _ = conn.flush();
    Ok(())
}

fn main() -> Result<(), RelayError> {
    init_logger();
    let args = Args::parse();
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("Ctrl+C received. Shutting down client...");
            shutdown.store(true, Ordering::SeqCst);
        })
        .map_err(|e| RelayError::Format(format!("Error setting Ctrl+C handler: {}", e)))?;
    }

    let url = args.url.trim().replace('"', "");
    info!("Connecting to relay server at {}", url);
    let (mut conn, _response) = tungstenite::connect(url.as_str())?;
    if let MaybeTlsStream::Plain(stream) = conn.get_ref() {
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
    }

    info!("Client is running. Press Ctrl+C to exit.");
    start_receiver_loop(&mut conn, args.raw, shutdown)
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
