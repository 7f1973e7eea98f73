//! Command-line arguments for the relay client.
//!
//! This module defines the CLI interface using `clap`. See `main` for end-to-end usage.
use clap::Parser;
use relay_common::net::{DEFAULT_PORT, ws_url};

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// WebSocket URL of the relay server.
    #[clap(long, default_value_t = ws_url("127.0.0.1", DEFAULT_PORT))]
    pub url: String,

    /// Log every frame as received instead of decoding it as a command.
    #[clap(long)]
    pub raw: bool,
}
