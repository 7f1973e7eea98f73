//! Command-line arguments for the relay server.
//!
//! This module defines the CLI interface using `clap`. See `main` for end-to-end usage.
use clap::Parser;
use clap::builder::TypedValueParser;
use relay_common::net::{DEFAULT_HOST, DEFAULT_PORT, addr};
use relay_server::bus::DEFAULT_CHANNEL_CAPACITY;
use relay_server::{ParserConfig, ServerConfig, SlowSubscriberPolicy};

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Interface to accept subscriber connections on.
    #[clap(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to accept subscriber connections on.
    #[clap(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// JSON-lines feed to ingest (`-` for stdin, which disables the console).
    #[clap(long)]
    pub feed: Option<String>,

    /// Maximum number of frames queued per subscriber.
    #[clap(long, default_value_t = DEFAULT_CHANNEL_CAPACITY,
        value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize))]
    pub channel_capacity: usize,

    /// What to do with a subscriber whose queue is full.
    #[clap(long, value_enum, default_value_t = SlowSubscriberPolicy::DropOldest)]
    pub slow_policy: SlowSubscriberPolicy,

    /// Reject tips without an Over/Under direction instead of sending an empty bet.
    #[clap(long)]
    pub require_direction: bool,
}

impl Args {
    /// Listener and queue settings.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: addr(self.host.trim(), self.port),
            channel_capacity: self.channel_capacity,
            slow_policy: self.slow_policy,
        }
    }

    /// Extraction rule switches.
    pub fn parser_config(&self) -> ParserConfig {
        ParserConfig {
            require_direction: self.require_direction,
        }
    }

    /// `true` when the feed is read from stdin.
    pub fn feed_on_stdin(&self) -> bool {
        self.feed.as_deref() == Some("-")
    }
}
