//! Feed ingestion: raw events in, serialized commands onto the bus.
//!
//! `FeedHandler::on_event` is the only contract the upstream source needs. The
//! bundled adapter `run_json_lines` reads one JSON-encoded [`RawEvent`] per line from
//! any `BufRead` (a file, a FIFO or stdin). Reaching the end of the input ends the
//! ingestion path and nothing else.

use std::io::BufRead;

use log::{debug, error, info, warn};
use relay_common::Result;
use uuid::Uuid;

use crate::bus::Bus;
use crate::model::raw_event::RawEvent;
use crate::parser::{FeedParser, ParseError};

/// What happened to a single feed event.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Not a tip message.
    Ignored,
    /// Parsed and queued for `subscribers` subscribers.
    Published {
        /// Id of the emitted command.
        id: Uuid,
        /// Subscribers the frame was queued for.
        subscribers: usize,
    },
    /// Tip message that could not be turned into a command.
    Rejected(ParseError),
    /// Parsed, but serialization or the bus failed.
    Failed(String),
}

/// Parses feed events and publishes the resulting commands.
pub struct FeedHandler {
    parser: FeedParser,
    bus: Bus,
}

impl FeedHandler {
    /// Publish everything `parser` accepts to `bus`.
    pub fn new(parser: FeedParser, bus: Bus) -> Self {
        Self { parser, bus }
    }

    /// Handle one event. Never fails: every problem is logged and reported in the
    /// returned outcome.
    pub fn on_event(&self, event: &RawEvent) -> IngestOutcome {
        let command = match self.parser.parse(&event.text) {
            Ok(Some(command)) => command,
            Ok(None) => {
                debug!("Feed event {} ignored", event.id);
                return IngestOutcome::Ignored;
            }
            Err(e) => {
                warn!("Feed event {} rejected: {}", event.id, e);
                return IngestOutcome::Rejected(e);
            }
        };
        info!("Processing feed event {}", event.id);

        let frame = match command.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode command for event {}: {}", event.id, e);
                return IngestOutcome::Failed(e.to_string());
            }
        };
        debug!("Command: {}", frame);

        match self.bus.publish(frame) {
            Ok(subscribers) => {
                info!(
                    "Command {} from event {} queued for {} subscriber(s)",
                    command.id(),
                    event.id,
                    subscribers
                );
                IngestOutcome::Published {
                    id: command.id(),
                    subscribers,
                }
            }
            Err(e) => {
                error!("Failed to publish command {}: {}", command.id(), e);
                IngestOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Read JSON-lines events from `reader` until end of input.
///
/// Malformed lines are logged and skipped; a read error ends ingestion with `Err`.
pub fn run_json_lines<R: BufRead>(reader: R, handler: &FeedHandler) -> Result<()> {
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawEvent>(trimmed) {
            Ok(event) => {
                handler.on_event(&event);
            }
            Err(e) => warn!("Skipping malformed feed line: {}", e),
        }
    }
    info!("Feed disconnected: end of input");
    Ok(())
}
