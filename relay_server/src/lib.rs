//! Tip relay server library.
//!
//! Converts sentinel-prefixed tip messages from an upstream feed into JSON
//! `PlaceBet` commands and broadcasts them to every connected WebSocket subscriber:
//!
//! - `parser`: `FeedParser`, pattern extraction with typed failures.
//! - `bus`: `Bus`, fan-out to one bounded queue per subscriber.
//! - `session`: `SubscriberSession`, duplex loops over one WebSocket.
//! - `server`: `Server`/`ServerHandle`, accept loop and orderly shutdown.
//! - `feed`: `FeedHandler` and the JSON-lines feed adapter.
//! - `console`: operator line injection and the `quit` directive.
//! - `model`: raw feed events and the session registry.

pub mod bus;
pub mod console;
pub mod feed;
pub mod model;
pub mod parser;
pub mod server;
pub mod session;

pub use bus::{Bus, Frame, SlowSubscriberPolicy, Subscription};
pub use feed::{FeedHandler, IngestOutcome};
pub use parser::{FeedParser, ParseError, ParserConfig};
pub use server::{Server, ServerConfig, ServerHandle};
