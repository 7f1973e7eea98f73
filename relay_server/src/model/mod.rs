//! Domain models used by the relay server.
//!
//! - `raw_event`: unparsed message as delivered by the feed.
//! - `session_registry`: in-memory registry of live subscriber sessions.

pub mod raw_event;
pub mod session_registry;
