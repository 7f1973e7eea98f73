//! Error types shared between the relay server and client.
//!
//! The `RelayError` enum unifies common failure cases for I/O, serialization,
//! WebSocket transport, channel communication and internal logic, allowing crates
//! to propagate a single error type.
use std::io;

use thiserror::Error;

/// Unified error type shared by server and client.
#[derive(Error, Debug)]
pub enum RelayError {
    /// I/O error originating from the standard library or sockets.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic formatting/validation error with a human-readable message.
    #[error("Format error: {0}")]
    Format(String),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// WebSocket protocol or transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// The WebSocket opening handshake with a peer did not complete.
    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    /// An extraction pattern failed to compile.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Crossbeam/channel send failed (e.g., receiver dropped); contains a short context string.
    #[error("Channel send failed: {0}")]
    ChannelSend(String),

    /// Crossbeam/channel receive failed (e.g., sender closed); contains a short context string.
    #[error("Channel receive failed: {0}")]
    ChannelRecv(String),

    /// Publishing was attempted after the distribution bus was closed.
    #[error("Distribution bus is closed")]
    BusClosed,
}
