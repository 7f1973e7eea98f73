//!
//! Common types and utilities shared by the relay server and client.
//!
//! This crate aggregates:
//! - `error`: unified error type `RelayError` used across the workspace.
//! - `result`: handy `Result<T, RelayError>` alias.
//! - `direction`: over/under wager direction.
//! - `command`: JSON command payloads broadcast to subscribers.
//! - `net`: networking constants and small helpers.
#![warn(missing_docs)]
pub mod command;
pub mod direction;
pub mod error;
pub mod net;
pub mod result;

pub use command::Command;
pub use direction::Direction;
pub use error::RelayError;
pub use result::Result;
