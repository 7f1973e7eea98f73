//! Wager direction shared between the parser, the wire model and the client.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Side of a totals line.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    Hash,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
)]
pub enum Direction {
    /// More than the threshold.
    Over,
    /// Fewer than the threshold.
    Under,
}
