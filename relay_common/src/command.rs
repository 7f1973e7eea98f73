//! Wire command broadcast to subscribers.
//!
//! A `Command` is serialized as compact JSON with an externally tagged envelope:
//!
//! ```text
//! {"PlaceBet":{"id":"<uuid>","match":{"Url":"https://..."},"tf":"FullTime",
//!  "bet":{"Over":2.5},"odds":{"base":1.85},"stake":0.05}}
//! ```
//!
//! The `bet` object names at most one direction; an empty object means the source
//! event did not state one.
use std::collections::BTreeMap;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::direction::Direction;
use crate::result::Result;

/// Default proportion of the bankroll staked on every command.
pub const DEFAULT_STAKE: f64 = 0.05;

/// Command payload sent from the server to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Instruction to place a single wager.
    PlaceBet(PlaceBet),
}

/// Body of a `PlaceBet` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceBet {
    /// Unique identifier generated when the command was built.
    pub id: Uuid,
    /// Market the wager refers to.
    #[serde(rename = "match")]
    pub target: MatchRef,
    /// Phase of the match the wager settles on.
    pub tf: TimeFrame,
    /// Direction and threshold, possibly empty.
    pub bet: Bet,
    /// Offered price.
    pub odds: Odds,
    /// Proportion of the bankroll to stake.
    pub stake: f64,
}

/// Reference to the market a wager targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchRef {
    /// Direct link to the market page.
    Url(String),
}

/// Settlement period of a wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeFrame {
    /// Regular time including stoppage.
    FullTime,
}

/// Price of a wager.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Odds {
    /// Decimal odds as quoted by the source.
    pub base: f64,
}

/// A single totals line: direction plus threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    /// Side of the line.
    pub direction: Direction,
    /// Goal count the wager is measured against.
    pub threshold: f64,
}

/// Wager body; serialized as `{"Over": n}`, `{"Under": n}` or `{}`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bet {
    line: Option<Line>,
}

impl Bet {
    /// Wager on one side of `threshold`.
    pub fn total(direction: Direction, threshold: f64) -> Self {
        Bet {
            line: Some(Line {
                direction,
                threshold,
            }),
        }
    }

    /// Wager without a stated direction.
    pub fn empty() -> Self {
        Bet { line: None }
    }

    /// Stated line, if any.
    pub fn line(&self) -> Option<Line> {
        self.line
    }

    /// `true` when no direction was stated.
    pub fn is_empty(&self) -> bool {
        self.line.is_none()
    }
}

impl Serialize for Bet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(usize::from(self.line.is_some())))?;
        if let Some(line) = &self.line {
            map.serialize_entry(&line.direction, &line.threshold)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Bet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let entries = BTreeMap::<Direction, f64>::deserialize(deserializer)?;
        let mut iter = entries.into_iter();
        match (iter.next(), iter.next()) {
            (None, _) => Ok(Bet::empty()),
            (Some((direction, threshold)), None) => Ok(Bet::total(direction, threshold)),
            _ => Err(de::Error::custom("bet names more than one direction")),
        }
    }
}

impl PlaceBet {
    /// Build a full-time wager with a fresh id and the default stake.
    pub fn new(url: impl Into<String>, bet: Bet, odds: f64) -> Self {
        PlaceBet {
            id: Uuid::new_v4(),
            target: MatchRef::Url(url.into()),
            tf: TimeFrame::FullTime,
            bet,
            odds: Odds { base: odds },
            stake: DEFAULT_STAKE,
        }
    }

    /// Market URL of the wager.
    pub fn url(&self) -> &str {
        match &self.target {
            MatchRef::Url(url) => url,
        }
    }
}

impl Command {
    /// Identifier of the wrapped instruction.
    pub fn id(&self) -> Uuid {
        match self {
            Command::PlaceBet(place) => place.id,
        }
    }

    /// Encode as the compact JSON text sent in a WebSocket frame.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
