//! Raw feed event as delivered by the upstream message source.
//!
//! Events arrive one per line as JSON objects, e.g.
//! `{"id": 8812, "text": "⚽️ ... Over 2.5 ... Odds: 1.85 ... https://..."}`.

use serde::{Deserialize, Serialize};

/// One unparsed message from the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Message identifier assigned by the upstream source.
    pub id: i64,
    /// Message body.
    pub text: String,
}

impl RawEvent {
    /// Build an event from its id and body.
    pub fn new(id: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}
