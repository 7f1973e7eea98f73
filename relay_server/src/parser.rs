//! Turns loosely formatted tip messages into `PlaceBet` commands.
//!
//! Only messages that start with the football sentinel are considered. Four patterns
//! are applied independently to the full text, each taking the first capture of its
//! first match:
//!
//! - URL: the first `https://` token up to whitespace.
//! - Direction: the first literal `Over` or `Under`.
//! - Threshold: the number after a direction keyword and one whitespace character.
//! - Odds: the number after the `Odds:` label.
//!
//! A missing direction still yields a command with an empty wager body unless the
//! parser is configured to require one. Missing or malformed numbers are reported
//! as [`ParseError`] instead of producing a half-built command.

use regex::Regex;
use relay_common::command::{Bet, PlaceBet};
use relay_common::{Command, Direction, Result};
use strum_macros::Display;
use thiserror::Error;

/// Prefix every actionable message starts with ("⚽️").
pub const SENTINEL: &str = "\u{26BD}\u{FE0F}";

const URL_PATTERN: &str = r"(https://[^\s]+)";
const DIRECTION_PATTERN: &str = r"(Over|Under)";
const THRESHOLD_PATTERN: &str = r"(?:Over|Under)\s(\d+(?:\.\d+)?)";
const THRESHOLD_TOKEN_PATTERN: &str = r"(?:Over|Under)\s(\S+)";
const ODDS_PATTERN: &str = r"Odds: (\d+(?:\.\d+)?)";
const ODDS_TOKEN_PATTERN: &str = r"Odds:[ \t]*(\S*)";

/// Numeric field a parse failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum NumericField {
    /// Goal line after `Over`/`Under`.
    #[strum(serialize = "threshold")]
    Threshold,
    /// Decimal odds after `Odds:`.
    #[strum(serialize = "odds")]
    Odds,
}

/// Reasons a sentinel-prefixed message could not become a command.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// No `https://` link anywhere in the text.
    #[error("no https:// link in message")]
    MissingUrl,

    /// No direction keyword, and the parser requires one.
    #[error("no Over/Under direction in message")]
    MissingDirection,

    /// Direction keyword with nothing after it.
    #[error("{0} stated without a threshold")]
    MissingThreshold(Direction),

    /// No `Odds:` label, or a label with no value.
    #[error("no odds in message")]
    MissingOdds,

    /// A number that is not separated from `Odds:` by exactly one space.
    #[error("odds {0} must follow \"Odds: \" with a single space")]
    MisplacedOdds(String),

    /// Keyword or label followed by something that is not a finite number.
    #[error("{field} is not a valid number: {value:?}")]
    InvalidNumber {
        /// Field being read.
        field: NumericField,
        /// Offending token.
        value: String,
    },
}

/// Parser behaviour switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParserConfig {
    /// Reject messages without an Over/Under direction instead of emitting an empty bet.
    pub require_direction: bool,
}

/// Compiled extraction rules.
pub struct FeedParser {
    config: ParserConfig,
    url: Regex,
    direction: Regex,
    threshold: Regex,
    threshold_token: Regex,
    odds: Regex,
    odds_token: Regex,
}

impl FeedParser {
    /// Compile the extraction patterns.
    pub fn new(config: ParserConfig) -> Result<Self> {
        Ok(Self {
            config,
            url: Regex::new(URL_PATTERN)?,
            direction: Regex::new(DIRECTION_PATTERN)?,
            threshold: Regex::new(THRESHOLD_PATTERN)?,
            threshold_token: Regex::new(THRESHOLD_TOKEN_PATTERN)?,
            odds: Regex::new(ODDS_PATTERN)?,
            odds_token: Regex::new(ODDS_TOKEN_PATTERN)?,
        })
    }

    /// Parse one raw message.
    ///
    /// Returns `Ok(None)` for messages without the sentinel prefix.
    pub fn parse(&self, text: &str) -> std::result::Result<Option<Command>, ParseError> {
        if !text.starts_with(SENTINEL) {
            return Ok(None);
        }

        let url = first_capture(&self.url, text).ok_or(ParseError::MissingUrl)?;

        let bet = match first_capture(&self.direction, text) {
            Some(keyword) => {
                // The pattern only admits the two keywords.
                let direction = keyword
                    .parse::<Direction>()
                    .map_err(|_| ParseError::MissingDirection)?;
                let threshold = self.threshold(text, direction)?;
                Bet::total(direction, threshold)
            }
            None if self.config.require_direction => return Err(ParseError::MissingDirection),
            None => Bet::empty(),
        };

        let odds = self.odds(text)?;

        Ok(Some(Command::PlaceBet(PlaceBet::new(url, bet, odds))))
    }

    fn threshold(&self, text: &str, direction: Direction) -> std::result::Result<f64, ParseError> {
        match first_capture(&self.threshold, text) {
            Some(number) => to_number(NumericField::Threshold, number),
            None => match first_capture(&self.threshold_token, text) {
                Some(token) => Err(invalid(NumericField::Threshold, token)),
                None => Err(ParseError::MissingThreshold(direction)),
            },
        }
    }

    fn odds(&self, text: &str) -> std::result::Result<f64, ParseError> {
        match first_capture(&self.odds, text) {
            Some(number) => to_number(NumericField::Odds, number),
            None => match first_capture(&self.odds_token, text) {
                None | Some("") => Err(ParseError::MissingOdds),
                Some(token) if token.parse::<f64>().is_ok_and(|v| v.is_finite()) => {
                    Err(ParseError::MisplacedOdds(token.to_string()))
                }
                Some(token) => Err(invalid(NumericField::Odds, token)),
            },
        }
    }
}

fn first_capture<'t>(pattern: &Regex, text: &'t str) -> Option<&'t str> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn to_number(field: NumericField, raw: &str) -> std::result::Result<f64, ParseError> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(invalid(field, raw)),
    }
}

fn invalid(field: NumericField, raw: &str) -> ParseError {
    ParseError::InvalidNumber {
        field,
        value: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_common::command::DEFAULT_STAKE;

    const TIP: &str = "⚽️ Premier League\nArsenal v Chelsea\nOver 2.5 goals\nOdds: 1.85\nhttps://x";

    fn parser() -> FeedParser {
        FeedParser::new(ParserConfig::default()).unwrap()
    }

    fn place(cmd: Command) -> PlaceBet {
        match cmd {
            Command::PlaceBet(place) => place,
        }
    }

    #[test]
    fn ignores_messages_without_sentinel() {
        let p = parser();
        assert_eq!(p.parse("Over 2.5 Odds: 1.85 https://x").unwrap(), None);
        assert_eq!(p.parse(" ⚽️ Over 2.5 Odds: 1.85 https://x").unwrap(), None);
        assert_eq!(p.parse("").unwrap(), None);
    }

    #[test]
    fn parses_over_tip() {
        let cmd = place(parser().parse(TIP).unwrap().unwrap());
        assert_eq!(cmd.url(), "https://x");
        assert_eq!(cmd.bet, Bet::total(Direction::Over, 2.5));
        assert_eq!(cmd.odds.base, 1.85);
        assert_eq!(cmd.stake, DEFAULT_STAKE);
    }

    #[test]
    fn parses_under_tip_with_integer_threshold() {
        let text = "⚽️ Under 3 | Odds: 2 | https://book.example/m/42?x=1 more";
        let cmd = place(parser().parse(text).unwrap().unwrap());
        assert_eq!(cmd.bet, Bet::total(Direction::Under, 3.0));
        assert_eq!(cmd.odds.base, 2.0);
        assert_eq!(cmd.url(), "https://book.example/m/42?x=1");
    }

    #[test]
    fn first_url_wins() {
        let text = "⚽️ Over 1.5 Odds: 1.5 https://first.example https://second.example";
        let cmd = place(parser().parse(text).unwrap().unwrap());
        assert_eq!(cmd.url(), "https://first.example");
    }

    #[test]
    fn missing_direction_yields_empty_bet() {
        let text = "⚽️ BTTS Odds: 1.70 https://x";
        let cmd = place(parser().parse(text).unwrap().unwrap());
        assert!(cmd.bet.is_empty());
        assert_eq!(cmd.odds.base, 1.7);
    }

    #[test]
    fn missing_direction_rejected_when_required() {
        let strict = FeedParser::new(ParserConfig {
            require_direction: true,
        })
        .unwrap();
        let text = "⚽️ BTTS Odds: 1.70 https://x";
        assert_eq!(strict.parse(text), Err(ParseError::MissingDirection));
    }

    #[test]
    fn missing_url_is_an_error() {
        let text = "⚽️ Over 2.5 Odds: 1.85 http://insecure.example";
        assert_eq!(parser().parse(text), Err(ParseError::MissingUrl));
    }

    #[test]
    fn missing_or_malformed_odds_are_errors() {
        let p = parser();
        assert_eq!(
            p.parse("⚽️ Over 2.5 https://x"),
            Err(ParseError::MissingOdds)
        );
        assert_eq!(
            p.parse("⚽️ Over 2.5 Odds: evens https://x"),
            Err(ParseError::InvalidNumber {
                field: NumericField::Odds,
                value: "evens".to_string(),
            })
        );
    }

    #[test]
    fn odds_label_spacing_and_empty_value() {
        let p = parser();
        assert_eq!(
            p.parse("⚽️ Over 2.5 Odds:1.85 https://x"),
            Err(ParseError::MisplacedOdds("1.85".to_string()))
        );
        assert_eq!(
            p.parse("⚽️ Over 2.5 Odds:  1.85 https://x"),
            Err(ParseError::MisplacedOdds("1.85".to_string()))
        );
        assert_eq!(
            p.parse("⚽️ Over 2.5 https://x Odds:"),
            Err(ParseError::MissingOdds)
        );
        assert_eq!(
            p.parse("⚽️ Over 2.5 Odds:\nhttps://x"),
            Err(ParseError::MissingOdds)
        );
    }

    #[test]
    fn direction_without_number_is_an_error() {
        let p = parser();
        assert_eq!(
            p.parse("⚽️ Over the moon Odds: 1.5 https://x"),
            Err(ParseError::InvalidNumber {
                field: NumericField::Threshold,
                value: "the".to_string(),
            })
        );
        assert_eq!(
            p.parse("⚽️ Odds: 1.5 https://x Under"),
            Err(ParseError::MissingThreshold(Direction::Under))
        );
    }

    #[test]
    fn ids_are_unique_per_parse() {
        let p = parser();
        let first = p.parse(TIP).unwrap().unwrap();
        let second = p.parse(TIP).unwrap().unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(place(first).bet, place(second).bet);
    }
}
