//! Operator console: every line typed is broadcast verbatim.
//!
//! Lines bypass the feed parser. The literal line `quit` ends the console with
//! [`ConsoleExit::Quit`]; the caller terminates the process without publishing
//! anything further.

use std::io::BufRead;

use log::{info, warn};
use relay_common::Result;

use crate::bus::Bus;

/// Line that terminates the process.
pub const QUIT_COMMAND: &str = "quit";

/// Why the console stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// The operator typed `quit`.
    Quit,
    /// Input was closed.
    EndOfInput,
}

/// Publish lines from `input` until `quit` or end of input.
pub fn run<R: BufRead>(input: R, bus: &Bus) -> Result<ConsoleExit> {
    for line in input.lines() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line == QUIT_COMMAND {
            info!("Quit requested from console");
            return Ok(ConsoleExit::Quit);
        }
        if line.trim().is_empty() {
            continue;
        }
        match bus.publish(line) {
            Ok(subscribers) => info!("Console line queued for {} subscriber(s)", subscribers),
            Err(e) => warn!("Console line dropped: {}", e),
        }
    }
    Ok(ConsoleExit::EndOfInput)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn lines_are_published_verbatim() {
        let bus = Bus::default();
        let sub = bus.subscribe().unwrap();

        let exit = run(Cursor::new("{\"Ping\":1}\n\n  \nhello world\n"), &bus).unwrap();

        assert_eq!(exit, ConsoleExit::EndOfInput);
        assert_eq!(sub.try_recv().as_deref(), Some("{\"Ping\":1}"));
        assert_eq!(sub.try_recv().as_deref(), Some("hello world"));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn quit_stops_before_later_lines() {
        let bus = Bus::default();
        let sub = bus.subscribe().unwrap();

        let exit = run(Cursor::new("first\nquit\nnever sent\n"), &bus).unwrap();

        assert_eq!(exit, ConsoleExit::Quit);
        assert_eq!(sub.try_recv().as_deref(), Some("first"));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn quit_must_match_exactly() {
        let bus = Bus::default();
        let sub = bus.subscribe().unwrap();

        let exit = run(Cursor::new("quit now\n"), &bus).unwrap();

        assert_eq!(exit, ConsoleExit::EndOfInput);
        assert_eq!(sub.try_recv().as_deref(), Some("quit now"));
    }
}
