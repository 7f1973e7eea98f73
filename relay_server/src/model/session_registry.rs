//! Registry of live subscriber sessions.
//!
//! The server records every accepted connection here, keyed by the peer's
//! `SocketAddr`, together with the session's control handle and the moment it
//! connected. It exposes the operations the server lifecycle needs:
//!
//! - `SessionRegistry::register(addr, control)`: track a freshly accepted session.
//! - `SessionRegistry::remove(addr, control)`: forget a finished session and report
//!   how long it was connected. An entry that now belongs to a newer session from
//!   the same address is left alone.
//! - `SessionRegistry::close_all()`: ask every session to stop (used on shutdown).
//!
//! The registry is not synchronized; the server shares it behind a `Mutex`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use crate::session::SessionControl;

struct SessionEntry {
    connected_at: DateTime<Utc>,
    control: Arc<SessionControl>,
}

/// Tracks active sessions by peer address.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<SocketAddr, SessionEntry>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a session. A stale entry for the same address is replaced.
    pub fn register(&mut self, addr: SocketAddr, control: Arc<SessionControl>) {
        self.sessions.insert(
            addr,
            SessionEntry {
                connected_at: Utc::now(),
                control,
            },
        );
    }

    /// Forget the session owning `control`, returning how long it was connected.
    pub fn remove(&mut self, addr: &SocketAddr, control: &Arc<SessionControl>) -> Option<TimeDelta> {
        let owned = self
            .sessions
            .get(addr)
            .is_some_and(|entry| Arc::ptr_eq(&entry.control, control));
        if !owned {
            return None;
        }
        self.sessions
            .remove(addr)
            .map(|entry| Utc::now() - entry.connected_at)
    }

    /// Check whether a session for `addr` is tracked and not yet closing.
    pub fn is_active(&self, addr: &SocketAddr) -> bool {
        self.sessions
            .get(addr)
            .map(|entry| !entry.control.is_closing())
            .unwrap_or(false)
    }

    /// Signal every tracked session to close. Returns the number signalled.
    pub fn close_all(&self) -> usize {
        for entry in self.sessions.values() {
            entry.control.request_close();
        }
        self.sessions.len()
    }

    /// Number of tracked sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn register_and_remove() {
        let mut registry = SessionRegistry::new();
        let first = Arc::new(SessionControl::new());
        registry.register(addr(1000), Arc::clone(&first));
        registry.register(addr(1001), Arc::new(SessionControl::new()));

        assert_eq!(registry.count(), 2);
        assert!(registry.is_active(&addr(1000)));

        let connected_for = registry.remove(&addr(1000), &first).unwrap();
        assert!(connected_for >= TimeDelta::zero());
        assert!(!registry.is_active(&addr(1000)));
        assert!(registry.remove(&addr(1000), &first).is_none());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn finished_session_keeps_newer_entry_for_same_address() {
        let mut registry = SessionRegistry::new();
        let old = Arc::new(SessionControl::new());
        let new = Arc::new(SessionControl::new());
        registry.register(addr(3000), Arc::clone(&old));
        registry.register(addr(3000), Arc::clone(&new));

        assert!(registry.remove(&addr(3000), &old).is_none());
        assert!(registry.is_active(&addr(3000)));
        assert_eq!(registry.count(), 1);

        assert!(registry.remove(&addr(3000), &new).is_some());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn close_all_signals_every_session() {
        let mut registry = SessionRegistry::new();
        let first = Arc::new(SessionControl::new());
        let second = Arc::new(SessionControl::new());
        registry.register(addr(2000), Arc::clone(&first));
        registry.register(addr(2001), Arc::clone(&second));

        assert_eq!(registry.close_all(), 2);
        assert!(first.is_closing());
        assert!(second.is_closing());
        assert!(!registry.is_active(&addr(2000)));
        assert_eq!(registry.count(), 2);
    }
}
