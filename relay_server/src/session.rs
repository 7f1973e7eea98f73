//! One subscriber connection: WebSocket handshake, duplex loops and teardown.
//!
//! Lifecycle: `Connecting → Active → Closing → Closed`.
//!
//! While `Active`, two loops run in a `std::thread::scope`:
//!
//! - the inbound loop reads frames from the subscriber, logs them and watches for
//!   an empty message, a close frame or a transport error;
//! - the outbound loop waits on the subscriber's bus queue and writes each frame to
//!   the socket.
//!
//! Whichever loop stops first moves the session to `Closing` and raises the close
//! signal. The sibling observes it at its next suspension point: the outbound loop
//! selects on the signal next to its queue, the inbound loop checks it after every
//! read poll. In-flight work is abandoned, not drained.
//!
//! Both loops share the socket through a `parking_lot::Mutex` released with
//! `unlock_fair`, so a pending send is not starved by the read poll.

use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, select};
use log::{debug, info, warn};
use parking_lot::{Mutex, MutexGuard};
use relay_common::{RelayError, Result};
use strum_macros::Display;
use tungstenite::{Message, WebSocket};

use crate::bus::{Frame, Subscription};

/// How long a single inbound read may hold the socket before yielding.
pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Most frames written per socket lock before the inbound loop gets a turn.
const MAX_BATCH: u64 = 256;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    /// Subscribed and registered, handshake in progress.
    Connecting,
    /// Both loops running.
    Active,
    /// A loop stopped or a close was requested; teardown pending.
    Closing,
    /// Socket shut down.
    Closed,
}

/// Why a session left `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CloseReason {
    /// Close frame or end of stream from the subscriber.
    #[strum(serialize = "peer closed the connection")]
    PeerClosed,
    /// The subscriber sent an empty message.
    #[strum(serialize = "peer sent an empty message")]
    EmptyMessage,
    /// Transport error while reading.
    #[strum(serialize = "receive failed")]
    ReceiveFailed,
    /// Transport error while writing.
    #[strum(serialize = "send failed")]
    SendFailed,
    /// The bus dropped the subscription and its queue is drained.
    #[strum(serialize = "detached from the bus")]
    Detached,
    /// Closed by the server.
    #[strum(serialize = "server shutdown")]
    ServerShutdown,
}

struct Lifecycle {
    state: SessionState,
    reason: Option<CloseReason>,
}

/// Shared close switch for one session, also held by the session registry.
pub struct SessionControl {
    lifecycle: Mutex<Lifecycle>,
    closing: AtomicBool,
    close_tx: Sender<()>,
    close_rx: Receiver<()>,
}

impl SessionControl {
    /// Fresh control in `Connecting`.
    pub fn new() -> Self {
        let (close_tx, close_rx) = bounded(1);
        Self {
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Connecting,
                reason: None,
            }),
            closing: AtomicBool::new(false),
            close_tx,
            close_rx,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.lifecycle.lock().state
    }

    /// Reason recorded by the first close request, if any.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.lifecycle.lock().reason
    }

    /// `true` from the first close request on.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Ask the session to stop, e.g. on server shutdown.
    pub fn request_close(&self) {
        self.close_with(CloseReason::ServerShutdown);
    }

    /// Move to `Closing` and wake the outbound loop. Only the first call records its
    /// reason; returns whether this call did the transition.
    fn close_with(&self, reason: CloseReason) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if matches!(lifecycle.state, SessionState::Closing | SessionState::Closed) {
            return false;
        }
        lifecycle.state = SessionState::Closing;
        lifecycle.reason = Some(reason);
        self.closing.store(true, Ordering::Release);
        let _ = self.close_tx.try_send(());
        true
    }

    /// `Connecting → Active`, unless a close was requested during the handshake.
    fn activate(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != SessionState::Connecting {
            return false;
        }
        lifecycle.state = SessionState::Active;
        true
    }

    pub(crate) fn mark_closed(&self) {
        self.closing.store(true, Ordering::Release);
        self.lifecycle.lock().state = SessionState::Closed;
    }

    fn close_signal(&self) -> &Receiver<()> {
        &self.close_rx
    }
}

impl Default for SessionControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// Why the session ended.
    pub reason: CloseReason,
    /// Frames written to the subscriber.
    pub frames_sent: u64,
    /// Non-empty messages read from the subscriber.
    pub frames_received: u64,
}

/// An accepted, handshaken subscriber connection.
pub struct SubscriberSession {
    peer: SocketAddr,
    socket: Mutex<WebSocket<TcpStream>>,
    subscription: Subscription,
    control: Arc<SessionControl>,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
}

impl SubscriberSession {
    /// Complete the WebSocket handshake on `stream`.
    ///
    /// `subscription` should be taken before calling this so frames published during
    /// the handshake are already queued for the subscriber.
    pub fn accept(
        stream: TcpStream,
        peer: SocketAddr,
        subscription: Subscription,
        control: Arc<SessionControl>,
    ) -> Result<Self> {
        let socket = match tungstenite::accept(stream) {
            Ok(socket) => socket,
            Err(e) => {
                control.mark_closed();
                return Err(RelayError::Handshake(e.to_string()));
            }
        };
        if let Err(e) = socket.get_ref().set_read_timeout(Some(READ_POLL_INTERVAL)) {
            control.mark_closed();
            return Err(e.into());
        }
        debug!("[{}] handshake complete", peer);

        Ok(Self {
            peer,
            socket: Mutex::new(socket),
            subscription,
            control,
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
        })
    }

    /// Remote address of the subscriber.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Run both loops until either stops, then tear the connection down.
    pub fn run(self) -> SessionSummary {
        if self.control.activate() {
            info!("[{}] subscriber active ({})", self.peer, self.subscription.id());
            thread::scope(|scope| {
                scope.spawn(|| {
                    if let Some(reason) = self.inbound_loop() {
                        self.control.close_with(reason);
                    }
                });
                scope.spawn(|| {
                    if let Some(reason) = self.outbound_loop() {
                        self.control.close_with(reason);
                    }
                });
            });
        }
        self.teardown();

        SessionSummary {
            reason: self
                .control
                .close_reason()
                .unwrap_or(CloseReason::ServerShutdown),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
        }
    }

    /// Returns `None` when stopped by the close signal rather than by the peer.
    fn inbound_loop(&self) -> Option<CloseReason> {
        loop {
            if self.control.is_closing() {
                return None;
            }
            let mut socket = self.socket.lock();
            let result = socket.read();
            MutexGuard::unlock_fair(socket);

            match result {
                Ok(Message::Text(text)) if text.is_empty() => {
                    return Some(CloseReason::EmptyMessage);
                }
                Ok(Message::Text(text)) => {
                    self.frames_received.fetch_add(1, Ordering::Relaxed);
                    debug!("[{}] <- {}", self.peer, text);
                }
                Ok(Message::Binary(data)) if data.is_empty() => {
                    return Some(CloseReason::EmptyMessage);
                }
                Ok(Message::Binary(data)) => {
                    self.frames_received.fetch_add(1, Ordering::Relaxed);
                    debug!("[{}] <- {} binary byte(s)", self.peer, data.len());
                }
                Ok(Message::Close(_)) => return Some(CloseReason::PeerClosed),
                Ok(_) => {}
                Err(tungstenite::Error::Io(e)) if is_poll_timeout(e.kind()) => {}
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Some(CloseReason::PeerClosed);
                }
                Err(e) => {
                    warn!("[{}] receive failed: {}", self.peer, e);
                    return Some(CloseReason::ReceiveFailed);
                }
            }
        }
    }

    /// Returns `None` when stopped by the close signal.
    fn outbound_loop(&self) -> Option<CloseReason> {
        let close_signal = self.control.close_signal();
        let queue = self.subscription.receiver();
        loop {
            select! {
                recv(close_signal) -> _ => return None,
                recv(queue) -> frame => match frame {
                    Ok(frame) => {
                        if let Err(e) = self.send_batch(frame) {
                            warn!("[{}] send failed: {}", self.peer, e);
                            return Some(CloseReason::SendFailed);
                        }
                    }
                    Err(_) => return Some(CloseReason::Detached),
                },
            }
        }
    }

    /// Write `first` plus whatever else is already queued (up to `MAX_BATCH`) under a
    /// single lock, then flush once.
    fn send_batch(&self, first: Frame) -> std::result::Result<(), tungstenite::Error> {
        let queue = self.subscription.receiver();
        let mut socket = self.socket.lock();
        let mut result = socket.write(Message::text(&*first));
        let mut written = 1;
        while result.is_ok() && written < MAX_BATCH {
            match queue.try_recv() {
                Ok(frame) => {
                    result = socket.write(Message::text(&*frame));
                    written += 1;
                }
                Err(_) => break,
            }
        }
        let result = result.and_then(|()| socket.flush());
        MutexGuard::unlock_fair(socket);
        if result.is_ok() {
            self.frames_sent.fetch_add(written, Ordering::Relaxed);
        }
        result
    }

    fn teardown(&self) {
        let mut socket = self.socket.lock();
        let _ = socket.close(None);
        let _ = socket.flush();
        let _ = socket.get_ref().shutdown(Shutdown::Both);
        self.control.mark_closed();
    }
}

fn is_poll_timeout(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;
    use std::net::TcpListener;

    #[test]
    fn first_close_reason_wins() {
        let control = SessionControl::new();
        assert_eq!(control.state(), SessionState::Connecting);
        assert!(control.activate());
        assert_eq!(control.state(), SessionState::Active);

        assert!(control.close_with(CloseReason::SendFailed));
        assert!(!control.close_with(CloseReason::PeerClosed));
        assert_eq!(control.state(), SessionState::Closing);
        assert_eq!(control.close_reason(), Some(CloseReason::SendFailed));
        assert!(control.is_closing());
        assert!(control.close_signal().try_recv().is_ok());
    }

    #[test]
    fn close_during_handshake_prevents_activation() {
        let control = SessionControl::new();
        control.request_close();
        assert!(!control.activate());
        assert_eq!(control.close_reason(), Some(CloseReason::ServerShutdown));
        control.mark_closed();
        assert_eq!(control.state(), SessionState::Closed);
    }

    #[test]
    fn failed_handshake_marks_session_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || {
            use std::io::Write;
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(b"not a websocket request\r\n\r\n").unwrap();
        });
        let (stream, peer) = listener.accept().unwrap();
        client.join().unwrap();

        let bus = Bus::default();
        let control = Arc::new(SessionControl::new());
        let result = SubscriberSession::accept(
            stream,
            peer,
            bus.subscribe().unwrap(),
            Arc::clone(&control),
        );
        assert!(matches!(result, Err(RelayError::Handshake(_))));
        assert_eq!(control.state(), SessionState::Closed);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
