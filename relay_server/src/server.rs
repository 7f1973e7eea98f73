//! Subscriber-facing WebSocket server.
//!
//! `Server` owns the listening socket, the distribution bus and the registry of
//! live sessions. Each accepted TCP connection is subscribed to the bus, registered,
//! handshaken and then served by a [`SubscriberSession`] on its own thread.
//!
//! Shutdown is triggered through a [`ServerHandle`]: the accept loop stops, the
//! listener is dropped, every registered session is signalled and the bus is closed.
//! Frames still queued or in flight are not flushed.

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use relay_common::Result;
use relay_common::net::{DEFAULT_HOST, DEFAULT_PORT, addr};

use crate::bus::{Bus, DEFAULT_CHANNEL_CAPACITY, SlowSubscriberPolicy};
use crate::model::session_registry::SessionRegistry;
use crate::session::{SessionControl, SubscriberSession};

/// How often the non-blocking accept loop checks for shutdown.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Listener and subscriber queue settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind, e.g. `0.0.0.0:5999`.
    pub bind_addr: String,
    /// Capacity of every subscriber queue.
    pub channel_capacity: usize,
    /// What to do when a subscriber queue is full.
    pub slow_policy: SlowSubscriberPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: addr(DEFAULT_HOST, DEFAULT_PORT),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            slow_policy: SlowSubscriberPolicy::default(),
        }
    }
}

/// Cloneable access to a server's bus, sessions and shutdown switch.
#[derive(Clone)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    bus: Bus,
    sessions: Arc<Mutex<SessionRegistry>>,
    shutdown: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Address the listener is actually bound to (resolves port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Bus every producer publishes to.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Number of sessions currently registered (connecting or active).
    pub fn session_count(&self) -> usize {
        self.sessions.lock().count()
    }

    /// Stop accepting and close every session. Returns immediately; the accept loop
    /// notices within one poll interval.
    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            info!("Server shutdown requested");
        }
    }

    /// `true` once [`ServerHandle::shutdown`] has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Bound WebSocket server, ready to [`run`](Server::run).
pub struct Server {
    listener: TcpListener,
    handle: ServerHandle,
}

impl Server {
    /// Bind the listening socket described by `config`.
    pub fn bind(config: &ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        info!("Subscriber server listening on ws://{}", local_addr);

        Ok(Self {
            listener,
            handle: ServerHandle {
                local_addr,
                bus: Bus::new(config.channel_capacity, config.slow_policy),
                sessions: Arc::new(Mutex::new(SessionRegistry::new())),
                shutdown: Arc::new(AtomicBool::new(false)),
            },
        })
    }

    /// Handle for producers and for triggering shutdown from another thread.
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Accept subscribers until shutdown is requested, then tear everything down.
    pub fn run(self) -> Result<()> {
        let Server { listener, handle } = self;

        while !handle.is_shutting_down() {
            match listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = spawn_session(&handle, stream, peer) {
                        error!("[{}] failed to start session: {}", peer, e);
                    }
                }
                Err(e) => accept_backoff(&e),
            }
        }

        drop(listener);
        let signalled = handle.sessions.lock().close_all();
        handle.bus.close();
        info!("Server stopped, {} session(s) signalled", signalled);
        Ok(())
    }
}

/// Pause after a failed accept. Every error kind waits one poll interval, so a
/// persistent failure such as EMFILE cannot spin the loop.
fn accept_backoff(e: &io::Error) {
    if e.kind() != ErrorKind::WouldBlock {
        error!("Accept failed: {}", e);
    }
    thread::sleep(ACCEPT_POLL_INTERVAL);
}

fn spawn_session(handle: &ServerHandle, stream: TcpStream, peer: SocketAddr) -> Result<()> {
    stream.set_nonblocking(false)?;
    let subscription = handle.bus.subscribe()?;
    let control = Arc::new(SessionControl::new());
    handle.sessions.lock().register(peer, Arc::clone(&control));
    info!("Client connected: {}", peer);

    let sessions = Arc::clone(&handle.sessions);
    let thread_control = Arc::clone(&control);
    let own_control = Arc::clone(&control);
    let spawned = thread::Builder::new()
        .name(format!("session-{}", peer))
        .spawn(move || {
            match SubscriberSession::accept(stream, peer, subscription, thread_control) {
                Ok(session) => {
                    let summary = session.run();
                    info!(
                        "Connection with {} closed: {} (sent {}, received {})",
                        peer, summary.reason, summary.frames_sent, summary.frames_received
                    );
                }
                Err(e) => warn!("[{}] {}", peer, e),
            }
            if let Some(connected_for) = sessions.lock().remove(&peer, &own_control) {
                debug!(
                    "[{}] session lasted {} ms",
                    peer,
                    connected_for.num_milliseconds()
                );
            }
        });

    if let Err(e) = spawned {
        handle.sessions.lock().remove(&peer, &control);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn default_config_uses_default_endpoint() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:5999");
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.slow_policy, SlowSubscriberPolicy::DropOldest);
    }

    #[test]
    fn failed_accept_backs_off() {
        let started = std::time::Instant::now();
        accept_backoff(&io::Error::new(ErrorKind::Other, "too many open files"));
        assert!(started.elapsed() >= ACCEPT_POLL_INTERVAL);
    }

    #[test]
    fn shutdown_stops_run_and_closes_bus() {
        let server = Server::bind(&local_config()).unwrap();
        let handle = server.handle();
        assert_ne!(handle.local_addr().port(), 0);

        let runner = thread::spawn(move || server.run());
        handle.shutdown();
        runner.join().unwrap().unwrap();

        assert!(handle.bus().is_closed());
        assert!(TcpStream::connect(handle.local_addr()).is_err());
    }
}
