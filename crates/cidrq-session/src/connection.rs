//! Socket lifecycle for a single lookup connection.

use std::fmt;
use std::time::Instant;

use cidrq_transport::Endpoint;
use tracing::{debug, info};

use crate::error::{Result, SessionError};

/// The I/O side of a connection.
///
/// Implementations never call back into the session. Connect completion,
/// received records, and socket failures are reported later as
/// [`Event`](crate::Event)s by whoever drives the session.
pub trait Link {
    /// Begin connecting to `endpoint`. Must not block on the network.
    fn start_connect(&mut self, endpoint: &Endpoint);

    /// Transmit one complete protocol message.
    fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Drop the socket, if any. Idempotent.
    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Disconnected,
    /// A connect attempt is in flight; further `connect` calls are no-ops.
    Connecting,
    Connected,
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketState::Disconnected => f.write_str("disconnected"),
            SocketState::Connecting => f.write_str("connecting"),
            SocketState::Connected => f.write_str("connected"),
        }
    }
}

/// Owns the link and tracks where it is in its lifecycle.
pub struct Connection<L> {
    link: L,
    endpoint: Endpoint,
    state: SocketState,
    connected_at: Option<Instant>,
    last_request_at: Option<Instant>,
}

impl<L: Link> Connection<L> {
    pub fn new(link: L, endpoint: Endpoint) -> Self {
        Self {
            link,
            endpoint,
            state: SocketState::Disconnected,
            connected_at: None,
            last_request_at: None,
        }
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SocketState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state == SocketState::Connecting
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Start a connect attempt unless one is in flight or the socket is up.
    ///
    /// Returns whether a new attempt was started.
    pub fn connect(&mut self) -> bool {
        if self.state != SocketState::Disconnected {
            debug!(state = %self.state, "connect skipped");
            return false;
        }
        self.state = SocketState::Connecting;
        info!(endpoint = %self.endpoint, "connecting to lookup service");
        self.link.start_connect(&self.endpoint);
        true
    }

    /// Record a successful connect completion.
    pub(crate) fn mark_connected(&mut self) {
        self.state = SocketState::Connected;
        self.connected_at = Some(Instant::now());
        self.last_request_at = None;
        info!(endpoint = %self.endpoint, "connected to lookup service");
    }

    /// Send one message. Only valid while connected.
    pub fn send(&mut self, frame: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.link.send(frame)?;
        self.last_request_at = Some(Instant::now());
        Ok(())
    }

    /// Close the socket and clear the connect guard. Idempotent.
    pub fn disconnect(&mut self) {
        if self.state != SocketState::Disconnected {
            debug!(endpoint = %self.endpoint, state = %self.state, "disconnecting");
        }
        self.link.close();
        self.state = SocketState::Disconnected;
        self.connected_at = None;
        self.last_request_at = None;
    }

    /// When the connection last did something: the latest send, or the
    /// connect itself.
    pub fn last_activity(&self) -> Option<Instant> {
        self.last_request_at.or(self.connected_at)
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}

impl<L> fmt::Debug for Connection<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("connected_at", &self.connected_at)
            .field("last_request_at", &self.last_request_at)
            .finish()
    }
}
