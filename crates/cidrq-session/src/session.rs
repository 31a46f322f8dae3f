//! The lookup session: one connection, one queue, one transition function.
//!
//! A [`Session`] never blocks and never performs I/O itself. Callers feed it
//! [`Event`]s from whatever drives the socket and call [`Session::submit`]
//! from the same thread. See [`LookupClient`](crate::LookupClient) for a
//! driver over real TCP sockets.

use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use cidrq_proto::{format_ipv4, parse_ipv4, Cidr, Established, Identify, Message, Request};
use cidrq_transport::{Endpoint, TransportError};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::connection::{Connection, Link, SocketState};
use crate::error::{Result, SessionError};
use crate::queue::{EntryState, QueueEntry, RequestQueue};

/// Something that happened on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A connect attempt completed.
    Connected,
    /// One complete protocol message arrived.
    Received(Bytes),
    /// The peer closed the socket.
    Disconnected,
    /// A connect attempt or an established socket failed.
    Error(Failure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Connect,
    Transport,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Connect => f.write_str("connect"),
            FailureKind::Transport => f.write_str("transport"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub detail: String,
}

impl Failure {
    pub fn connect(detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Connect,
            detail: detail.into(),
        }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transport,
            detail: detail.into(),
        }
    }
}

/// Parameters the service announced when the connection was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub rate_limit: u32,
    pub tree_size: u32,
    pub cache_ttl: u32,
    pub peer_ttl: u32,
    pub banner: String,
}

impl ServerInfo {
    /// How long the service keeps an idle connection open.
    pub fn peer_ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.peer_ttl))
    }
}

impl From<Established> for ServerInfo {
    fn from(m: Established) -> Self {
        Self {
            rate_limit: m.rate_limit,
            tree_size: m.tree_size,
            cache_ttl: m.cache_ttl,
            peer_ttl: m.peer_ttl,
            banner: m.banner,
        }
    }
}

/// Outcome of a lookup handed to [`Host::on_resolved`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The address is inside `cidr`, the longest matching range.
    Found { ip: String, cidr: Cidr },
    NotFound { ip: String },
}

impl Resolution {
    pub fn ip(&self) -> &str {
        match self {
            Resolution::Found { ip, .. } | Resolution::NotFound { ip } => ip,
        }
    }

    pub fn cidr(&self) -> Option<Cidr> {
        match self {
            Resolution::Found { cidr, .. } => Some(*cidr),
            Resolution::NotFound { .. } => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found { .. })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Found { ip, cidr } => write!(f, "{ip} found in {cidr}"),
            Resolution::NotFound { ip } => write!(f, "{ip} not found"),
        }
    }
}

/// The environment a session reports to.
pub trait Host<R> {
    /// Whether `requester` still wants its answer. Checked before a queued
    /// lookup is sent; unreachable requesters are dropped without sending.
    fn is_reachable(&self, _requester: &R) -> bool {
        true
    }

    /// Called once per lookup when the matching response arrives.
    fn on_resolved(&mut self, requester: &R, resolution: &Resolution);
}

/// What `submit` did with the lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Written to the live socket.
    Sent,
    /// Waiting for a connection; a connect was started if none was running.
    Queued,
}

/// Client state for one lookup service.
pub struct Session<R, L, H> {
    config: SessionConfig,
    connection: Connection<L>,
    queue: RequestQueue<R>,
    host: H,
    server_info: Option<ServerInfo>,
    halted: Option<String>,
    last_error: Option<String>,
}

impl<R, L: Link, H: Host<R>> Session<R, L, H> {
    /// Create a disconnected session. A blank host is refused here.
    pub fn new(config: SessionConfig, link: L, host: H) -> Result<Self> {
        let endpoint = Endpoint::new(config.host.clone(), config.port).map_err(|err| match err {
            TransportError::EmptyHost => SessionError::EmptyHost,
            other => SessionError::Transport(other),
        })?;

        Ok(Self {
            queue: RequestQueue::new(config.max_pending),
            connection: Connection::new(link, endpoint),
            config,
            host,
            server_info: None,
            halted: None,
            last_error: None,
        })
    }

    /// Look up `ip_text` on behalf of `requester`.
    pub fn submit(&mut self, requester: R, ip_text: &str) -> Result<SubmitOutcome> {
        self.submit_with_meta(requester, ip_text, std::iter::empty::<(String, String)>())
    }

    /// Look up `ip_text`, attaching opaque metadata to the request.
    pub fn submit_with_meta<I, K, V>(
        &mut self,
        requester: R,
        ip_text: &str,
        meta: I,
    ) -> Result<SubmitOutcome>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if let Some(reason) = &self.halted {
            return Err(SessionError::Halted(reason.clone()));
        }

        let ip = parse_ipv4(ip_text).map_err(SessionError::InvalidAddress)?;
        let mut entry = QueueEntry::new(requester, format_ipv4(ip), ip);
        entry.meta = meta
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        // Encode up front so a bad request never enters the queue.
        let frame = request_frame(&entry)?;

        self.queue.push(entry)?;
        let index = self.queue.len() - 1;

        if !self.connection.is_connected() {
            debug!(ip = %ip_text, "lookup queued until connected");
            self.connection.connect();
            return Ok(SubmitOutcome::Queued);
        }

        if let Err(err) = self.connection.send(&frame) {
            warn!(error = %err, "send failed; reconnecting");
            self.fail(err.to_string());
            self.connection.connect();
            return Ok(SubmitOutcome::Queued);
        }
        if let Some(entry) = self.queue.get_mut(index) {
            entry.state = EntryState::Sent;
        }
        Ok(SubmitOutcome::Sent)
    }

    /// Apply one socket event.
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Connected => self.on_connected(),
            Event::Received(frame) => self.on_frame(&frame),
            Event::Disconnected => {
                info!(
                    endpoint = %self.connection.endpoint(),
                    "lookup service closed the connection"
                );
                self.fail("connection closed by lookup service".to_string());
            }
            Event::Error(failure) => {
                warn!(
                    endpoint = %self.connection.endpoint(),
                    kind = %failure.kind,
                    detail = %failure.detail,
                    "lookup connection failed"
                );
                self.fail(format!("{} failed: {}", failure.kind, failure.detail));
            }
        }
    }

    /// Start a connect unless one is running, the socket is up, or the
    /// session is halted.
    pub fn connect(&mut self) -> bool {
        if self.halted.is_some() {
            return false;
        }
        self.connection.connect()
    }

    /// Drop the socket. In-flight lookups go back to pending.
    pub fn disconnect(&mut self) {
        self.link_lost();
    }

    /// Remove finished entries. Returns how many were removed.
    pub fn purge(&mut self) -> usize {
        self.queue.purge()
    }

    /// Close the connection if it has been idle for the service's peer TTL.
    ///
    /// Returns whether the connection was closed.
    pub fn sweep_idle(&mut self, now: Instant) -> bool {
        if !self.connection.is_connected() || self.queue.has_sent() {
            return false;
        }
        let Some(ttl) = self.server_info.as_ref().map(ServerInfo::peer_ttl) else {
            return false;
        };
        if ttl.is_zero() {
            return false;
        }
        let Some(since) = self.connection.last_activity() else {
            return false;
        };
        if now.saturating_duration_since(since) < ttl {
            return false;
        }

        info!(idle_for = ?now.saturating_duration_since(since), "closing idle lookup connection");
        self.link_lost();
        true
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SocketState {
        self.connection.state()
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    pub fn queue(&self) -> &RequestQueue<R> {
        &self.queue
    }

    pub fn connection(&self) -> &Connection<L> {
        &self.connection
    }

    /// Why the session stopped, if it did.
    pub fn halt_reason(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Why the last connection ended or failed to start, if it did not end
    /// on request. Cleared when a connection comes up.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn link(&self) -> &L {
        self.connection.link()
    }

    pub fn link_mut(&mut self) -> &mut L {
        self.connection.link_mut()
    }

    fn on_connected(&mut self) {
        if self.halted.is_some() {
            self.connection.disconnect();
            return;
        }
        self.connection.mark_connected();
        self.last_error = None;

        if let Some(token) = self.config.identify.clone() {
            let sent = Message::Identify(Identify { id: token })
                .to_bytes()
                .map_err(SessionError::from)
                .and_then(|frame| self.connection.send(&frame));
            if let Err(err) = sent {
                warn!(error = %err, "identify failed");
                self.fail(err.to_string());
                return;
            }
            debug!("identify sent");
        }

        self.flush_pending();
    }

    fn flush_pending(&mut self) {
        for index in self.queue.pending_indices() {
            let Some(entry) = self.queue.get_mut(index) else {
                continue;
            };

            if !self.host.is_reachable(&entry.requester) {
                debug!(ip = %entry.ip_text, "requester gone; dropping lookup");
                entry.state = EntryState::Complete;
                continue;
            }

            let frame = match request_frame(entry) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(ip = %entry.ip_text, error = %err, "dropping unencodable lookup");
                    entry.state = EntryState::Complete;
                    continue;
                }
            };

            if let Err(err) = self.connection.send(&frame) {
                warn!(error = %err, "send failed while flushing queue");
                self.fail(err.to_string());
                return;
            }
            entry.state = EntryState::Sent;
        }
    }

    fn on_frame(&mut self, frame: &[u8]) {
        let message = match Message::decode_with_limit(frame, self.config.max_frame) {
            Ok(message) => message,
            Err(err) if err.is_fatal() => {
                error!(error = %err, "lookup service speaks another protocol; halting");
                self.halted = Some(err.to_string());
                self.fail(err.to_string());
                return;
            }
            Err(err) => {
                warn!(error = %err, len = frame.len(), "discarding malformed frame");
                return;
            }
        };

        match message {
            Message::Established(established) => {
                info!(
                    rate_limit = established.rate_limit,
                    tree_size = established.tree_size,
                    cache_ttl = established.cache_ttl,
                    peer_ttl = established.peer_ttl,
                    banner = %established.banner,
                    "lookup service established"
                );
                self.server_info = Some(established.into());
            }
            Message::ResponseOkFound(found) => {
                let ip = format_ipv4(found.ip_address);
                self.resolve(Resolution::Found {
                    ip,
                    cidr: found.cidr(),
                });
            }
            Message::ResponseOkNotFound(not_found) => {
                let ip = format_ipv4(not_found.ip_address);
                self.resolve(Resolution::NotFound { ip });
            }
            Message::ResponseError(err) => {
                warn!(
                    code = err.code,
                    reason = %err.error_code(),
                    message = %err.message,
                    "lookup service reported an error"
                );
                self.fail(format!(
                    "lookup service error {} ({}): {}",
                    err.code,
                    err.error_code(),
                    err.message
                ));
            }
            other @ (Message::Identify(_) | Message::Request(_)) => {
                debug!(variant = %other.variant(), "ignoring client-bound message");
            }
        }
    }

    fn resolve(&mut self, resolution: Resolution) {
        match self.queue.complete_first_sent(resolution.ip()) {
            Some(entry) => {
                debug!(%resolution, "lookup resolved");
                self.host.on_resolved(&entry.requester, &resolution);
            }
            None => warn!(ip = %resolution.ip(), "response matches no in-flight lookup"),
        }
    }

    fn fail(&mut self, reason: String) {
        self.last_error = Some(reason);
        self.link_lost();
    }

    /// Common teardown for every way a connection can end.
    fn link_lost(&mut self) {
        self.connection.disconnect();
        self.server_info = None;
        let demoted = self.queue.demote_sent();
        if demoted > 0 {
            debug!(demoted, "in-flight lookups will be resent on reconnect");
        }
    }
}

fn request_frame<R>(entry: &QueueEntry<R>) -> Result<Bytes> {
    let request = Request {
        ip_address: entry.ip,
        meta: entry.meta.clone(),
    };
    Ok(Message::Request(request).to_bytes()?)
}
