use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::config::SessionConfig;
use crate::error::Result;
use crate::link::{LinkSignal, TcpLink};
use crate::session::{Host, ServerInfo, Session, SubmitOutcome};

/// Longest single wait inside [`LookupClient::run_until`], so idle sweeps
/// still run while nothing arrives.
const POLL_SLICE: Duration = Duration::from_millis(100);

/// Link signals buffered before the reader thread waits for `poll`.
pub const SIGNAL_BACKLOG: usize = 64;

/// A lookup session over real TCP, driven from the caller's thread.
///
/// Socket I/O runs on helper threads; all session state changes happen inside
/// [`poll`](Self::poll) and the submit methods. Submits hand frames to a
/// writer thread and return without touching the socket. Received records
/// wait in a channel of [`SIGNAL_BACKLOG`] entries until polled.
pub struct LookupClient<R, H> {
    session: Session<R, TcpLink, H>,
    signals: Receiver<LinkSignal>,
}

impl<R, H: Host<R>> LookupClient<R, H> {
    pub fn new(config: SessionConfig, host: H) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel(SIGNAL_BACKLOG);
        let link = TcpLink::new(tx, config.frame_config(), config.connect_timeout);
        let session = Session::new(config, link, host)?;
        Ok(Self {
            session,
            signals: rx,
        })
    }

    pub fn submit(&mut self, requester: R, ip_text: &str) -> Result<SubmitOutcome> {
        self.session.submit(requester, ip_text)
    }

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
        self.session.submit_with_meta(requester, ip_text, meta)
    }

    /// Start connecting without submitting anything.
    pub fn connect(&mut self) -> bool {
        self.session.connect()
    }

    pub fn disconnect(&mut self) {
        self.session.disconnect();
    }

    /// Wait up to `timeout` for one socket event and apply it, then sweep an
    /// idle connection.
    ///
    /// Returns whether an event reached the session.
    pub fn poll(&mut self, timeout: Duration) -> bool {
        if let Some(event) = self.session.link_mut().take_deferred() {
            self.session.handle_event(event);
            self.session.sweep_idle(Instant::now());
            return true;
        }
        let applied = match self.signals.recv_timeout(timeout) {
            Ok(signal) => match self.session.link_mut().accept(signal) {
                Some(event) => {
                    trace!(?event, "link event");
                    self.session.handle_event(event);
                    true
                }
                None => false,
            },
            // The link owns a sender, so the channel only ever times out.
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        };
        self.session.sweep_idle(Instant::now());
        applied
    }

    /// Poll until `done` holds or `deadline` passes. Returns whether `done`
    /// held.
    pub fn run_until<F>(&mut self, deadline: Instant, mut done: F) -> bool
    where
        F: FnMut(&Session<R, TcpLink, H>) -> bool,
    {
        loop {
            if done(&self.session) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.poll((deadline - now).min(POLL_SLICE));
        }
    }

    pub fn purge(&mut self) -> usize {
        self.session.purge()
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.session.server_info()
    }

    pub fn session(&self) -> &Session<R, TcpLink, H> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<R, TcpLink, H> {
        &mut self.session
    }

    pub fn host(&self) -> &H {
        self.session.host()
    }

    pub fn host_mut(&mut self) -> &mut H {
        self.session.host_mut()
    }
}
