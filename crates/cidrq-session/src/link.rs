//! Blocking TCP link driven by helper threads.
//!
//! Each connection gets two helper threads. One connects and then reads
//! records; the other owns the write half and drains an outbox, so a send
//! from the session thread never waits on the socket. Everything the helpers
//! observe is sent back as a [`LinkSignal`] over a bounded channel and turned
//! into an [`Event`] by [`TcpLink::accept`] on the thread that owns the
//! session. A full channel makes the reader wait instead of buffering.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use cidrq_frame::{FrameConfig, FrameError, RecordReader, RecordWriter};
use cidrq_transport::{Endpoint, LookupStream, TcpTransport};
use tracing::{debug, trace, warn};

use crate::connection::Link;
use crate::error::{Result, SessionError};
use crate::session::{Event, Failure};

/// A socket observation from a helper thread, tagged with the connection
/// attempt it belongs to.
pub struct LinkSignal {
    generation: u64,
    kind: SignalKind,
}

enum SignalKind {
    Connected {
        control: LookupStream,
        outbox: Sender<Bytes>,
    },
    Received(Bytes),
    Closed(Option<String>),
    ConnectFailed(String),
}

impl fmt::Debug for LinkSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            SignalKind::Connected { .. } => "connected",
            SignalKind::Received(_) => "received",
            SignalKind::Closed(_) => "closed",
            SignalKind::ConnectFailed(_) => "connect-failed",
        };
        f.debug_struct("LinkSignal")
            .field("generation", &self.generation)
            .field("kind", &kind)
            .finish()
    }
}

/// Open socket state held on the session thread.
struct Open {
    /// Clone of the socket, kept only to shut it down.
    control: LookupStream,
    outbox: Sender<Bytes>,
}

/// [`Link`] over a real TCP socket.
pub struct TcpLink {
    signals: SyncSender<LinkSignal>,
    frame_config: FrameConfig,
    connect_timeout: Duration,
    generation: u64,
    open: Option<Open>,
    deferred: Option<Event>,
}

impl TcpLink {
    pub fn new(
        signals: SyncSender<LinkSignal>,
        frame_config: FrameConfig,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            signals,
            frame_config,
            connect_timeout,
            generation: 0,
            open: None,
            deferred: None,
        }
    }

    /// Current connection attempt. Signals from older attempts are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// An event raised on the session thread itself, such as a helper
    /// thread that could not be spawned. Drivers check this before waiting
    /// on the signal channel.
    pub fn take_deferred(&mut self) -> Option<Event> {
        self.deferred.take()
    }

    /// Translate a helper signal into a session event.
    ///
    /// Returns `None` for signals from a socket that has since been closed or
    /// replaced.
    pub fn accept(&mut self, signal: LinkSignal) -> Option<Event> {
        if signal.generation != self.generation {
            trace!(
                signal = signal.generation,
                current = self.generation,
                "dropping stale link signal"
            );
            if let SignalKind::Connected { control, .. } = signal.kind {
                let _ = control.shutdown();
            }
            return None;
        }

        match signal.kind {
            SignalKind::Connected { control, outbox } => {
                self.open = Some(Open { control, outbox });
                Some(Event::Connected)
            }
            SignalKind::Received(payload) => Some(Event::Received(payload)),
            SignalKind::Closed(None) => {
                self.open = None;
                Some(Event::Disconnected)
            }
            SignalKind::Closed(Some(detail)) => {
                self.open = None;
                Some(Event::Error(Failure::transport(detail)))
            }
            SignalKind::ConnectFailed(detail) => Some(Event::Error(Failure::connect(detail))),
        }
    }
}

impl Link for TcpLink {
    fn start_connect(&mut self, endpoint: &Endpoint) {
        self.close();
        let generation = self.generation;
        let helper = Helper {
            signals: self.signals.clone(),
            generation,
            endpoint: endpoint.clone(),
            connect_timeout: self.connect_timeout,
            frame_config: self.frame_config.clone(),
        };

        let spawned = thread::Builder::new()
            .name(format!("cidrq-link-{generation}"))
            .spawn(move || helper.run());
        if let Err(err) = spawned {
            warn!(error = %err, "failed to spawn link thread");
            // Sending here could block the only thread that drains the channel.
            self.deferred = Some(Event::Error(Failure::connect(err.to_string())));
        }
    }

    /// Queue one message for the writer thread. Never waits on the socket;
    /// write failures come back later as a transport error event.
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        let open = self.open.as_ref().ok_or(SessionError::NotConnected)?;
        open.outbox
            .send(Bytes::copy_from_slice(frame))
            .map_err(|_| SessionError::NotConnected)
    }

    fn close(&mut self) {
        self.generation += 1;
        self.deferred = None;
        if let Some(open) = self.open.take() {
            // Unblocks the reader; dropping the outbox stops the writer.
            // Their final signals are now stale.
            let _ = open.control.shutdown();
        }
    }
}

impl Drop for TcpLink {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for TcpLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpLink")
            .field("generation", &self.generation)
            .field("open", &self.is_open())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// State moved onto the helper thread for one connection attempt.
struct Helper {
    signals: SyncSender<LinkSignal>,
    generation: u64,
    endpoint: Endpoint,
    connect_timeout: Duration,
    frame_config: FrameConfig,
}

impl Helper {
    fn run(self) {
        let stream = match TcpTransport::connect_timeout(&self.endpoint, self.connect_timeout) {
            Ok(stream) => stream,
            Err(err) => {
                debug!(endpoint = %self.endpoint, error = %err, "connect failed");
                self.signal(SignalKind::ConnectFailed(err.to_string()));
                return;
            }
        };

        let (mut reader, control, outbox) = match self.split(&stream) {
            Ok(parts) => parts,
            Err(err) => {
                let _ = stream.shutdown();
                self.signal(SignalKind::ConnectFailed(err.to_string()));
                return;
            }
        };

        if !self.signal(SignalKind::Connected { control, outbox }) {
            return;
        }

        loop {
            match reader.read_record() {
                Ok(record) => {
                    if !self.signal(SignalKind::Received(record.payload)) {
                        break;
                    }
                }
                Err(FrameError::ConnectionClosed) => {
                    self.signal(SignalKind::Closed(None));
                    break;
                }
                Err(err) => {
                    self.signal(SignalKind::Closed(Some(err.to_string())));
                    break;
                }
            }
        }
        trace!(generation = self.generation, "link reader finished");
    }

    /// Build the reader, the shutdown handle, and the writer thread.
    fn split(
        &self,
        stream: &LookupStream,
    ) -> Result<(RecordReader<LookupStream>, LookupStream, Sender<Bytes>)> {
        let reader = RecordReader::with_config_tcp(stream.try_clone()?, self.frame_config.clone())?;
        let writer = RecordWriter::with_config_tcp(stream.try_clone()?, self.frame_config.clone())?;
        let control = stream.try_clone()?;

        let (outbox, inbox) = mpsc::channel();
        let drain = Drain {
            signals: self.signals.clone(),
            generation: self.generation,
            shutdown: control.try_clone()?,
        };
        thread::Builder::new()
            .name(format!("cidrq-write-{}", self.generation))
            .spawn(move || drain.run(writer, inbox))
            .map_err(cidrq_transport::TransportError::from)?;

        Ok((reader, control, outbox))
    }

    /// Returns false once nobody is listening.
    fn signal(&self, kind: SignalKind) -> bool {
        self.signals
            .send(LinkSignal {
                generation: self.generation,
                kind,
            })
            .is_ok()
    }
}

/// Writer thread: owns the write half until the outbox is dropped or a
/// write fails.
struct Drain {
    signals: SyncSender<LinkSignal>,
    generation: u64,
    shutdown: LookupStream,
}

impl Drain {
    fn run(self, mut writer: RecordWriter<LookupStream>, inbox: Receiver<Bytes>) {
        for frame in inbox {
            if let Err(err) = writer.send(&frame) {
                debug!(generation = self.generation, error = %err, "record write failed");
                let _ = self.signals.send(LinkSignal {
                    generation: self.generation,
                    kind: SignalKind::Closed(Some(err.to_string())),
                });
                let _ = self.shutdown.shutdown();
                return;
            }
        }
        trace!(generation = self.generation, "link writer finished");
    }
}
