//! Client session for the CIDR lookup service.
//!
//! [`Session`] is the event-driven core: it owns one connection and the queue
//! of lookups, and moves them forward as socket [`Event`]s arrive. It performs
//! no I/O of its own; a [`Link`] does. [`LookupClient`] pairs a session with a
//! [`TcpLink`] for blocking callers.
//!
//! ```no_run
//! use cidrq_session::{Host, LookupClient, Resolution, SessionConfig};
//! use std::time::{Duration, Instant};
//!
//! struct Print;
//!
//! impl Host<u32> for Print {
//!     fn on_resolved(&mut self, id: &u32, resolution: &Resolution) {
//!         println!("#{id}: {resolution}");
//!     }
//! }
//!
//! let mut client = LookupClient::new(SessionConfig::new("127.0.0.1", 9595), Print)?;
//! client.submit(1, "203.0.113.7")?;
//! client.run_until(Instant::now() + Duration::from_secs(5), |s| s.queue().outstanding() == 0);
//! # Ok::<(), cidrq_session::SessionError>(())
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod link;
pub mod queue;
pub mod session;

pub use client::{LookupClient, SIGNAL_BACKLOG};
pub use config::{SessionConfig, DEFAULT_MAX_PENDING, DEFAULT_PORT};
pub use connection::{Connection, Link, SocketState};
pub use error::{Result, SessionError};
pub use link::{LinkSignal, TcpLink};
pub use queue::{EntryState, QueueEntry, RequestQueue};
pub use session::{
    Event, Failure, FailureKind, Host, Resolution, ServerInfo, Session, SubmitOutcome,
};
