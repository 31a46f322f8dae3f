//! TCP transport for the cidrq lookup client.
//!
//! Resolves a configured `host:port` endpoint and hands back a connected
//! [`LookupStream`]. This is the lowest layer of cidrq; record framing and the
//! lookup protocol are built on top of it.

pub mod error;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use tcp::{Endpoint, TcpTransport, DEFAULT_CONNECT_TIMEOUT};
pub use traits::LookupStream;
