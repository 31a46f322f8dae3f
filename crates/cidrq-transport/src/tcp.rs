use std::fmt;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::LookupStream;

/// Default bound on a single connect attempt (per resolved address).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Remote lookup service address as configured by the host.
///
/// The host is kept as an opaque string (name or literal address) and only
/// resolved when a connect is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint. An empty or blank host is rejected.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(TransportError::EmptyHost);
        }
        Ok(Self { host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve to every candidate socket address (blocking DNS lookup).
    pub fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                endpoint: self.to_string(),
                source,
            })?
            .collect();

        if addrs.is_empty() {
            return Err(TransportError::Resolve {
                endpoint: self.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no addresses returned for host",
                ),
            });
        }
        Ok(addrs)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// TCP transport.
///
/// Connects to the lookup service; every attempt is independent and nothing
/// is retried here. Retry policy belongs to the session layer.
pub struct TcpTransport;

impl TcpTransport {
    /// Connect to the endpoint with [`DEFAULT_CONNECT_TIMEOUT`] (blocking).
    pub fn connect(endpoint: &Endpoint) -> Result<LookupStream> {
        Self::connect_timeout(endpoint, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Connect to the endpoint, trying each resolved address in order.
    ///
    /// The last connect error is reported if every address fails.
    pub fn connect_timeout(endpoint: &Endpoint, timeout: Duration) -> Result<LookupStream> {
        let addrs = endpoint.resolve()?;
        let mut last_err = None;

        for addr in addrs {
            debug!(%endpoint, %addr, "attempting tcp connect");
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    debug!(%endpoint, %addr, "tcp connect succeeded");
                    let stream = LookupStream::from_tcp(stream);
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(err) => {
                    debug!(%endpoint, %addr, error = %err, "tcp connect failed");
                    last_err = Some(err);
                }
            }
        }

        Err(TransportError::Connect {
            endpoint: endpoint.to_string(),
            source: last_err.unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no address attempted")
            }),
        })
    }
}
