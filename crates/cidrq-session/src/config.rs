use std::fmt;
use std::time::Duration;

use cidrq_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};
use cidrq_transport::DEFAULT_CONNECT_TIMEOUT;

/// Port the lookup service listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 9595;

/// Outstanding lookups allowed before `submit` starts refusing work.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Configuration for a lookup session.
#[derive(Clone)]
pub struct SessionConfig {
    /// Remote host name or address. Must not be blank.
    pub host: String,
    /// Remote TCP port.
    pub port: u16,
    /// Optional identification token sent right after connecting.
    /// Plaintext on the wire; never logged.
    pub identify: Option<String>,
    /// Cap on `Pending` + `Sent` entries.
    pub max_pending: usize,
    /// Largest record accepted from the service, in bytes.
    pub max_frame: usize,
    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Timeout for one record write on the link's writer thread.
    pub write_timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_identify(mut self, token: impl Into<String>) -> Self {
        self.identify = Some(token.into());
        self
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Record settings for the socket carrying this session.
    ///
    /// Reads never time out; the reader blocks until the socket closes.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_frame,
            read_timeout: None,
            write_timeout: self.write_timeout,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            identify: None,
            max_pending: DEFAULT_MAX_PENDING,
            max_frame: DEFAULT_MAX_PAYLOAD,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("SessionConfig");
        dbg.field("host", &self.host)
            .field("port", &self.port)
            .field("max_pending", &self.max_pending)
            .field("max_frame", &self.max_frame)
            .field("connect_timeout", &self.connect_timeout)
            .field("write_timeout", &self.write_timeout);
        if let Some(token) = &self.identify {
            dbg.field("identify", &format_args!("<redacted:{} bytes>", token.len()));
        } else {
            dbg.field("identify", &Option::<String>::None);
        }
        dbg.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.port, 9595);
        assert_eq!(config.max_pending, 1024);
        assert_eq!(config.frame_config().max_payload_size, DEFAULT_MAX_PAYLOAD);
        assert!(config.frame_config().read_timeout.is_none());
    }

    #[test]
    fn debug_redacts_identify_token() {
        let config = SessionConfig::new("lookup.example", 9000).with_identify("hunter2");
        let debug = format!("{config:?}");
        assert!(debug.contains("<redacted:7 bytes>"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("lookup.example"));
    }
}
