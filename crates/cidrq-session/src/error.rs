/// Errors surfaced by the lookup session.
///
/// Transport and protocol failures on an established connection are handled
/// inside the session; only the variants a caller can act on reach `submit`.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The remote host is blank.
    #[error("lookup host is empty")]
    EmptyHost,

    /// The submitted text is not a dotted-quad IPv4 address.
    #[error("invalid address: {0}")]
    InvalidAddress(#[source] cidrq_proto::ProtoError),

    /// Too many lookups are already outstanding.
    #[error("request queue full ({limit} outstanding)")]
    QueueFull { limit: usize },

    /// The service speaks another protocol version; the session no longer
    /// connects.
    #[error("session halted: {0}")]
    Halted(String),

    /// A frame was handed to a link that has no live socket.
    #[error("not connected")]
    NotConnected,

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] cidrq_transport::TransportError),

    /// Record-level error.
    #[error("frame error: {0}")]
    Frame(#[from] cidrq_frame::FrameError),

    /// Encoding or decoding error.
    #[error("protocol error: {0}")]
    Proto(#[from] cidrq_proto::ProtoError),
}

impl SessionError {
    /// Whether retrying the same call later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::QueueFull { .. }
                | SessionError::NotConnected
                | SessionError::Transport(_)
                | SessionError::Frame(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
