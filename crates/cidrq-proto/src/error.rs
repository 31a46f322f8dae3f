/// Errors raised while encoding or decoding protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtoError {
    /// The peer speaks a different protocol version.
    #[error("mismatching protocol version, expected {expected}, received {received}")]
    VersionMismatch { expected: u8, received: u8 },

    /// The variant tag is not one of the known message variants.
    #[error("invalid message variant {0}")]
    UnknownVariant(u8),

    /// The message ended before a fixed-width field could be read.
    #[error("truncated message reading {field}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    /// No NUL terminator was found within the scan bound.
    #[error("unterminated string in {field} (scanned {scanned} bytes)")]
    UnterminatedString { field: &'static str, scanned: usize },

    /// A string field is not valid UTF-8.
    #[error("string in {field} is not valid utf-8")]
    InvalidUtf8 { field: &'static str },

    /// A string to be encoded contains an embedded NUL byte.
    #[error("string in {field} contains an interior NUL byte")]
    InteriorNul { field: &'static str },

    /// Request metadata does not fit the one-byte pair count.
    #[error("too many metadata pairs ({0}, max 255)")]
    TooManyMetaPairs(usize),

    /// Bytes were left over after a complete payload.
    #[error("{0} trailing bytes after message payload")]
    TrailingBytes(usize),

    /// A found response carried a prefix length outside 0..=32.
    #[error("invalid mask length {0}")]
    InvalidMaskLength(u32),

    /// Text is not a dotted-quad IPv4 address.
    #[error("invalid IPv4 address {0:?}")]
    InvalidAddress(String),
}

impl ProtoError {
    /// Whether the error means the connection cannot be parsed any further.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtoError::VersionMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, ProtoError>;
