/// Errors that can occur during record encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The record header contains an invalid magic number.
    #[error("invalid record magic (expected 0x4C51 \"LQ\")")]
    InvalidMagic,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing records.
    #[error("record I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete record was received.
    #[error("connection closed (incomplete record)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
