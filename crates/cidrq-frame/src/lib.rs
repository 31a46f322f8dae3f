//! Length-prefixed records that preserve message boundaries over TCP.
//!
//! Every lookup protocol message travels in exactly one record:
//! - A 2-byte magic number ("LQ") for stream synchronization
//! - A 4-byte big-endian payload length
//!
//! Readers hand out complete records only; no partial reads reach the
//! protocol layer.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod tokio_codec;

pub use codec::{
    decode_record, encode_record, FrameConfig, Record, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAGIC,
};
pub use error::{FrameError, Result};
pub use reader::RecordReader;
pub use writer::RecordWriter;

#[cfg(feature = "async")]
pub use tokio_codec::RecordCodec;
