//! Binary message codec for the CIDR lookup protocol.
//!
//! Every message starts with a two-byte header (protocol version, variant tag)
//! followed by a variant-specific payload. Multi-byte integers are big-endian
//! and strings are NUL-terminated UTF-8.
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────────────────┐
//! │ Version (1B) │ Variant (1B) │ Payload (variant layout) │
//! └──────────────┴──────────────┴──────────────────────────┘
//! ```
//!
//! The version byte is checked before any payload field is read; a peer
//! speaking another version is rejected with [`ProtoError::VersionMismatch`].

pub mod error;
pub mod ip;
pub mod message;
pub mod wire;

pub use error::{ProtoError, Result};
pub use ip::{format_ipv4, normalize_ipv4, parse_ipv4, Cidr};
pub use message::{
    ErrorCode, Established, Header, Identify, Message, Request, ResponseError, ResponseOkFound,
    ResponseOkNotFound, Variant, HEADER_SIZE, MAX_META_PAIRS, PROTOCOL_VERSION,
};
pub use wire::{WireReader, DEFAULT_MAX_STRING_LEN};
