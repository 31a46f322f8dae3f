use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProtoError, Result};
use crate::ip::{format_ipv4, Cidr};
use crate::wire::{put_cstr, WireReader, DEFAULT_MAX_STRING_LEN};

/// Protocol version compiled into this implementation.
pub const PROTOCOL_VERSION: u8 = 1;

/// Header: version (1) + variant (1) = 2 bytes.
pub const HEADER_SIZE: usize = 2;

/// Most metadata pairs a request can carry (count is a single byte).
pub const MAX_META_PAIRS: usize = u8::MAX as usize;

/// Message variant tag, the second header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Variant {
    /// Sent by the service once per connection with its public parameters.
    Established = 0,
    /// Optional client identification token.
    Identify = 1,
    /// Lookup request for one address.
    Request = 2,
    /// The address falls in a managed range; carries the longest match.
    ResponseOkFound = 3,
    /// The address is not in any managed range.
    ResponseOkNotFound = 4,
    /// Fatal for the connection; the client should try again later.
    ResponseError = 5,
}

impl Variant {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Variant::Established => "Established",
            Variant::Identify => "Identify",
            Variant::Request => "Request",
            Variant::ResponseOkFound => "ResponseOkFound",
            Variant::ResponseOkNotFound => "ResponseOkNotFound",
            Variant::ResponseError => "ResponseError",
        }
    }
}

impl TryFrom<u8> for Variant {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Variant::Established),
            1 => Ok(Variant::Identify),
            2 => Ok(Variant::Request),
            3 => Ok(Variant::ResponseOkFound),
            4 => Ok(Variant::ResponseOkNotFound),
            5 => Ok(Variant::ResponseError),
            other => Err(ProtoError::UnknownVariant(other)),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The two bytes that open every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub protocol_version: u8,
    pub variant: Variant,
}

impl Header {
    pub fn new(variant: Variant) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            variant,
        }
    }

    /// Parse the header and return it with the payload that follows.
    ///
    /// The version is checked before the variant byte is looked at.
    pub fn parse(input: &[u8]) -> Result<(Header, &[u8])> {
        let mut reader = WireReader::new(input);
        let protocol_version = reader.read_u8("protocol_version")?;
        if protocol_version != PROTOCOL_VERSION {
            return Err(ProtoError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                received: protocol_version,
            });
        }
        let variant = Variant::try_from(reader.read_u8("variant")?)?;

        Ok((
            Header {
                protocol_version,
                variant,
            },
            &input[HEADER_SIZE..],
        ))
    }

    pub fn write(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u8(self.protocol_version);
        dst.put_u8(self.variant.as_u8());
    }
}

/// Service parameters announced right after a connection is accepted.
/// Peers should keep the latest copy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Established {
    /// Requests allowed per 5 second window, bursts included.
    pub rate_limit: u32,
    /// Number of ranges in the service's lookup tree.
    pub tree_size: u32,
    /// Seconds between cache refreshes on the service.
    pub cache_ttl: u32,
    /// Seconds a connection may stay idle before the service drops it.
    pub peer_ttl: u32,
    /// Free-form banner, possibly empty.
    pub banner: String,
}

/// Client identification. The token is plaintext on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct Identify {
    pub id: String,
}

impl fmt::Debug for Identify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identify")
            .field("id", &format_args!("<redacted:{} bytes>", self.id.len()))
            .finish()
    }
}

/// Lookup request for one address.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Request {
    pub ip_address: u32,
    /// Opaque key/value pairs; vector order is wire order.
    pub meta: Vec<(String, String)>,
}

impl Request {
    pub fn new(ip_address: u32) -> Self {
        Self {
            ip_address,
            meta: Vec::new(),
        }
    }

    /// Attach metadata from any mapping or pair list.
    ///
    /// Iteration order becomes wire order; the service treats keys as opaque.
    pub fn with_meta<I, K, V>(mut self, meta: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.meta
            .extend(meta.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn meta_count(&self) -> usize {
        self.meta.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseOkFound {
    pub ip_address: u32,
    /// Longest matching prefix.
    pub prefix: u32,
    pub mask_len: u32,
}

impl ResponseOkFound {
    pub fn cidr(&self) -> Cidr {
        Cidr {
            prefix: self.prefix,
            mask_len: self.mask_len,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseOkNotFound {
    pub ip_address: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseError {
    pub code: u8,
    /// Human facing message.
    pub message: String,
}

impl ResponseError {
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::from(self.code)
    }
}

/// Error codes the lookup service puts in `ResponseError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    MalformedPayload,
    RateLimited,
    VersionMismatch,
    InvalidVariant,
    Internal,
    Unknown(u8),
}

impl From<u8> for ErrorCode {
    fn from(code: u8) -> Self {
        match code {
            0 => ErrorCode::MalformedPayload,
            1 => ErrorCode::RateLimited,
            2 => ErrorCode::VersionMismatch,
            3 => ErrorCode::InvalidVariant,
            255 => ErrorCode::Internal,
            other => ErrorCode::Unknown(other),
        }
    }
}

impl From<ErrorCode> for u8 {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::MalformedPayload => 0,
            ErrorCode::RateLimited => 1,
            ErrorCode::VersionMismatch => 2,
            ErrorCode::InvalidVariant => 3,
            ErrorCode::Internal => 255,
            ErrorCode::Unknown(other) => other,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::MalformedPayload => f.write_str("malformed payload"),
            ErrorCode::RateLimited => f.write_str("rate limited"),
            ErrorCode::VersionMismatch => f.write_str("version mismatch"),
            ErrorCode::InvalidVariant => f.write_str("invalid variant"),
            ErrorCode::Internal => f.write_str("internal error"),
            ErrorCode::Unknown(code) => write!(f, "unknown error {code}"),
        }
    }
}

/// A fully parsed protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Established(Established),
    Identify(Identify),
    Request(Request),
    ResponseOkFound(ResponseOkFound),
    ResponseOkNotFound(ResponseOkNotFound),
    ResponseError(ResponseError),
}

impl Message {
    pub fn variant(&self) -> Variant {
        match self {
            Message::Established(_) => Variant::Established,
            Message::Identify(_) => Variant::Identify,
            Message::Request(_) => Variant::Request,
            Message::ResponseOkFound(_) => Variant::ResponseOkFound,
            Message::ResponseOkNotFound(_) => Variant::ResponseOkNotFound,
            Message::ResponseError(_) => Variant::ResponseError,
        }
    }

    /// Append the header and payload to `dst`.
    ///
    /// On error `dst` may hold a partial message; callers encode into a
    /// scratch buffer (see [`Message::to_bytes`]).
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        Header::new(self.variant()).write(dst);

        match self {
            Message::Established(m) => {
                dst.put_u32(m.rate_limit);
                dst.put_u32(m.tree_size);
                dst.put_u32(m.cache_ttl);
                dst.put_u32(m.peer_ttl);
                put_cstr(dst, &m.banner, "banner")?;
            }
            Message::Identify(m) => put_cstr(dst, &m.id, "id")?,
            Message::Request(m) => {
                if m.meta.len() > MAX_META_PAIRS {
                    return Err(ProtoError::TooManyMetaPairs(m.meta.len()));
                }
                dst.put_u32(m.ip_address);
                dst.put_u8(m.meta.len() as u8);
                for (key, value) in &m.meta {
                    put_cstr(dst, key, "meta key")?;
                    put_cstr(dst, value, "meta value")?;
                }
            }
            Message::ResponseOkFound(m) => {
                dst.put_u32(m.ip_address);
                dst.put_u32(m.prefix);
                dst.put_u32(m.mask_len);
            }
            Message::ResponseOkNotFound(m) => dst.put_u32(m.ip_address),
            Message::ResponseError(m) => {
                dst.put_u8(m.code);
                put_cstr(dst, &m.message, "message")?;
            }
        }
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(32);
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode one complete message with the default string scan bound.
    pub fn decode(input: &[u8]) -> Result<Message> {
        Self::decode_with_limit(input, DEFAULT_MAX_STRING_LEN)
    }

    /// Decode one complete message; string scans stop after `max_string_len`.
    pub fn decode_with_limit(input: &[u8], max_string_len: usize) -> Result<Message> {
        let (header, payload) = Header::parse(input)?;
        let mut r = WireReader::with_max_string_len(payload, max_string_len);

        let message = match header.variant {
            Variant::Established => Message::Established(Established {
                rate_limit: r.read_u32("rate_limit")?,
                tree_size: r.read_u32("tree_size")?,
                cache_ttl: r.read_u32("cache_ttl")?,
                peer_ttl: r.read_u32("peer_ttl")?,
                banner: r.read_cstr("banner")?.to_string(),
            }),
            Variant::Identify => Message::Identify(Identify {
                id: r.read_cstr("id")?.to_string(),
            }),
            Variant::Request => {
                let ip_address = r.read_u32("ip_address")?;
                let count = r.read_u8("meta_count")? as usize;
                // Each pair needs at least two terminators; bound the
                // allocation by what the payload can actually hold.
                let mut meta = Vec::with_capacity(count.min(r.remaining() / 2));
                for _ in 0..count {
                    let key = r.read_cstr("meta key")?.to_string();
                    let value = r.read_cstr("meta value")?.to_string();
                    meta.push((key, value));
                }
                Message::Request(Request { ip_address, meta })
            }
            Variant::ResponseOkFound => {
                let found = ResponseOkFound {
                    ip_address: r.read_u32("ip_address")?,
                    prefix: r.read_u32("prefix")?,
                    mask_len: r.read_u32("mask_len")?,
                };
                if found.mask_len > 32 {
                    return Err(ProtoError::InvalidMaskLength(found.mask_len));
                }
                Message::ResponseOkFound(found)
            }
            Variant::ResponseOkNotFound => Message::ResponseOkNotFound(ResponseOkNotFound {
                ip_address: r.read_u32("ip_address")?,
            }),
            Variant::ResponseError => Message::ResponseError(ResponseError {
                code: r.read_u8("code")?,
                message: r.read_cstr("message")?.to_string(),
            }),
        };

        r.finish()?;
        Ok(message)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Established(m) => write!(
                f,
                "Established(rate_limit={}, tree_size={}, cache_ttl={}, peer_ttl={})",
                m.rate_limit, m.tree_size, m.cache_ttl, m.peer_ttl
            ),
            Message::Identify(_) => f.write_str("Identify"),
            Message::Request(m) => write!(
                f,
                "Request({}, meta_count={})",
                format_ipv4(m.ip_address),
                m.meta.len()
            ),
            Message::ResponseOkFound(m) => {
                write!(f, "ResponseOkFound({} in {})", format_ipv4(m.ip_address), m.cidr())
            }
            Message::ResponseOkNotFound(m) => {
                write!(f, "ResponseOkNotFound({})", format_ipv4(m.ip_address))
            }
            Message::ResponseError(m) => {
                write!(f, "ResponseError({}: {})", m.error_code(), m.message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn roundtrip(message: Message) {
        let bytes = message.to_bytes().unwrap();
        assert_eq!(bytes[0], PROTOCOL_VERSION);
        assert_eq!(bytes[1], message.variant().as_u8());
        assert_eq!(Message::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn established_roundtrip_boundaries() {
        roundtrip(Message::Established(Established {
            rate_limit: 10,
            tree_size: 123_456,
            cache_ttl: 86_400,
            peer_ttl: 15,
            banner: "welcome".to_string(),
        }));
        roundtrip(Message::Established(Established {
            rate_limit: u32::MAX,
            tree_size: 0,
            cache_ttl: u32::MAX,
            peer_ttl: 0,
            banner: String::new(),
        }));
    }

    #[test]
    fn identify_roundtrip() {
        roundtrip(Message::Identify(Identify {
            id: "fishy".to_string(),
        }));
        roundtrip(Message::Identify(Identify { id: String::new() }));
    }

    #[test]
    fn request_roundtrip_boundaries() {
        roundtrip(Message::Request(Request::new(0)));
        roundtrip(Message::Request(Request::new(u32::MAX)));

        let full = Request::new(0x0101_0101).with_meta((0..MAX_META_PAIRS).map(|i| {
            let value = if i % 2 == 0 {
                String::new()
            } else {
                format!("v{i}")
            };
            (format!("k{i}"), value)
        }));
        assert_eq!(full.meta_count(), 255);
        roundtrip(Message::Request(full));
    }

    #[test]
    fn responses_roundtrip_boundaries() {
        for ip in [0, u32::MAX] {
            roundtrip(Message::ResponseOkFound(ResponseOkFound {
                ip_address: ip,
                prefix: ip,
                mask_len: 32,
            }));
            roundtrip(Message::ResponseOkNotFound(ResponseOkNotFound { ip_address: ip }));
        }
        roundtrip(Message::ResponseOkFound(ResponseOkFound {
            ip_address: 0xCB00_7107,
            prefix: 0xCB00_7100,
            mask_len: 0,
        }));
        roundtrip(Message::ResponseError(ResponseError {
            code: 1,
            message: "rate limited".to_string(),
        }));
        roundtrip(Message::ResponseError(ResponseError {
            code: 255,
            message: String::new(),
        }));
    }

    #[test]
    #[rustfmt::skip]
    fn request_wire_layout_is_big_endian() {
        let request = Request::new(0x0102_0304).with_meta([("foo", "bar")]);
        let bytes = Message::Request(request).to_bytes().unwrap();
        assert_eq!(bytes.as_ref(), &[
            PROTOCOL_VERSION, Variant::Request as u8,
            0x01, 0x02, 0x03, 0x04, // IP address
            0x01,                   // meta count
            b'f', b'o', b'o', 0x00,
            b'b', b'a', b'r', 0x00,
        ]);
    }

    #[test]
    #[rustfmt::skip]
    fn decode_found_response() {
        let payload: &[u8] = &[
            PROTOCOL_VERSION, Variant::ResponseOkFound as u8,
            0xCB, 0x00, 0x71, 0x07, // 203.0.113.7
            0xCB, 0x00, 0x71, 0x00, // 203.0.113.0
            0x00, 0x00, 0x00, 0x18, // /24
        ];
        let Message::ResponseOkFound(found) = Message::decode(payload).unwrap() else {
            panic!("expected found response");
        };
        assert_eq!(found.cidr().to_string(), "203.0.113.0/24");
    }

    #[test]
    fn request_meta_from_hashmap() {
        let mut meta = HashMap::new();
        meta.insert("steamid", "STEAM_0:1:23");
        meta.insert("name", "player");
        let request = Request::new(1).with_meta(meta.clone());

        let bytes = Message::Request(request.clone()).to_bytes().unwrap();
        let Message::Request(decoded) = Message::decode(&bytes).unwrap() else {
            panic!("expected request");
        };
        assert_eq!(decoded, request);
        let decoded_map: HashMap<_, _> = decoded
            .meta
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(decoded_map, meta);
    }

    #[test]
    fn too_many_meta_pairs_rejected() {
        let request = Request::new(1).with_meta((0..256).map(|i| (i.to_string(), "")));
        assert_eq!(
            Message::Request(request).to_bytes(),
            Err(ProtoError::TooManyMetaPairs(256))
        );
    }

    #[test]
    fn interior_nul_rejected_on_encode() {
        let err = Message::Identify(Identify {
            id: "a\0b".to_string(),
        })
        .to_bytes()
        .unwrap_err();
        assert_eq!(err, ProtoError::InteriorNul { field: "id" });
    }

    #[test]
    fn header_version_checked_first() {
        // Wrong version with an unknown variant still reports the version.
        let err = Header::parse(&[0x64, 0x64]).unwrap_err();
        assert_eq!(
            err,
            ProtoError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                received: 0x64
            }
        );
        assert!(err.is_fatal());
        // Wrong version on an otherwise empty frame too.
        assert!(matches!(
            Message::decode(&[2]),
            Err(ProtoError::VersionMismatch { received: 2, .. })
        ));
    }

    #[test]
    fn header_rejects_unknown_variant() {
        assert_eq!(
            Header::parse(&[PROTOCOL_VERSION, 6]).unwrap_err(),
            ProtoError::UnknownVariant(6)
        );
    }

    #[test]
    fn header_parse_returns_payload() {
        let (header, rest) = Header::parse(&[PROTOCOL_VERSION, 4, 9, 9]).unwrap();
        assert_eq!(header.variant, Variant::ResponseOkNotFound);
        assert_eq!(rest, &[9, 9]);
    }

    #[test]
    fn truncated_and_garbage_frames_fail_cleanly() {
        let full = Message::ResponseOkFound(ResponseOkFound {
            ip_address: 1,
            prefix: 0,
            mask_len: 8,
        })
        .to_bytes()
        .unwrap();

        for len in 0..full.len() {
            assert!(
                Message::decode(&full[..len]).is_err(),
                "prefix of {len} bytes should not decode"
            );
        }

        assert_eq!(
            Message::decode(&[PROTOCOL_VERSION, 5, 1, b'x']),
            Err(ProtoError::UnterminatedString {
                field: "message",
                scanned: 1
            })
        );
        assert!(matches!(
            Message::decode(&[PROTOCOL_VERSION, 2, 0, 0, 0, 1, 200, b'k', 0]),
            Err(ProtoError::UnterminatedString { .. })
        ));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = BytesMut::from(
            Message::ResponseOkNotFound(ResponseOkNotFound { ip_address: 7 })
                .to_bytes()
                .unwrap()
                .as_ref(),
        );
        bytes.put_u8(0);
        assert_eq!(
            Message::decode(&bytes),
            Err(ProtoError::TrailingBytes(1))
        );
    }

    #[test]
    fn found_with_oversized_mask_rejected() {
        let bytes = Message::ResponseOkFound(ResponseOkFound {
            ip_address: 1,
            prefix: 0,
            mask_len: 33,
        })
        .to_bytes()
        .unwrap();
        assert_eq!(
            Message::decode(&bytes),
            Err(ProtoError::InvalidMaskLength(33))
        );
    }

    #[test]
    fn string_scan_limit_applies() {
        let bytes = Message::Established(Established {
            banner: "x".repeat(100),
            ..Established::default()
        })
        .to_bytes()
        .unwrap();
        assert!(Message::decode_with_limit(&bytes, 100).is_ok());
        assert!(matches!(
            Message::decode_with_limit(&bytes, 99),
            Err(ProtoError::UnterminatedString { field: "banner", .. })
        ));
    }

    #[test]
    fn error_codes_map_both_ways() {
        for code in 0..=u8::MAX {
            assert_eq!(u8::from(ErrorCode::from(code)), code);
        }
        assert_eq!(ErrorCode::from(1), ErrorCode::RateLimited);
        assert_eq!(ErrorCode::from(42), ErrorCode::Unknown(42));
    }

    #[test]
    fn identify_debug_redacts_token() {
        let identify = Identify {
            id: "super-secret".to_string(),
        };
        let debug = format!("{identify:?}");
        assert!(debug.contains("<redacted:12 bytes>"));
        assert!(!debug.contains("super-secret"));
    }
}
