//! Dotted-quad text <-> 32-bit address conversion.
//!
//! The integer form is the address in network byte order read as a `u32`,
//! so `"1.2.3.4"` is `0x0102_0304`.

use std::fmt;

use crate::error::{ProtoError, Result};

/// Parse exactly four dot-separated decimal octets.
///
/// `"0.0.0.0"` is a valid address and yields `Ok(0)`; failure is always an
/// `Err`.
pub fn parse_ipv4(text: &str) -> Result<u32> {
    let invalid = || ProtoError::InvalidAddress(text.to_string());

    let mut value: u32 = 0;
    let mut octets = 0usize;

    for part in text.split('.') {
        octets += 1;
        if octets > 4 || part.is_empty() || part.len() > 3 {
            return Err(invalid());
        }
        if !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let octet: u32 = part.parse().map_err(|_| invalid())?;
        if octet > 255 {
            return Err(invalid());
        }
        value = (value << 8) | octet;
    }

    if octets != 4 {
        return Err(invalid());
    }
    Ok(value)
}

/// Format an address as four dot-separated decimal octets.
pub fn format_ipv4(addr: u32) -> String {
    let [a, b, c, d] = addr.to_be_bytes();
    format!("{a}.{b}.{c}.{d}")
}

/// Parse and re-format, so `"010.0.0.1"` and `"10.0.0.1"` compare equal.
pub fn normalize_ipv4(text: &str) -> Result<String> {
    parse_ipv4(text).map(format_ipv4)
}

/// A CIDR range: prefix address and mask length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    pub prefix: u32,
    pub mask_len: u32,
}

impl Cidr {
    pub fn new(prefix: u32, mask_len: u32) -> Result<Self> {
        if mask_len > 32 {
            return Err(ProtoError::InvalidMaskLength(mask_len));
        }
        Ok(Self { prefix, mask_len })
    }

    /// Netmask for the prefix length (`/24` → `0xFFFF_FF00`).
    pub fn netmask(&self) -> u32 {
        match self.mask_len {
            0 => 0,
            n => u32::MAX << (32 - n.min(32)),
        }
    }

    /// Whether `addr` falls inside this range.
    pub fn contains(&self, addr: u32) -> bool {
        let mask = self.netmask();
        addr & mask == self.prefix & mask
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", format_ipv4(self.prefix), self.mask_len)
    }
}

impl std::str::FromStr for Cidr {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| ProtoError::InvalidAddress(s.to_string()))?;
        let mask_len: u32 = len
            .parse()
            .map_err(|_| ProtoError::InvalidAddress(s.to_string()))?;
        Cidr::new(parse_ipv4(addr)?, mask_len)
    }
}
