//! Bounds-checked field reads and writes.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{ProtoError, Result};

/// Default upper bound for a NUL-terminated string scan.
///
/// Equal to the largest record the transport accepts; no string can be longer
/// than the message carrying it.
pub const DEFAULT_MAX_STRING_LEN: usize = cidrq_frame::DEFAULT_MAX_PAYLOAD;

/// Cursor over a received message body.
///
/// Every read checks the remaining length first, so a truncated or garbage
/// message produces an error instead of reading past the buffer.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    max_string_len: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_max_string_len(buf, DEFAULT_MAX_STRING_LEN)
    }

    pub fn with_max_string_len(buf: &'a [u8], max_string_len: usize) -> Self {
        Self {
            buf,
            max_string_len,
        }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8> {
        self.ensure(field, 1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32> {
        self.ensure(field, 4)?;
        Ok(self.buf.get_u32())
    }

    /// Read a NUL-terminated UTF-8 string, consuming the terminator.
    pub fn read_cstr(&mut self, field: &'static str) -> Result<&'a str> {
        let window = self.buf.len().min(self.max_string_len.saturating_add(1));
        let Some(end) = self.buf[..window].iter().position(|&b| b == 0) else {
            return Err(ProtoError::UnterminatedString {
                field,
                scanned: window,
            });
        };

        let text =
            std::str::from_utf8(&self.buf[..end]).map_err(|_| ProtoError::InvalidUtf8 { field })?;
        self.buf = &self.buf[end + 1..];
        Ok(text)
    }

    /// Assert the whole message was consumed.
    pub fn finish(self) -> Result<()> {
        match self.buf.len() {
            0 => Ok(()),
            n => Err(ProtoError::TrailingBytes(n)),
        }
    }

    fn ensure(&self, field: &'static str, needed: usize) -> Result<()> {
        if self.buf.len() < needed {
            return Err(ProtoError::Truncated {
                field,
                needed,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }
}

/// Append `value` followed by a NUL terminator.
pub fn put_cstr(dst: &mut BytesMut, value: &str, field: &'static str) -> Result<()> {
    if value.as_bytes().contains(&0) {
        return Err(ProtoError::InteriorNul { field });
    }
    dst.reserve(value.len() + 1);
    dst.put_slice(value.as_bytes());
    dst.put_u8(0);
    Ok(())
}
