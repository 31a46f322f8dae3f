use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use cidrq_transport::LookupStream;

use crate::codec::{decode_record, FrameConfig, Record};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;
const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Reads complete records from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete records.
pub struct RecordReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> RecordReader<T> {
    /// Create a new record reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new record reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete record (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_record(&mut self) -> Result<Record> {
        loop {
            if let Some(record) = decode_record(&mut self.buf, self.config.max_payload_size)? {
                return Ok(record);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current record reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl RecordReader<LookupStream> {
    /// Create a record reader for `LookupStream` and apply read timeout from config.
    pub fn with_config_tcp(inner: LookupStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: cidrq_transport::TransportError) -> FrameError {
    match err {
        cidrq_transport::TransportError::Io(io) => FrameError::Io(io),
        cidrq_transport::TransportError::Resolve { source, .. }
        | cidrq_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::net::{TcpListener, TcpStream};

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::{encode_record, MAGIC};

    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn read_single_record() {
        let mut wire = BytesMut::new();
        encode_record(b"hello", &mut wire).unwrap();

        let mut reader = RecordReader::new(Cursor::new(wire.to_vec()));
        let record = reader.read_record().unwrap();

        assert_eq!(record.payload.as_ref(), b"hello");
    }

    #[test]
    fn read_multiple_records() {
        let mut wire = BytesMut::new();
        encode_record(b"one", &mut wire).unwrap();
        encode_record(b"two", &mut wire).unwrap();
        encode_record(b"three", &mut wire).unwrap();

        let mut reader = RecordReader::new(Cursor::new(wire.to_vec()));

        assert_eq!(reader.read_record().unwrap().payload.as_ref(), b"one");
        assert_eq!(reader.read_record().unwrap().payload.as_ref(), b"two");
        assert_eq!(reader.read_record().unwrap().payload.as_ref(), b"three");
    }

    #[test]
    fn partial_read_handling() {
        let mut wire = BytesMut::new();
        encode_record(b"slow", &mut wire).unwrap();

        let byte_reader = ByteByByteReader {
            bytes: wire.to_vec(),
            pos: 0,
        };
        let mut reader = RecordReader::new(byte_reader);

        let record = reader.read_record().unwrap();
        assert_eq!(record.payload.as_ref(), b"slow");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = RecordReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_record().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_record() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u32(16);
        partial.put_slice(b"only-part");

        let mut reader = RecordReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_record().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn invalid_magic_in_stream() {
        let bytes = vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x00];
        let mut reader = RecordReader::new(Cursor::new(bytes));
        let err = reader.read_record().unwrap_err();
        assert!(matches!(err, FrameError::InvalidMagic));
    }

    #[test]
    fn oversized_record_in_stream() {
        let mut wire = BytesMut::new();
        wire.put_slice(&MAGIC);
        wire.put_u32(1024);

        let cfg = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = RecordReader::with_config(Cursor::new(wire.to_vec()), cfg);
        let err = reader.read_record().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn roundtrip_over_tcp() {
        let (left, right) = tcp_pair();
        let mut writer = crate::writer::RecordWriter::new(left);
        let mut reader = RecordReader::new(right);

        writer.send(b"ping").unwrap();
        writer.send(b"pong").unwrap();

        assert_eq!(reader.read_record().unwrap().payload.as_ref(), b"ping");
        assert_eq!(reader.read_record().unwrap().payload.as_ref(), b"pong");
    }

    #[test]
    fn interrupted_read_retries() {
        let mut wire = BytesMut::new();
        encode_record(b"ok", &mut wire).unwrap();

        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire.to_vec()),
        };
        let mut framed = RecordReader::new(reader);
        let record = framed.read_record().unwrap();

        assert_eq!(record.payload.as_ref(), b"ok");
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn read_timeout_surfaces_as_io_error() {
        let (left, right) = tcp_pair();
        let cfg = FrameConfig {
            read_timeout: Some(std::time::Duration::from_millis(20)),
            ..FrameConfig::default()
        };
        let mut reader =
            RecordReader::with_config_tcp(LookupStream::from_tcp(right), cfg).unwrap();

        let err = reader.read_record().unwrap_err();
        let FrameError::Io(e) = err else {
            panic!("expected io error, got {err:?}");
        };
        assert!(matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut));
        drop(left);
    }
}
