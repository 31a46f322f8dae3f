//! `tokio_util::codec` adapter for the record layer.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_record, encode_record, Record, DEFAULT_MAX_PAYLOAD};
use crate::error::{FrameError, Result};

/// Record codec for use with `tokio_util::codec::Framed`.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    max_payload_size: usize,
}

impl RecordCodec {
    pub fn new() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Override the maximum accepted payload size.
    pub fn with_max_payload(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }
}

impl Default for RecordCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RecordCodec {
    type Item = Record;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Record>> {
        decode_record(src, self.max_payload_size)
    }
}

impl Encoder<Bytes> for RecordCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        if item.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: item.len(),
                max: self.max_payload_size,
            });
        }
        encode_record(&item, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[test]
    fn decoder_waits_for_complete_record() {
        let mut codec = RecordCodec::new();
        let mut wire = BytesMut::new();
        encode_record(b"split", &mut wire).unwrap();
        let tail = wire.split_off(4);

        assert!(codec.decode(&mut wire).unwrap().is_none());
        wire.extend_from_slice(&tail);
        let record = codec.decode(&mut wire).unwrap().unwrap();
        assert_eq!(record.payload.as_ref(), b"split");
    }

    #[test]
    fn encoder_enforces_max_payload() {
        let mut codec = RecordCodec::new().with_max_payload(2);
        let mut dst = BytesMut::new();
        let err = codec
            .encode(Bytes::from_static(b"abc"), &mut dst)
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(dst.is_empty());
    }

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut sink = FramedWrite::new(client, RecordCodec::new());
        let mut stream = FramedRead::new(server, RecordCodec::new());

        sink.send(Bytes::from_static(b"first")).await.unwrap();
        sink.send(Bytes::from_static(b"second")).await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(first.payload.as_ref(), b"first");
        assert_eq!(second.payload.as_ref(), b"second");
    }
}
