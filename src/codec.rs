//! EtherNet/IP codec for tokio.
//!
//! This module provides a codec implementation for encoding and decoding
//! encapsulation frames using the tokio-util codec framework. Frames are
//! length-prefixed by the CSD length field at offset 2, so the decoder
//! buffers partial frames until a full `24 + length` bytes are available
//! and splits coalesced frames apart one per call - devices routinely
//! pack several replies into a single TCP segment.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::EnipError;
use crate::types::{EncapFrame, HEADER_SIZE};

/// Offset of the CSD length field inside the header.
const LENGTH_OFFSET: usize = 2;

/// EtherNet/IP encapsulation codec.
///
/// # Example
///
/// ```rust,ignore
/// use tokio_util::codec::Framed;
/// use voltage_enip::codec::EnipCodec;
///
/// let stream = TcpStream::connect("192.168.1.10:44818").await?;
/// let mut framed = Framed::new(stream, EnipCodec::new());
///
/// framed.send(EncapFrame::register_session()).await?;
/// while let Some(frame) = framed.next().await {
///     println!("Received: {}", frame?);
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct EnipCodec;

impl EnipCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for EnipCodec {
    type Item = EncapFrame;
    type Error = EnipError;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        // The declared CSD length sits right after the command word; four
        // bytes are enough to know the full frame size.
        if src.len() < LENGTH_OFFSET + 2 {
            return Ok(None);
        }

        let csd_len = u16::from_le_bytes([src[LENGTH_OFFSET], src[LENGTH_OFFSET + 1]]) as usize;
        let total_len = HEADER_SIZE + csd_len;

        if src.len() < total_len {
            // Partial frame: reserve what is still missing and wait for
            // the next read to complete it.
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        let frame_bytes = src.split_to(total_len);
        let frame = EncapFrame::parse(&frame_bytes)?;
        tracing::trace!(frame = %frame, "decoded frame");
        Ok(Some(frame))
    }
}

impl Encoder<EncapFrame> for EnipCodec {
    type Error = EnipError;

    fn encode(
        &mut self,
        item: EncapFrame,
        dst: &mut BytesMut,
    ) -> std::result::Result<(), Self::Error> {
        item.encode(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_decode_single_frame() {
        let mut codec = EnipCodec::new();
        let mut buf = BytesMut::from(&EncapFrame::register_session().to_bytes().unwrap()[..]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert!(frame.is_register_session());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_partial_frame_buffered() {
        let mut codec = EnipCodec::new();
        let bytes = EncapFrame::register_session().to_bytes().unwrap();

        // First two bytes: not even the length field yet
        let mut buf = BytesMut::from(&bytes[..2]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        // Header complete, CSD still missing
        buf.extend_from_slice(&bytes[2..26]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        // Remainder arrives in a later read
        buf.extend_from_slice(&bytes[26..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert!(frame.is_register_session());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_concatenated_frames() {
        let mut codec = EnipCodec::new();
        let first = EncapFrame::register_session().to_bytes().unwrap();
        let second = EncapFrame::send_rr_data(0x55, Bytes::from_static(&[0xCC, 0x00, 0x00, 0x00]))
            .to_bytes()
            .unwrap();

        // One TCP delivery carrying both replies
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&first);
        buf.extend_from_slice(&second);

        let one = codec.decode(&mut buf).unwrap().unwrap();
        assert!(one.is_register_session());
        let two = codec.decode(&mut buf).unwrap().unwrap();
        assert!(two.is_send_rr_data());
        // No residual bytes, and no third frame
        assert!(buf.is_empty());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_propagates_structural_errors() {
        let mut codec = EnipCodec::new();
        let mut bytes = EncapFrame::nop().to_bytes().unwrap().to_vec();
        bytes[0] = 0xEE;
        let mut buf = BytesMut::from(&bytes[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(EnipError::UnknownCommand(0x00EE))
        ));
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut codec = EnipCodec::new();
        let frame = EncapFrame::send_rr_data(0xABCD, Bytes::from_static(&[0x01, 0x02, 0x03]));

        let mut buf = BytesMut::new();
        codec.encode(frame.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_decode_empty_buffer() {
        let mut codec = EnipCodec::new();
        let mut buf = BytesMut::new();
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
