use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: length (4) + kind (1) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Largest payload the 4-byte length field can describe.
pub const MAX_WIRE_PAYLOAD: usize = u32::MAX as usize;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// A framed message tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message discriminant; its meaning belongs to the application.
    pub kind: u8,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(kind: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// A decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length in bytes, header excluded.
    pub len: u32,
    pub kind: u8,
}

impl FrameHeader {
    /// Payload length, rejected if it exceeds `max_payload`.
    pub fn checked_len(&self, max_payload: usize) -> Result<usize> {
        let len = self.len as usize;
        if len > max_payload {
            return Err(FrameError::FrameTooLarge {
                size: len,
                max: max_payload,
            });
        }
        Ok(len)
    }
}

/// Encode a frame header.
pub fn encode_header(kind: u8, payload_len: usize) -> Result<[u8; HEADER_SIZE]> {
    let len = u32::try_from(payload_len).map_err(|_| FrameError::FrameTooLarge {
        size: payload_len,
        max: MAX_WIRE_PAYLOAD,
    })?;
    let mut header = [0u8; HEADER_SIZE];
    header[..4].copy_from_slice(&len.to_be_bytes());
    header[4] = kind;
    Ok(header)
}

/// Decode a frame header. Never fails; the length still has to be checked
/// against the configured maximum before any payload is read.
pub fn decode_header(header: &[u8; HEADER_SIZE]) -> FrameHeader {
    FrameHeader {
        len: u32::from_be_bytes([header[0], header[1], header[2], header[3]]),
        kind: header[4],
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────┬─────────────────┐
/// │ Length       │ Kind     │ Payload         │
/// │ (4B BE)      │ (1B)     │ (Length bytes)  │
/// └──────────────┴──────────┴─────────────────┘
/// ```
pub fn encode_frame(kind: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let header = encode_header(kind, payload.len())?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&header);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from an accumulated buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some(header) = src.get(..HEADER_SIZE) else {
        return Ok(None);
    };
    let mut raw = [0u8; HEADER_SIZE];
    raw.copy_from_slice(header);
    let header = decode_header(&raw);
    let payload_len = header.checked_len(max_payload)?;

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame {
        kind: header.kind,
        payload,
    }))
}

/// Configuration for frame readers and writers.
///
/// Socket timeouts belong to the stream, not the framing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip_all_kinds() {
        let payloads: [&[u8]; 3] = [b"", b"HELLO", &[0xAB; 300]];
        for kind in 0..=u8::MAX {
            for payload in payloads {
                let mut buf = BytesMut::new();
                encode_frame(kind, payload, &mut buf).unwrap();
                assert_eq!(buf.len(), HEADER_SIZE + payload.len());

                let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
                    .unwrap()
                    .unwrap();
                assert_eq!(frame.kind, kind);
                assert_eq!(frame.payload.as_ref(), payload);
                assert!(buf.is_empty());
            }
        }
    }

    #[test]
    fn test_header_is_big_endian() {
        let header = encode_header(7, 0x0102_0304).unwrap();
        assert_eq!(header, [0x01, 0x02, 0x03, 0x04, 0x07]);

        let decoded = decode_header(&header);
        assert_eq!(
            decoded,
            FrameHeader {
                len: 0x0102_0304,
                kind: 7
            }
        );
    }

    #[test]
    fn test_hello_wire_bytes() {
        let mut buf = BytesMut::new();
        encode_frame(1, b"HELLO", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), b"\x00\x00\x00\x05\x01HELLO");
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x00][..]);
        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), 3, "incomplete input must not be consumed");
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(1, b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u32(1024 * 1024 * 32);
        buf.put_u8(1);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(
            result,
            Err(FrameError::FrameTooLarge { size, max })
                if size == 32 * 1024 * 1024 && max == DEFAULT_MAX_PAYLOAD
        ));
    }

    #[test]
    fn test_checked_len_boundary() {
        let header = FrameHeader { len: 16, kind: 0 };
        assert_eq!(header.checked_len(16).unwrap(), 16);
        assert!(header.checked_len(15).is_err());
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(1, b"first", &mut buf).unwrap();
        encode_frame(2, b"second", &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(f1, Frame::new(1, &b"first"[..]));

        let f2 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(f2, Frame::new(2, &b"second"[..]));

        assert!(buf.is_empty());
    }

    #[test]
    fn test_frame_wire_size() {
        let frame = Frame::new(1, Bytes::from_static(b"test"));
        assert_eq!(frame.wire_size(), HEADER_SIZE + 4);
    }
}
