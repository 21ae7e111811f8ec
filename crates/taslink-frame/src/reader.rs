use std::io::Read;

use bytes::BytesMut;

use crate::codec::{decode_header, Frame, FrameConfig, HEADER_SIZE};
use crate::error::Result;
use crate::io::IoRetry;

/// Reads complete frames from any `Read` stream.
///
/// Reads exactly one header, validates the declared length against
/// [`FrameConfig::max_payload_size`], then reads exactly that many payload
/// bytes. Nothing beyond the current frame is consumed, so a reader can be
/// rebuilt around the same stream between frames.
pub struct FrameReader<T> {
    inner: T,
    config: FrameConfig,
    retry: IoRetry,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            config,
            retry: IoRetry::default(),
        }
    }

    /// Use `retry` for error classification and cancellation.
    pub fn with_retry(mut self, retry: IoRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Read the next complete frame (blocking).
    ///
    /// An oversized header fails with `FrameTooLarge` before any payload
    /// byte is read or allocated.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let mut raw = [0u8; HEADER_SIZE];
        self.retry.read_exact(&mut self.inner, &mut raw)?;
        let header = decode_header(&raw);

        let payload_len = match header.checked_len(self.config.max_payload_size) {
            Ok(len) => len,
            Err(err) => {
                self.retry.classifier().record_fatal("read", err.to_string());
                return Err(err);
            }
        };

        let mut payload = BytesMut::zeroed(payload_len);
        self.retry.read_exact(&mut self.inner, &mut payload)?;

        Ok(Frame {
            kind: header.kind,
            payload: payload.freeze(),
        })
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}
