use std::io::{Read, Write};
use std::sync::Arc;

use taslink_transport::{CancelToken, ErrorClass, ErrorClassifier};

use crate::error::{FrameError, Result};

/// Partial-transfer retry loop shared by [`FrameReader`](crate::FrameReader)
/// and [`FrameWriter`](crate::FrameWriter).
///
/// Each call moves exactly the requested bytes or fails:
/// - a call that moves 0 bytes means the peer closed: [`FrameError::ConnectionClosed`]
/// - a short transfer advances the offset and tries the remainder
/// - errors go through the [`ErrorClassifier`]; transient ones retry the same
///   sub-range, fatal ones are returned as [`FrameError::Io`]
///
/// The cancel token is checked before every attempt, so no new I/O starts
/// after shutdown is requested.
#[derive(Debug, Clone, Default)]
pub struct IoRetry {
    classifier: Arc<ErrorClassifier>,
    cancel: Option<CancelToken>,
}

impl IoRetry {
    /// Retry loop reporting into a shared classifier.
    pub fn new(classifier: Arc<ErrorClassifier>) -> Self {
        Self {
            classifier,
            cancel: None,
        }
    }

    /// Stop before the next attempt once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// The classifier errors are reported to.
    pub fn classifier(&self) -> &Arc<ErrorClassifier> {
        &self.classifier
    }

    /// Fill `buf` completely from `src`.
    pub fn read_exact<R: Read + ?Sized>(&self, src: &mut R, buf: &mut [u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < buf.len() {
            self.check_cancelled()?;
            match src.read(&mut buf[offset..]) {
                Ok(0) => {
                    self.classifier.record_fatal("read", "peer closed the connection");
                    return Err(FrameError::ConnectionClosed);
                }
                Ok(n) => offset += n,
                Err(err) => self.retry_or_fail(err, "read")?,
            }
        }
        Ok(())
    }

    /// Write all of `buf` to `dst`.
    pub fn write_all<W: Write + ?Sized>(&self, dst: &mut W, buf: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < buf.len() {
            self.check_cancelled()?;
            match dst.write(&buf[offset..]) {
                Ok(0) => {
                    self.classifier.record_fatal("write", "peer accepted no bytes");
                    return Err(FrameError::ConnectionClosed);
                }
                Ok(n) => offset += n,
                Err(err) => self.retry_or_fail(err, "write")?,
            }
        }
        Ok(())
    }

    /// Flush `dst`, retrying transient failures.
    pub fn flush<W: Write + ?Sized>(&self, dst: &mut W) -> Result<()> {
        loop {
            self.check_cancelled()?;
            match dst.flush() {
                Ok(()) => return Ok(()),
                Err(err) => self.retry_or_fail(err, "flush")?,
            }
        }
    }

    fn retry_or_fail(&self, err: std::io::Error, context: &'static str) -> Result<()> {
        match self.classifier.classify(&err, context) {
            ErrorClass::Success | ErrorClass::Transient => Ok(()),
            ErrorClass::Fatal => Err(FrameError::Io(err)),
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(cancel) if cancel.is_cancelled() => Err(FrameError::Cancelled),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind};

    use super::*;

    /// Fails each call with the queued errors before serving data.
    struct Scripted {
        errors: Vec<ErrorKind>,
        data: Cursor<Vec<u8>>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if let Some(kind) = self.errors.pop() {
                return Err(std::io::Error::from(kind));
            }
            self.data.read(buf)
        }
    }

    #[test]
    fn read_exact_retries_transient_errors() {
        let retry = IoRetry::default();
        let mut src = Scripted {
            errors: vec![ErrorKind::TimedOut, ErrorKind::WouldBlock, ErrorKind::Interrupted],
            data: Cursor::new(b"abcdef".to_vec()),
        };
        let mut buf = [0u8; 6];
        retry.read_exact(&mut src, &mut buf).unwrap();
        assert_eq!(&buf, b"abcdef");

        let last = retry.classifier().last_error().unwrap();
        assert_eq!(last.class, ErrorClass::Transient);
    }

    #[test]
    fn read_exact_fails_on_fatal_error() {
        let retry = IoRetry::default();
        let mut src = Scripted {
            errors: vec![ErrorKind::ConnectionReset],
            data: Cursor::new(b"abc".to_vec()),
        };
        let mut buf = [0u8; 3];
        let err = retry.read_exact(&mut src, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::ConnectionReset));
        assert!(err_is_recorded_fatal(&retry));
    }

    #[test]
    fn read_exact_zero_bytes_is_peer_close() {
        let retry = IoRetry::default();
        let mut src = Cursor::new(b"ab".to_vec());
        let mut buf = [0u8; 4];
        let err = retry.read_exact(&mut src, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert!(err_is_recorded_fatal(&retry));
    }

    #[test]
    fn empty_buffer_needs_no_io() {
        let retry = IoRetry::default();
        let mut src = Cursor::new(Vec::<u8>::new());
        retry.read_exact(&mut src, &mut []).unwrap();
    }

    #[test]
    fn cancelled_retry_starts_no_io() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let retry = IoRetry::default().with_cancel(cancel);

        let mut src = Cursor::new(b"abc".to_vec());
        let mut buf = [0u8; 3];
        let err = retry.read_exact(&mut src, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::Cancelled));
        assert!(!err.is_fatal());
        assert_eq!(src.position(), 0);
    }

    #[test]
    fn write_all_zero_bytes_is_peer_close() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let retry = IoRetry::default();
        let err = retry.write_all(&mut Closed, b"data").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    fn err_is_recorded_fatal(retry: &IoRetry) -> bool {
        retry
            .classifier()
            .last_error()
            .is_some_and(|last| last.class.is_fatal())
    }
}
