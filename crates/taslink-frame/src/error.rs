/// Errors that can occur during frame encoding, decoding and transfer.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured or wire-format maximum.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A socket error classified as fatal.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection (a transfer made no progress).
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Shutdown was requested before the transfer completed.
    #[error("frame transfer cancelled")]
    Cancelled,
}

impl FrameError {
    /// Whether the error invalidates the connection it happened on.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FrameError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
