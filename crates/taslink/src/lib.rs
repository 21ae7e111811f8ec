//! Self-healing point-to-point framed link over TCP.
//!
//! taslink moves length-prefixed, kind-tagged frames between exactly two
//! endpoints. One side dials, the other listens, and a background supervisor
//! re-establishes the connection whenever it fails.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listener/stream wrappers, error classification, cancellation
//! - [`frame`]: wire codec and blocking frame reader/writer with partial I/O retry
//! - [`channel`]: the supervised [`NetworkChannel`](channel::NetworkChannel)

/// Re-export transport types.
pub mod transport {
    pub use taslink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use taslink_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use taslink_channel::*;
}
