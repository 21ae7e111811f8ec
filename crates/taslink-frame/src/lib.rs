//! Length-prefixed, kind-tagged message framing for taslink.
//!
//! Every message is framed with a fixed 5-byte header:
//! - A 4-byte big-endian payload length
//! - A 1-byte message kind
//!
//! Reads and writes go through [`IoRetry`], which loops over partial
//! transfers and classifies every socket error. Callers always see complete
//! frames or a fatal error.

pub mod codec;
pub mod error;
pub mod io;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, decode_header, encode_frame, encode_header, Frame, FrameConfig, FrameHeader,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAX_WIRE_PAYLOAD,
};
pub use error::{FrameError, Result};
pub use io::IoRetry;
pub use reader::FrameReader;
pub use writer::FrameWriter;
