//! TCP transport layer for taslink.
//!
//! Provides the pieces every higher layer builds on:
//! - [`LinkListener`] / [`LinkStream`]: blocking TCP sockets with a cancellable accept
//! - [`ErrorClassifier`]: maps socket errors to [`ErrorClass`] (success, transient, fatal)
//! - [`CancelToken`]: a shared shutdown flag checked before new I/O starts

pub mod cancel;
pub mod classify;
pub mod error;
pub mod stream;
pub mod tcp;

pub use cancel::CancelToken;
pub use classify::{classify, ClassifiedError, ErrorClass, ErrorClassifier};
pub use error::{Result, TransportError};
pub use stream::LinkStream;
pub use tcp::{resolve, LinkListener};
