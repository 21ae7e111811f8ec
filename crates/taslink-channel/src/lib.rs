//! Self-healing framed-message channel over TCP.
//!
//! A [`NetworkChannel`] runs three threads:
//! - a connection supervisor that dials or listens and owns the socket
//! - a reader that decodes inbound frames and hands them to an [`InboundHandler`]
//! - a writer that polls an [`OutboundSource`] and puts its frames on the wire
//!
//! When either I/O task hits a fatal socket error the supervisor tears the
//! connection down and re-establishes it; callers observe this only through
//! [`NetworkChannel::is_connected`] and [`NetworkChannel::consume_disconnect_edge`].

pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod inbound;
pub mod outbound;
pub mod status;

mod shared;
mod supervisor;

pub use channel::NetworkChannel;
pub use config::{
    ChannelConfig, ReconnectPolicy, Role, DEFAULT_PORT, DEFAULT_RECEIVE_TIMEOUT,
    DEFAULT_SEND_TIMEOUT,
};
pub use connection::Connection;
pub use error::{ChannelError, Result};
pub use inbound::InboundHandler;
pub use outbound::OutboundSource;
pub use shared::{FatalReport, FatalSource};
pub use status::{ChannelStatus, ConnectionState};
