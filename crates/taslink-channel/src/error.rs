use crate::config::Role;

/// Errors surfaced to callers of the channel.
///
/// Socket failures on an established connection never appear here; they
/// are handled by reconnecting.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The configuration was rejected before start.
    #[error("invalid channel configuration: {0}")]
    Config(String),

    /// Transport-level error (bind failure, unresolvable address).
    #[error("transport error: {0}")]
    Transport(#[from] taslink_transport::TransportError),

    /// The operation is only meaningful for the other role.
    #[error("operation requires the {0} role")]
    WrongRole(Role),

    /// A target was supplied while a connection is live.
    #[error("channel is already connected")]
    AlreadyConnected,

    /// The channel has been shut down.
    #[error("channel has been shut down")]
    Terminated,

    /// A worker thread could not be started.
    #[error("failed to spawn {name} task: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },

    /// A worker thread panicked before it could be joined.
    #[error("{0} task panicked")]
    TaskPanicked(&'static str),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
