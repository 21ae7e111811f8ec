use std::sync::atomic::{AtomicBool, Ordering};

/// Lifecycle of the supervised connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    /// Dialing, waiting for a target address, or accepting.
    Establishing,
    Connected,
    /// Tearing down a failed connection.
    Recovering,
    Terminated,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Establishing => "establishing",
            ConnectionState::Connected => "connected",
            ConnectionState::Recovering => "recovering",
            ConnectionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Connection flags readable from any thread.
#[derive(Debug, Default)]
pub struct ChannelStatus {
    connected: AtomicBool,
    just_disconnected: AtomicBool,
}

impl ChannelStatus {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Returns `true` once per disconnect event, then `false` until the next.
    pub fn consume_disconnect_edge(&self) -> bool {
        self.just_disconnected.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn mark_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.just_disconnected.store(true, Ordering::SeqCst);
    }

    /// Clear the connected flag without raising a disconnect edge.
    pub(crate) fn mark_closed(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}
