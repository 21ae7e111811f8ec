use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use taslink_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD, MAX_WIRE_PAYLOAD};

use crate::error::{ChannelError, Result};

/// Default TCP port shared by both ends of the link.
pub const DEFAULT_PORT: u16 = 6978;

/// Default receive timeout. Expiry only means "no data yet".
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default send timeout.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_ACCEPT_POLL: Duration = Duration::from_millis(50);
const DEFAULT_WRITER_IDLE: Duration = Duration::from_millis(10);

/// Which side of the connection this channel plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Initiates the connection once a target address is supplied.
    Dialer,
    /// Binds a port and accepts one peer at a time.
    Listener,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Dialer => f.write_str("dialer"),
            Role::Listener => f.write_str("listener"),
        }
    }
}

/// How the supervisor behaves after a failed establishment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Dialer only: keep redialing the last target instead of waiting for
    /// the caller to supply an address again.
    pub redial: bool,
    /// First delay after a failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound for the doubling delay.
    pub max_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            redial: false,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Configuration for a [`NetworkChannel`](crate::NetworkChannel).
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub role: Role,
    /// Port to listen on (listener) or to dial when the target has none.
    pub port: u16,
    /// Interface the listener binds to.
    pub bind_address: IpAddr,
    pub receive_timeout: Duration,
    pub send_timeout: Duration,
    pub connect_timeout: Duration,
    /// Largest accepted payload; larger inbound headers are fatal.
    pub max_payload_size: usize,
    /// How often a pending accept re-checks for shutdown.
    pub accept_poll_interval: Duration,
    /// Longest the writer sleeps when the outbound source has nothing.
    pub writer_idle_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            role: Role::Listener,
            port: DEFAULT_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            accept_poll_interval: DEFAULT_ACCEPT_POLL,
            writer_idle_interval: DEFAULT_WRITER_IDLE,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ChannelConfig {
    /// Listener on `port` (0 picks an ephemeral port).
    pub fn listener(port: u16) -> Self {
        Self {
            role: Role::Listener,
            port,
            ..Self::default()
        }
    }

    /// Dialer whose targets default to `port`.
    pub fn dialer(port: u16) -> Self {
        Self {
            role: Role::Dialer,
            port,
            ..Self::default()
        }
    }

    /// Override the listener bind address.
    pub fn with_bind_address(mut self, addr: IpAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Receive timeout expressed as seconds plus microseconds.
    pub fn with_receive_timeout(mut self, secs: u64, micros: u32) -> Self {
        self.receive_timeout =
            Duration::from_secs(secs).saturating_add(Duration::from_micros(micros.into()));
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    pub fn with_accept_poll_interval(mut self, interval: Duration) -> Self {
        self.accept_poll_interval = interval;
        self
    }

    pub fn with_writer_idle_interval(mut self, interval: Duration) -> Self {
        self.writer_idle_interval = interval;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Check the configuration before any socket is created.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("receive timeout", self.receive_timeout),
            ("send timeout", self.send_timeout),
            ("connect timeout", self.connect_timeout),
            ("accept poll interval", self.accept_poll_interval),
            ("writer idle interval", self.writer_idle_interval),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(ChannelError::Config(format!("{name} must be greater than zero")));
        }

        if self.role == Role::Dialer && self.port == 0 {
            return Err(ChannelError::Config(
                "dialer port must be non-zero".to_string(),
            ));
        }

        if self.max_payload_size > MAX_WIRE_PAYLOAD {
            return Err(ChannelError::Config(format!(
                "max payload size {} exceeds the wire limit of {MAX_WIRE_PAYLOAD} bytes",
                self.max_payload_size
            )));
        }

        if self.reconnect.initial_backoff > self.reconnect.max_backoff {
            return Err(ChannelError::Config(
                "initial backoff must not exceed max backoff".to_string(),
            ));
        }

        Ok(())
    }

    /// Address the listener binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Frame-layer settings derived from this configuration.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
        }
    }
}
