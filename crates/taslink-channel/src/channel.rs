use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use taslink_transport::{resolve, ClassifiedError, LinkListener};
use tracing::{debug, info, warn};

use crate::config::{ChannelConfig, Role};
use crate::error::{ChannelError, Result};
use crate::inbound::{run_reader, InboundHandler};
use crate::outbound::{run_writer, OutboundSource};
use crate::shared::{FatalReport, FatalSource, Shared};
use crate::status::ConnectionState;
use crate::supervisor::Supervisor;

const SUPERVISOR_TASK: &str = "supervisor";
const READER_TASK: &str = "reader";
const WRITER_TASK: &str = "writer";

/// A point-to-point framed channel that reconnects on its own.
///
/// Created with [`NetworkChannel::start`], which spawns the supervisor, the
/// reader and the writer. Inbound frames go to the [`InboundHandler`];
/// outbound frames are pulled from the [`OutboundSource`]. Dropping the
/// channel shuts it down.
///
/// # Example
///
/// ```no_run
/// use taslink_channel::{ChannelConfig, NetworkChannel};
/// use taslink_frame::Frame;
///
/// let mut channel = NetworkChannel::start(
///     ChannelConfig::dialer(6978),
///     |frame: Frame| println!("kind {} ({} bytes)", frame.kind, frame.payload.len()),
///     || None::<Frame>,
/// )?;
/// channel.set_target_address("192.168.1.20")?;
/// # channel.shutdown()?;
/// # Ok::<(), taslink_channel::ChannelError>(())
/// ```
pub struct NetworkChannel {
    shared: Arc<Shared>,
    local_addr: Option<SocketAddr>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl NetworkChannel {
    /// Validate `config`, bind if listening, and start the three tasks.
    pub fn start<H, S>(config: ChannelConfig, inbound: H, outbound: S) -> Result<Self>
    where
        H: InboundHandler,
        S: OutboundSource,
    {
        config.validate()?;

        let listener = match config.role {
            Role::Listener => Some(LinkListener::bind(config.listen_addr())?),
            Role::Dialer => None,
        };
        let local_addr = listener.as_ref().map(LinkListener::local_addr);
        let role = config.role;

        let mut channel = Self {
            shared: Arc::new(Shared::new(config)),
            local_addr,
            tasks: Vec::with_capacity(3),
        };

        let supervisor = Supervisor::new(Arc::clone(&channel.shared), listener);
        channel.spawn(SUPERVISOR_TASK, move || supervisor.run())?;

        let shared = Arc::clone(&channel.shared);
        channel.spawn(READER_TASK, move || run_reader(shared, inbound))?;

        let shared = Arc::clone(&channel.shared);
        channel.spawn(WRITER_TASK, move || run_writer(shared, outbound))?;

        info!(%role, local_addr = ?channel.local_addr, "network channel started");
        Ok(channel)
    }

    // On failure the caller's `?` drops `self`, which joins what already started.
    fn spawn<F>(&mut self, name: &'static str, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(format!("taslink-{name}"))
            .spawn(body)
            .map_err(|source| ChannelError::Spawn { name, source })?;
        self.tasks.push((name, handle));
        Ok(())
    }

    /// Supply the address to dial (dialer role only).
    ///
    /// Accepts `ip`, `ip:port`, `[v6]:port` or a host name; without a port the
    /// configured one is used. Fails with [`ChannelError::AlreadyConnected`]
    /// while a connection is live.
    pub fn set_target_address(&self, target: &str) -> Result<()> {
        if self.shared.config.role != Role::Dialer {
            return Err(ChannelError::WrongRole(Role::Dialer));
        }
        let addrs = resolve(target, self.shared.config.port)?;
        debug!(target, ?addrs, "target address set");
        self.shared.set_target(addrs)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.status.is_connected()
    }

    /// `true` exactly once after each involuntary disconnect.
    pub fn consume_disconnect_edge(&self) -> bool {
        self.shared.status.consume_disconnect_edge()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn role(&self) -> Role {
        self.shared.config.role
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    /// The most recent socket error seen by any task.
    pub fn last_error(&self) -> Option<ClassifiedError> {
        self.shared.classifier.last_error()
    }

    /// Bound address of a listener; `None` for a dialer.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared
            .current_connection()
            .and_then(|conn| conn.peer_addr())
    }

    /// Number of connections torn down after a fatal error.
    pub fn recoveries(&self) -> u64 {
        self.shared.recoveries()
    }

    /// Block until connected or `timeout` elapses. `Duration::MAX` waits
    /// until connected or shut down.
    pub fn wait_until_connected(&self, timeout: Duration) -> bool {
        self.shared.wait_until_connected(timeout)
    }

    /// Wake the writer so it polls the outbound source immediately.
    pub fn notify_outbound(&self) {
        self.shared.notify_outbound();
    }

    /// Drop the live connection as if it had failed.
    ///
    /// Returns `false` when there is no live connection or a recovery is
    /// already underway.
    pub fn reset_connection(&self) -> bool {
        let Some(conn) = self.shared.current_connection() else {
            return false;
        };
        self.shared.report_fatal(FatalReport {
            source: FatalSource::Caller,
            generation: conn.generation(),
            reason: "reset requested".to_string(),
        })
    }

    /// Stop all tasks and close the socket. Idempotent.
    ///
    /// Must not be called from inside an [`InboundHandler`] or
    /// [`OutboundSource`]. A dialer in the middle of a connect attempt
    /// finishes it first, bounded by the connect timeout.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.tasks.is_empty() {
            return Ok(());
        }
        debug!("shutting down network channel");
        self.shared.request_shutdown();

        let mut panicked = None;
        for (name, handle) in self.tasks.drain(..) {
            if handle.join().is_err() {
                warn!(task = name, "channel task panicked");
                panicked.get_or_insert(name);
            }
        }
        // Covers the case where the supervisor never got to run.
        if let Some(conn) = self.shared.terminate() {
            conn.close();
        }

        match panicked {
            Some(name) => Err(ChannelError::TaskPanicked(name)),
            None => Ok(()),
        }
    }
}

impl Drop for NetworkChannel {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "network channel shutdown failed");
        }
    }
}

impl std::fmt::Debug for NetworkChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkChannel")
            .field("role", &self.shared.config.role)
            .field("state", &self.state())
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}
