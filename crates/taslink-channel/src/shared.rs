use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use taslink_transport::{CancelToken, ErrorClassifier, LinkStream};
use tracing::debug;

use crate::config::{ChannelConfig, Role};
use crate::connection::Connection;
use crate::error::{ChannelError, Result};
use crate::status::{ChannelStatus, ConnectionState};

/// Which party asked for a connection to be torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalSource {
    Reader,
    Writer,
    /// [`NetworkChannel::reset_connection`](crate::NetworkChannel::reset_connection).
    Caller,
}

/// A one-shot request for the supervisor to recover a connection.
#[derive(Debug, Clone)]
pub struct FatalReport {
    pub source: FatalSource,
    /// Generation of the connection that failed.
    pub generation: u64,
    pub reason: String,
}

/// What the supervisor takes over when it starts a recovery.
pub(crate) struct Recovery {
    pub(crate) report: FatalReport,
    pub(crate) connection: Option<Arc<Connection>>,
}

#[derive(Debug)]
struct Control {
    state: ConnectionState,
    connection: Option<Arc<Connection>>,
    generation: u64,
    fatal: Option<FatalReport>,
    target: Option<Vec<SocketAddr>>,
    recoveries: u64,
}

/// State shared by the supervisor, the I/O tasks and the public handle.
///
/// Everything that decides who may touch the socket lives in one mutex,
/// and every change is broadcast on one condition variable. Waiters always
/// re-check the cancel token under that mutex; shutdown flips the token while
/// holding it, so no wake-up is lost.
pub(crate) struct Shared {
    pub(crate) config: ChannelConfig,
    pub(crate) status: ChannelStatus,
    pub(crate) classifier: Arc<ErrorClassifier>,
    pub(crate) cancel: CancelToken,
    control: Mutex<Control>,
    changed: Condvar,
    outbound_pending: Mutex<bool>,
    outbound_ready: Condvar,
}

impl Shared {
    pub(crate) fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            status: ChannelStatus::default(),
            classifier: Arc::new(ErrorClassifier::new()),
            cancel: CancelToken::new(),
            control: Mutex::new(Control {
                state: ConnectionState::Idle,
                connection: None,
                generation: 0,
                fatal: None,
                target: None,
                recoveries: 0,
            }),
            changed: Condvar::new(),
            outbound_pending: Mutex::new(false),
            outbound_ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Control>) -> MutexGuard<'a, Control> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let mut control = self.lock();
        if control.state != ConnectionState::Terminated {
            control.state = state;
        }
        drop(control);
        self.changed.notify_all();
    }

    pub(crate) fn recoveries(&self) -> u64 {
        self.lock().recoveries
    }

    pub(crate) fn current_connection(&self) -> Option<Arc<Connection>> {
        self.lock().connection.clone()
    }

    /// Block until a live connection of at least `min_generation` exists and
    /// no fatal report is pending. Returns `None` once shutdown is requested.
    pub(crate) fn await_connection(&self, min_generation: u64) -> Option<Arc<Connection>> {
        let mut control = self.lock();
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            if control.state == ConnectionState::Connected && control.fatal.is_none() {
                if let Some(conn) = &control.connection {
                    if conn.generation() >= min_generation {
                        return Some(Arc::clone(conn));
                    }
                }
            }
            control = self.wait(control);
        }
    }

    /// Whether `generation` is still the live connection with no recovery pending.
    pub(crate) fn is_live(&self, generation: u64) -> bool {
        let control = self.lock();
        control.state == ConnectionState::Connected
            && control.fatal.is_none()
            && control
                .connection
                .as_ref()
                .is_some_and(|conn| conn.generation() == generation)
    }

    /// Wait up to `timeout` for a live connection.
    ///
    /// A `timeout` too large to represent as a deadline waits without limit.
    pub(crate) fn wait_until_connected(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut control = self.lock();
        loop {
            if control.state == ConnectionState::Connected {
                return true;
            }
            if self.cancel.is_cancelled() {
                return false;
            }
            control = match self.wait_until(control, deadline) {
                Some(control) => control,
                None => return false,
            };
        }
    }

    /// Wait for a change, or until `deadline` passes (`None` if it already
    /// has). A `None` deadline never expires.
    fn wait_until<'a>(
        &self,
        guard: MutexGuard<'a, Control>,
        deadline: Option<Instant>,
    ) -> Option<MutexGuard<'a, Control>> {
        let Some(deadline) = deadline else {
            return Some(self.wait(guard));
        };
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        Some(
            self.changed
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0,
        )
    }

    /// Install a freshly established stream as the live connection.
    ///
    /// Returns `None` (and closes the stream) if shutdown raced the connect.
    pub(crate) fn install(&self, stream: LinkStream) -> Option<Arc<Connection>> {
        let mut control = self.lock();
        if self.cancel.is_cancelled() {
            drop(control);
            stream.close();
            return None;
        }
        control.generation += 1;
        let conn = Arc::new(Connection::new(
            stream,
            control.generation,
            self.config.role,
        ));
        control.connection = Some(Arc::clone(&conn));
        control.fatal = None;
        control.state = ConnectionState::Connected;
        self.status.mark_connected();
        drop(control);
        self.changed.notify_all();
        Some(conn)
    }

    /// Ask the supervisor to recover the connection named in `report`.
    ///
    /// Only the first report against the live generation is accepted; later
    /// or stale reports return `false` and change nothing.
    pub(crate) fn report_fatal(&self, report: FatalReport) -> bool {
        let mut control = self.lock();
        let live = control.state == ConnectionState::Connected
            && control
                .connection
                .as_ref()
                .is_some_and(|conn| conn.generation() == report.generation);
        if !live || control.fatal.is_some() {
            debug!(
                source = ?report.source,
                generation = report.generation,
                "ignoring fatal report; recovery already handled"
            );
            return false;
        }
        control.fatal = Some(report);
        drop(control);
        self.changed.notify_all();
        true
    }

    /// Block until a fatal report arrives, then move to `Recovering`.
    ///
    /// Detaching the connection, clearing `is_connected`, raising the
    /// disconnect edge and (for a dialer that does not redial) forgetting the
    /// target all happen atomically with the state change, so a caller that
    /// reacts to the edge can supply a new target right away. Returns `None`
    /// once shutdown is requested.
    pub(crate) fn await_recovery(&self) -> Option<Recovery> {
        let mut control = self.lock();
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            if let Some(report) = control.fatal.take() {
                control.state = ConnectionState::Recovering;
                control.recoveries += 1;
                let connection = control.connection.take();
                if self.config.role == Role::Dialer && !self.config.reconnect.redial {
                    control.target = None;
                }
                self.status.mark_disconnected();
                drop(control);
                self.changed.notify_all();
                return Some(Recovery { report, connection });
            }
            control = self.wait(control);
        }
    }

    /// Record a dialer target and wake the supervisor.
    pub(crate) fn set_target(&self, addrs: Vec<SocketAddr>) -> Result<()> {
        if self.config.role != Role::Dialer {
            return Err(ChannelError::WrongRole(Role::Dialer));
        }
        let mut control = self.lock();
        match control.state {
            ConnectionState::Terminated => return Err(ChannelError::Terminated),
            ConnectionState::Connected => return Err(ChannelError::AlreadyConnected),
            _ => {}
        }
        control.target = Some(addrs);
        drop(control);
        self.changed.notify_all();
        Ok(())
    }

    /// Block until a dialer target is available. `None` on shutdown.
    pub(crate) fn await_target(&self) -> Option<Vec<SocketAddr>> {
        let mut control = self.lock();
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            if let Some(target) = &control.target {
                return Some(target.clone());
            }
            control = self.wait(control);
        }
    }

    /// Forget the dialer target, unless the caller already replaced it.
    pub(crate) fn clear_target(&self, failed: &[SocketAddr]) {
        let mut control = self.lock();
        if control.target.as_deref() == Some(failed) {
            control.target = None;
        }
    }

    /// Sleep for `delay`, returning early (with `false`) on shutdown.
    ///
    /// A `delay` past the representable range lasts until shutdown.
    pub(crate) fn sleep(&self, delay: Duration) -> bool {
        let deadline = Instant::now().checked_add(delay);
        let mut control = self.lock();
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            control = match self.wait_until(control, deadline) {
                Some(control) => control,
                None => return true,
            };
        }
    }

    /// Request shutdown and wake every waiter.
    pub(crate) fn request_shutdown(&self) {
        {
            let _control = self.lock();
            self.cancel.cancel();
        }
        self.changed.notify_all();
        {
            let _pending = self
                .outbound_pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.outbound_ready.notify_all();
    }

    /// Enter `Terminated` and detach the live connection for closing.
    pub(crate) fn terminate(&self) -> Option<Arc<Connection>> {
        let mut control = self.lock();
        control.state = ConnectionState::Terminated;
        control.fatal = None;
        control.target = None;
        let connection = control.connection.take();
        self.status.mark_closed();
        drop(control);
        self.changed.notify_all();
        connection
    }

    /// Wake the writer if it is idling.
    pub(crate) fn notify_outbound(&self) {
        *self
            .outbound_pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = true;
        self.outbound_ready.notify_one();
    }

    /// Idle until [`Shared::notify_outbound`], shutdown, or `timeout`.
    pub(crate) fn wait_outbound(&self, timeout: Duration) {
        let pending = self
            .outbound_pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (mut pending, _) = self
            .outbound_ready
            .wait_timeout_while(pending, timeout, |pending| {
                !*pending && !self.cancel.is_cancelled()
            })
            .unwrap_or_else(PoisonError::into_inner);
        *pending = false;
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, TcpListener, TcpStream};
    use std::thread;

    use super::*;

    fn stream_pair() -> (LinkStream, TcpStream) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (LinkStream::from(server), client)
    }

    fn report(source: FatalSource, generation: u64) -> FatalReport {
        FatalReport {
            source,
            generation,
            reason: "test".to_string(),
        }
    }

    #[test]
    fn install_bumps_generation_and_marks_connected() {
        let shared = Shared::new(ChannelConfig::listener(0));
        let (stream, _peer) = stream_pair();

        let conn = shared.install(stream).unwrap();
        assert_eq!(conn.generation(), 1);
        assert_eq!(shared.state(), ConnectionState::Connected);
        assert!(shared.status.is_connected());
        assert_eq!(shared.await_connection(1).unwrap().generation(), 1);
    }

    #[test]
    fn second_fatal_report_is_ignored() {
        let shared = Shared::new(ChannelConfig::listener(0));
        let (stream, _peer) = stream_pair();
        shared.install(stream).unwrap();

        assert!(shared.report_fatal(report(FatalSource::Reader, 1)));
        assert!(!shared.report_fatal(report(FatalSource::Writer, 1)));

        let recovery = shared.await_recovery().unwrap();
        assert_eq!(recovery.report.source, FatalSource::Reader);
        assert!(recovery.connection.is_some());
        assert_eq!(shared.state(), ConnectionState::Recovering);
        assert_eq!(shared.recoveries(), 1);
        assert!(!shared.status.is_connected());
        assert!(shared.status.consume_disconnect_edge());
        assert!(!shared.status.consume_disconnect_edge());

        // The writer's late report against the torn-down generation stays a no-op.
        assert!(!shared.report_fatal(report(FatalSource::Writer, 1)));
    }

    #[test]
    fn stale_generation_report_is_ignored() {
        let shared = Shared::new(ChannelConfig::listener(0));
        let (first, _p1) = stream_pair();
        let (second, _p2) = stream_pair();
        shared.install(first).unwrap();
        shared.install(second).unwrap();

        assert!(!shared.report_fatal(report(FatalSource::Reader, 1)));
        assert!(shared.report_fatal(report(FatalSource::Reader, 2)));
    }

    #[test]
    fn await_connection_unblocks_on_shutdown() {
        let shared = Arc::new(Shared::new(ChannelConfig::listener(0)));
        let waiter = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || shared.await_connection(0))
        };
        thread::sleep(Duration::from_millis(20));
        shared.request_shutdown();
        assert!(waiter.join().unwrap().is_none());
    }

    #[test]
    fn target_wakes_waiting_dialer() {
        let shared = Arc::new(Shared::new(ChannelConfig::dialer(6978)));
        let waiter = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || shared.await_target())
        };
        thread::sleep(Duration::from_millis(20));
        let addr: SocketAddr = "127.0.0.1:6978".parse().unwrap();
        shared.set_target(vec![addr]).unwrap();
        assert_eq!(waiter.join().unwrap(), Some(vec![addr]));
    }

    #[test]
    fn target_rules() {
        let listener = Shared::new(ChannelConfig::listener(0));
        assert!(matches!(
            listener.set_target(Vec::new()),
            Err(ChannelError::WrongRole(Role::Dialer))
        ));

        let dialer = Shared::new(ChannelConfig::dialer(1));
        let (stream, _peer) = stream_pair();
        dialer.install(stream).unwrap();
        assert!(matches!(
            dialer.set_target(Vec::new()),
            Err(ChannelError::AlreadyConnected)
        ));
    }

    #[test]
    fn clear_target_keeps_replacement() {
        let shared = Shared::new(ChannelConfig::dialer(1));
        let old: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let new: SocketAddr = "127.0.0.1:2".parse().unwrap();

        shared.set_target(vec![new]).unwrap();
        shared.clear_target(&[old]);
        assert_eq!(shared.await_target(), Some(vec![new]));

        shared.clear_target(&[new]);
        shared.request_shutdown();
        assert_eq!(shared.await_target(), None);
    }

    #[test]
    fn sleep_returns_early_on_shutdown() {
        let shared = Arc::new(Shared::new(ChannelConfig::listener(0)));
        let sleeper = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let started = Instant::now();
                let completed = shared.sleep(Duration::from_secs(30));
                (completed, started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        shared.request_shutdown();
        let (completed, elapsed) = sleeper.join().unwrap();
        assert!(!completed);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn unbounded_sleep_lasts_until_shutdown() {
        let shared = Arc::new(Shared::new(ChannelConfig::dialer(1)));
        let sleeper = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || shared.sleep(Duration::MAX))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!sleeper.is_finished());
        shared.request_shutdown();
        assert!(!sleeper.join().unwrap());
    }

    #[test]
    fn unbounded_connect_wait_returns_once_connected() {
        let shared = Arc::new(Shared::new(ChannelConfig::listener(0)));
        let waiter = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || shared.wait_until_connected(Duration::MAX))
        };
        thread::sleep(Duration::from_millis(20));
        let (stream, _peer) = stream_pair();
        shared.install(stream).unwrap();
        assert!(waiter.join().unwrap());

        shared.request_shutdown();
        let idle = Shared::new(ChannelConfig::dialer(1));
        idle.request_shutdown();
        assert!(!idle.wait_until_connected(Duration::MAX));
    }

    #[test]
    fn install_after_shutdown_is_refused() {
        let shared = Shared::new(ChannelConfig::listener(0));
        shared.request_shutdown();
        let (stream, _peer) = stream_pair();
        assert!(shared.install(stream).is_none());
        assert!(!shared.status.is_connected());
    }

    #[test]
    fn outbound_notification_is_consumed() {
        let shared = Shared::new(ChannelConfig::listener(0));
        shared.notify_outbound();
        let started = Instant::now();
        shared.wait_outbound(Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
