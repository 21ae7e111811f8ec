use std::sync::Arc;
use std::time::Duration;

use taslink_transport::{ErrorClass, LinkListener, LinkStream, TransportError};
use tracing::{debug, info, warn};

use crate::config::{ReconnectPolicy, Role};
use crate::shared::{Recovery, Shared};
use crate::status::ConnectionState;

/// Doubling delay between failed establishment attempts.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(policy: &ReconnectPolicy) -> Self {
        Self {
            initial: policy.initial_backoff,
            max: policy.max_backoff,
            current: policy.initial_backoff,
        }
    }

    /// Delay to wait now; the following one is doubled up to the cap.
    pub(crate) fn next(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Owns establishment and teardown of the channel's socket.
///
/// The only code that opens or closes a [`Connection`](crate::Connection).
pub(crate) struct Supervisor {
    shared: Arc<Shared>,
    listener: Option<LinkListener>,
    backoff: Backoff,
}

impl Supervisor {
    pub(crate) fn new(shared: Arc<Shared>, listener: Option<LinkListener>) -> Self {
        let backoff = Backoff::new(&shared.config.reconnect);
        Self {
            shared,
            listener,
            backoff,
        }
    }

    pub(crate) fn run(mut self) {
        debug!(role = %self.shared.config.role, "connection supervisor started");
        loop {
            if !self.establish() {
                break;
            }
            match self.shared.await_recovery() {
                Some(recovery) => self.recover(recovery),
                None => break,
            }
        }
        self.terminate();
    }

    /// Loop until a connection is installed. `false` on shutdown.
    fn establish(&mut self) -> bool {
        self.shared.set_state(ConnectionState::Establishing);
        loop {
            if self.shared.cancel.is_cancelled() {
                return false;
            }
            let stream = match self.shared.config.role {
                Role::Listener => self.accept_once(),
                Role::Dialer => self.dial_once(),
            };
            let Some(stream) = stream else {
                continue;
            };

            if let Err(err) = self.prepare(&stream) {
                self.note_failure("configure", &err);
                stream.close();
                if !self.pause() {
                    return false;
                }
                continue;
            }

            self.backoff.reset();
            let peer = stream.peer_addr();
            match self.shared.install(stream) {
                Some(conn) => {
                    info!(
                        peer = ?peer,
                        generation = conn.generation(),
                        role = %conn.role(),
                        "connection established"
                    );
                    return true;
                }
                None => return false,
            }
        }
    }

    fn accept_once(&mut self) -> Option<LinkStream> {
        let Some(listener) = self.listener.as_ref() else {
            self.shared.sleep(self.shared.config.accept_poll_interval);
            return None;
        };
        match listener.accept(&self.shared.cancel, self.shared.config.accept_poll_interval) {
            Ok(stream) => stream,
            Err(err) => {
                let fatal = self.note_failure("accept", &err);
                if fatal {
                    self.pause();
                }
                None
            }
        }
    }

    fn dial_once(&mut self) -> Option<LinkStream> {
        let addrs = self.shared.await_target()?;
        debug!(?addrs, "dialing");
        match LinkStream::connect(&addrs, self.shared.config.connect_timeout) {
            Ok(stream) => Some(stream),
            Err(err) => {
                self.note_failure("connect", &err);
                if self.shared.config.reconnect.redial {
                    self.pause();
                } else {
                    self.shared.clear_target(&addrs);
                }
                None
            }
        }
    }

    fn prepare(&self, stream: &LinkStream) -> taslink_transport::Result<()> {
        let config = &self.shared.config;
        stream.configure(Some(config.receive_timeout), Some(config.send_timeout))?;
        stream.set_nodelay(true)
    }

    /// Classify and log an establishment failure. Returns `true` if fatal.
    fn note_failure(&self, context: &'static str, err: &TransportError) -> bool {
        let class = match err.io_source() {
            Some(io) => self.shared.classifier.classify(io, context),
            None => {
                self.shared.classifier.record_fatal(context, err.to_string());
                ErrorClass::Fatal
            }
        };
        if class.is_fatal() {
            warn!(context, error = %err, "connection attempt failed");
        } else {
            debug!(context, error = %err, "transient establishment error");
        }
        class.is_fatal()
    }

    fn pause(&mut self) -> bool {
        let delay = self.backoff.next();
        debug!(delay_ms = delay.as_millis() as u64, "backing off before next attempt");
        self.shared.sleep(delay)
    }

    fn recover(&mut self, recovery: Recovery) {
        let Recovery { report, connection } = recovery;
        warn!(
            source = ?report.source,
            generation = report.generation,
            reason = %report.reason,
            "connection lost, recovering"
        );
        if let Some(conn) = connection {
            conn.close();
        }
    }

    fn terminate(&mut self) {
        if let Some(conn) = self.shared.terminate() {
            conn.close();
        }
        self.listener = None;
        info!(role = %self.shared.config.role, "channel terminated");
    }
}
