use std::net::{IpAddr, SocketAddr, TcpListener, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::{Result, TransportError};
use crate::stream::LinkStream;

/// Listening TCP socket with a cancellable accept.
///
/// The socket is kept in non-blocking mode; [`LinkListener::accept`] polls it
/// and re-checks a [`CancelToken`] between attempts, so a shutdown request
/// never waits on a peer that is not coming.
pub struct LinkListener {
    listener: TcpListener,
    addr: SocketAddr,
}

impl LinkListener {
    /// Bind and listen on `addr`. Port 0 picks an ephemeral port.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| TransportError::Bind { addr, source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!(%addr, "listening on tcp socket");

        Ok(Self { listener, addr })
    }

    /// Accept the next connection.
    ///
    /// Returns `Ok(None)` once `cancel` fires. Would-block and interrupted
    /// results are retried after `poll_interval`; any other error is returned
    /// for the caller to classify.
    pub fn accept(
        &self,
        cancel: &CancelToken,
        poll_interval: Duration,
    ) -> Result<Option<LinkStream>> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false).map_err(TransportError::Accept)?;
                    debug!(%peer, "accepted connection");
                    return Ok(Some(LinkStream::from(stream)));
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(poll_interval);
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Accept(err)),
            }
        }
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl std::fmt::Debug for LinkListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkListener")
            .field("addr", &self.addr)
            .finish()
    }
}

/// Resolve a user-supplied target into socket addresses.
///
/// Accepts `ip`, `ip:port`, `[v6]:port`, `host` and `host:port`. When no port
/// is given, `default_port` is used.
pub fn resolve(target: &str, default_port: u16) -> Result<Vec<SocketAddr>> {
    let target = target.trim();
    if target.is_empty() {
        return Err(TransportError::InvalidAddress(target.to_string()));
    }

    if let Ok(addr) = target.parse::<SocketAddr>() {
        return Ok(vec![addr]);
    }
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, default_port)]);
    }

    let has_port = target
        .rsplit_once(':')
        .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
    let resolved = if has_port {
        target.to_socket_addrs()
    } else {
        (target, default_port).to_socket_addrs()
    };

    let addrs: Vec<SocketAddr> = resolved
        .map_err(|_| TransportError::InvalidAddress(target.to_string()))?
        .collect();
    if addrs.is_empty() {
        return Err(TransportError::InvalidAddress(target.to_string()));
    }
    Ok(addrs)
}
