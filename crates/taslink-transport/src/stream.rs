use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};

/// A connected TCP stream implementing `Read` and `Write`.
///
/// `&LinkStream` is also `Read + Write`, so a reader and a writer task can
/// share one stream through an `Arc` without duplicating the descriptor.
pub struct LinkStream {
    inner: TcpStream,
    peer: Option<SocketAddr>,
}

impl LinkStream {
    /// Connect to the first reachable address in `addrs` (blocking).
    pub fn connect(addrs: &[SocketAddr], timeout: Duration) -> Result<Self> {
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(addr, timeout) {
                Ok(stream) => {
                    debug!(%addr, "connected to tcp socket");
                    return Ok(Self::from(stream));
                }
                Err(source) => {
                    last_err = Some(TransportError::Connect {
                        addr: *addr,
                        source,
                    })
                }
            }
        }
        Err(last_err.unwrap_or_else(|| TransportError::InvalidAddress(String::new())))
    }

    /// Put the stream in blocking mode with the given timeouts.
    ///
    /// A read that hits `receive_timeout` fails with a transient error
    /// ("no data yet"), it does not tear the stream down.
    pub fn configure(
        &self,
        receive_timeout: Option<Duration>,
        send_timeout: Option<Duration>,
    ) -> Result<()> {
        self.inner.set_nonblocking(false)?;
        self.inner.set_read_timeout(receive_timeout)?;
        self.inner.set_write_timeout(send_timeout)?;
        Ok(())
    }

    /// Disable Nagle's algorithm; frames are small and latency-sensitive.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.inner.set_nodelay(nodelay).map_err(Into::into)
    }

    /// Close both directions. Blocked reads and writes on it return.
    ///
    /// Closing an already-disconnected stream is not an error.
    pub fn close(&self) {
        if let Err(err) = self.inner.shutdown(Shutdown::Both) {
            debug!(peer = ?self.peer, error = %err, "stream shutdown reported an error");
        }
    }

    /// Address of the remote end, captured when the stream was created.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Local address of this end of the stream.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(Into::into)
    }
}

impl From<TcpStream> for LinkStream {
    fn from(inner: TcpStream) -> Self {
        let peer = inner.peer_addr().ok();
        Self { inner, peer }
    }
}

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl Read for &LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        (&self.inner).read(buf)
    }
}

impl Write for &LinkStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        (&self.inner).write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        (&self.inner).flush()
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkStream")
            .field("type", &"tcp")
            .field("peer", &self.peer)
            .finish()
    }
}
