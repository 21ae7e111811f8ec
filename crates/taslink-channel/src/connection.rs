use std::net::SocketAddr;

use taslink_transport::LinkStream;

use crate::config::Role;

/// One established socket, tagged with the generation that created it.
///
/// Only the supervisor creates and closes connections. The reader and writer
/// tasks fetch the current `Arc<Connection>` before every frame and report
/// failures against its generation, so a report about a socket that has
/// already been replaced is recognised as stale.
#[derive(Debug)]
pub struct Connection {
    stream: LinkStream,
    generation: u64,
    role: Role,
}

impl Connection {
    pub(crate) fn new(stream: LinkStream, generation: u64, role: Role) -> Self {
        Self {
            stream,
            generation,
            role,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr()
    }

    pub(crate) fn stream(&self) -> &LinkStream {
        &self.stream
    }

    /// Shut the socket down; blocked reads and writes on it return.
    pub(crate) fn close(&self) {
        self.stream.close();
    }
}
