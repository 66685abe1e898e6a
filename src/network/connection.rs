//! One accepted (or dialled) TCP stream

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Stable, process-unique connection key. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Write side plus close control of a TCP stream.
///
/// The read side is handed out separately by [`Connection::open`] and owned
/// by exactly one relay thread. Writes are serialized so chunks from
/// different senders never interleave mid-chunk.
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    writer: Mutex<TcpStream>,
    /// Separate handle so `close` never waits behind a blocked writer
    control: TcpStream,
    closed: AtomicBool,
}

impl Connection {
    /// Wrap a connected stream, returning the connection and its reader
    pub fn open(stream: TcpStream) -> io::Result<(Arc<Self>, TcpStream)> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;
        let reader = stream.try_clone()?;
        let control = stream.try_clone()?;

        let conn = Arc::new(Self {
            id: ConnectionId::next(),
            peer_addr,
            writer: Mutex::new(stream),
            control,
            closed: AtomicBool::new(false),
        });
        Ok((conn, reader))
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Write the whole buffer
    pub fn send(&self, data: &[u8]) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
        }
        self.writer.lock().write_all(data)
    }

    /// Shut the socket down in both directions.
    ///
    /// Any thread blocked reading this socket wakes with EOF or an error.
    /// Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            if let Err(e) = self.control.shutdown(Shutdown::Both) {
                tracing::trace!("Shutdown of {} ({}): {}", self.id, self.peer_addr, e);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}
