//! Listening sockets with an out-of-band close
//!
//! A thread blocked in `accept()` cannot be cancelled; the socket has to be
//! closed under it. [`ListenerCloser`] does that from another thread: it
//! shuts the listening socket down (which fails the pending `accept` on
//! Linux) and then dials the listener once so platforms that ignore
//! `shutdown` on listening sockets still wake up.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use crate::error::NetworkError;

const WAKE_TIMEOUT: Duration = Duration::from_millis(250);

pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind and listen. Port 0 picks a free port; see [`Listener::local_addr`].
    pub fn bind(addr: SocketAddr, backlog: i32) -> Result<Self, NetworkError> {
        let bind_failed = |e: io::Error| NetworkError::BindFailed {
            addr: addr.to_string(),
            reason: e.to_string(),
        };

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(bind_failed)?;
        // Lets a stopped session be restarted on the same port straight away
        #[cfg(not(windows))]
        socket.set_reuse_address(true).map_err(bind_failed)?;
        socket.bind(&SockAddr::from(addr)).map_err(bind_failed)?;
        socket.listen(backlog).map_err(bind_failed)?;

        let inner: TcpListener = socket.into();
        let local_addr = inner.local_addr().map_err(bind_failed)?;
        Ok(Self { inner, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle that can close this listener from another thread
    pub fn closer(&self) -> io::Result<ListenerCloser> {
        let socket = Socket::from(self.inner.try_clone()?);
        Ok(ListenerCloser {
            socket,
            wake_addr: wake_addr(self.local_addr),
        })
    }

    /// Block until a peer connects or the listener is closed
    pub fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        self.inner.accept()
    }
}

pub struct ListenerCloser {
    socket: Socket,
    wake_addr: SocketAddr,
}

impl ListenerCloser {
    /// Fail or wake the pending `accept`. The acceptor must re-check its
    /// running flag after every accept, since the wake-up connection itself
    /// may be accepted.
    pub fn close(&self) {
        if let Err(e) = self.socket.shutdown(Shutdown::Both) {
            tracing::trace!("Listener shutdown on {}: {}", self.wake_addr, e);
        }
        if let Ok(stream) = TcpStream::connect_timeout(&self.wake_addr, WAKE_TIMEOUT) {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Address to dial to reach a listener bound to `addr`
fn wake_addr(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}
