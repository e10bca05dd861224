//! Byte-stream transport for spectrum frames and control bytes

use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

use tracing::warn;

/// A bidirectional client connection whose blocking mode can be toggled
pub trait Transport: Read + Write {
    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()>;

    /// Peer description for logs
    fn peer(&self) -> String;
}

impl Transport for TcpStream {
    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        TcpStream::set_nonblocking(self, nonblocking)
    }

    fn peer(&self) -> String {
        self.peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

/// Source of client connections
pub trait Listener {
    type Conn: Transport;

    /// Accept a waiting client, or `Ok(None)` when nobody is connecting
    fn poll_accept(&mut self) -> io::Result<Option<Self::Conn>>;
}

/// TCP listener polled in non-blocking mode so the accept wait can observe
/// shutdown requests
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Listener for TcpAcceptor {
    type Conn = TcpStream;

    fn poll_accept(&mut self) -> io::Result<Option<TcpStream>> {
        match self.listener.accept() {
            Ok((stream, _)) => {
                // Accepted sockets may inherit the listener's non-blocking flag
                stream.set_nonblocking(false)?;
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("Failed to set TCP_NODELAY: {}", e);
                }
                Ok(Some(stream))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}
