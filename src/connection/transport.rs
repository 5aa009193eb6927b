//! Transports a link can own.
//!
//! A transport is any duplex byte stream. The engine splits it once: the
//! read half serves the single reader, the write half belongs to the drain
//! task. The only extra capability required is reporting the local address.

use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpStream;

/// A byte-stream transport usable as one physical link.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Returns the local socket address this transport is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Transport for TcpStream {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }
}

/// In-memory links have no socket address.
impl Transport for DuplexStream {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "in-memory transport has no local address",
        ))
    }
}
