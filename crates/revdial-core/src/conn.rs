//! Tunnel stream presented as a generic network connection

use revdial_transport::TunnelStream;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Label for both ends of a tunneled connection.
///
/// The tunnel hides the real local and remote endpoints; all a caller can
/// see is the proto and address the stream was dialed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelAddr {
    proto: String,
    address: String,
}

impl TunnelAddr {
    pub fn new(proto: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            proto: proto.into(),
            address: address.into(),
        }
    }

    pub fn proto(&self) -> &str {
        &self.proto
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for TunnelAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// A tunnel stream wrapped with its dial label.
///
/// Reads treat a transport stream reset as clean EOF: once the peer tears
/// its end down there is nothing more to read, and callers expect the
/// same `Ok(0)` an ordinary closed TCP connection would give them.
#[derive(Debug)]
pub struct TunnelConn<S> {
    stream: S,
    addr: TunnelAddr,
}

impl<S: TunnelStream> TunnelConn<S> {
    pub fn new(stream: S, proto: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            stream,
            addr: TunnelAddr::new(proto, address),
        }
    }

    pub fn local_addr(&self) -> &TunnelAddr {
        &self.addr
    }

    pub fn remote_addr(&self) -> &TunnelAddr {
        &self.addr
    }

    pub fn stream_id(&self) -> u64 {
        self.stream.stream_id()
    }

    /// Unwraps the underlying stream, discarding the label.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: TunnelStream> AsyncRead for TunnelConn<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.stream).poll_read(cx, buf) {
            Poll::Ready(Err(err)) if err.kind() == io::ErrorKind::ConnectionReset => {
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

impl<S: TunnelStream> AsyncWrite for TunnelConn<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}
