//! QUIC stream implementation

use quinn::{RecvStream, SendStream};
use revdial_transport::TunnelStream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// One bidirectional QUIC stream, presented as a plain async byte channel.
///
/// quinn surfaces a peer reset as an `io::Error` with kind
/// `ConnectionReset`; the tunnel connection wrapper upstack decides
/// whether that counts as EOF.
#[derive(Debug)]
pub struct QuicStream {
    send: SendStream,
    recv: RecvStream,
    stream_id: u64,
}

impl QuicStream {
    pub fn new(send: SendStream, recv: RecvStream) -> Self {
        let stream_id = send.id().index();
        Self {
            send,
            recv,
            stream_id,
        }
    }
}

impl AsyncRead for QuicStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.recv).poll_read(cx, buf)
    }
}

impl AsyncWrite for QuicStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        AsyncWrite::poll_write(Pin::new(&mut self.send), cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.send).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.send).poll_shutdown(cx)
    }
}

impl TunnelStream for QuicStream {
    fn stream_id(&self) -> u64 {
        self.stream_id
    }
}
