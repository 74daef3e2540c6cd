//! In-memory transport doubles for engine tests

use async_trait::async_trait;
use revdial_transport::{TransportError, TransportResult, TunnelSession, TunnelStream};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::{mpsc, Mutex};

#[derive(Debug)]
pub struct MemStream {
    inner: DuplexStream,
    id: u64,
}

impl AsyncRead for MemStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl TunnelStream for MemStream {
    fn stream_id(&self) -> u64 {
        self.id
    }
}

/// A connected pair of in-memory tunnel streams.
pub fn stream_pair() -> (MemStream, MemStream) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    (MemStream { inner: a, id: 0 }, MemStream { inner: b, id: 0 })
}

/// In-memory session: streams opened on one side pop out of the peer's
/// accept queue. Dropping a session (or closing it) ends the peer's
/// accept loop.
#[derive(Debug)]
pub struct MemSession {
    to_peer: std::sync::Mutex<Option<mpsc::UnboundedSender<MemStream>>>,
    accept: Mutex<mpsc::UnboundedReceiver<MemStream>>,
    next_id: AtomicU64,
    session_id: u64,
    close_count: AtomicUsize,
}

pub fn session_pair() -> (Arc<MemSession>, Arc<MemSession>) {
    let (tx_a, rx_a) = mpsc::unbounded_channel();
    let (tx_b, rx_b) = mpsc::unbounded_channel();
    let a = MemSession {
        to_peer: std::sync::Mutex::new(Some(tx_b)),
        accept: Mutex::new(rx_a),
        next_id: AtomicU64::new(0),
        session_id: 0,
        close_count: AtomicUsize::new(0),
    };
    let b = MemSession {
        to_peer: std::sync::Mutex::new(Some(tx_a)),
        accept: Mutex::new(rx_b),
        next_id: AtomicU64::new(0),
        session_id: 1,
        close_count: AtomicUsize::new(0),
    };
    (Arc::new(a), Arc::new(b))
}

impl MemSession {
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TunnelSession for MemSession {
    type Stream = MemStream;

    async fn open_stream(&self) -> TransportResult<MemStream> {
        let guard = self.to_peer.lock().unwrap();
        let sender = guard.as_ref().ok_or(TransportError::StreamClosed)?;
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        sender
            .send(MemStream { inner: remote, id })
            .map_err(|_| TransportError::StreamClosed)?;
        Ok(MemStream { inner: local, id })
    }

    async fn accept_stream(&self) -> TransportResult<Option<MemStream>> {
        Ok(self.accept.lock().await.recv().await)
    }

    fn close(&self, _error_code: u32, _reason: &str) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.to_peer.lock().unwrap().take();
    }

    fn is_closed(&self) -> bool {
        self.to_peer.lock().unwrap().is_none()
    }

    fn remote_address(&self) -> SocketAddr {
        (std::net::Ipv4Addr::LOCALHOST, 0).into()
    }

    fn session_id(&self) -> u64 {
        self.session_id
    }
}
