//! QUIC session implementation

use async_trait::async_trait;
use quinn::Connection;
use revdial_transport::{TransportError, TransportResult, TunnelSession};
use std::net::SocketAddr;
use tracing::{debug, trace};

use crate::stream::QuicStream;

/// QUIC-backed tunnel session.
#[derive(Debug, Clone)]
pub struct QuicSession {
    inner: Connection,
}

impl QuicSession {
    pub fn new(connection: Connection) -> Self {
        Self { inner: connection }
    }
}

#[async_trait]
impl TunnelSession for QuicSession {
    type Stream = QuicStream;

    async fn open_stream(&self) -> TransportResult<Self::Stream> {
        let (send, recv) = self
            .inner
            .open_bi()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        trace!(stream_id = send.id().index(), "opened bidirectional stream");

        Ok(QuicStream::new(send, recv))
    }

    async fn accept_stream(&self) -> TransportResult<Option<Self::Stream>> {
        match self.inner.accept_bi().await {
            Ok((send, recv)) => {
                trace!(stream_id = send.id().index(), "accepted bidirectional stream");
                Ok(Some(QuicStream::new(send, recv)))
            }
            Err(quinn::ConnectionError::ApplicationClosed(_))
            | Err(quinn::ConnectionError::ConnectionClosed(_))
            | Err(quinn::ConnectionError::LocallyClosed) => {
                debug!("session closed");
                Ok(None)
            }
            Err(quinn::ConnectionError::TimedOut) => {
                debug!("session timed out");
                Ok(None)
            }
            Err(quinn::ConnectionError::Reset) => {
                debug!("session reset");
                Ok(None)
            }
            Err(e) => Err(TransportError::Connection(e.to_string())),
        }
    }

    fn close(&self, error_code: u32, reason: &str) {
        self.inner
            .close(quinn::VarInt::from_u32(error_code), reason.as_bytes());

        debug!(
            session_id = self.inner.stable_id(),
            error_code, reason, "session closed"
        );
    }

    fn is_closed(&self) -> bool {
        self.inner.close_reason().is_some()
    }

    fn remote_address(&self) -> SocketAddr {
        self.inner.remote_address()
    }

    fn session_id(&self) -> u64 {
        self.inner.stable_id() as u64
    }
}
