//! Dialer façade over a live session

use revdial_proto::Frame;
use revdial_transport::{TransportError, TransportResult, TunnelSession, TunnelStream};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::conn::TunnelConn;

/// Opens tunnel streams that behave like ordinary outbound connections.
///
/// Each dial opens a fresh stream on the bound session, sends a single
/// CONNECT frame and returns the stream wrapped as a [`TunnelConn`]. With
/// a prefix configured, the wire proto becomes `"<prefix>::<proto>"`; the
/// receiving handler strips the prefix before resolving, and host-side
/// hijackers key on the full prefixed form.
///
/// Cancelling a dial (dropping its future) drops the nascent stream, which
/// resets it at the transport.
#[derive(Debug, Clone)]
pub struct Dialer<S: TunnelSession> {
    session: Arc<S>,
    prefix: Option<String>,
}

impl<S: TunnelSession> Dialer<S> {
    pub fn new(session: Arc<S>) -> Self {
        Self {
            session,
            prefix: None,
        }
    }

    pub fn with_prefix(session: Arc<S>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            session,
            prefix: (!prefix.is_empty()).then_some(prefix),
        }
    }

    /// The session this dialer is bound to.
    pub fn session(&self) -> &Arc<S> {
        &self.session
    }

    pub async fn dial(&self, proto: &str, address: &str) -> TransportResult<TunnelConn<S::Stream>> {
        let mut stream = self.session.open_stream().await?;

        let wire_proto = match &self.prefix {
            Some(prefix) => format!("{prefix}::{proto}"),
            None => proto.to_string(),
        };

        let frame = Frame::connect(&wire_proto, address);
        let encoded = frame.encode().map_err(TransportError::Codec)?;
        stream.write_all(&encoded).await?;
        stream.flush().await?;

        debug!(
            stream_id = stream.stream_id(),
            proto = %wire_proto,
            address,
            "opened tunnel stream"
        );

        Ok(TunnelConn::new(stream, wire_proto, address))
    }
}
