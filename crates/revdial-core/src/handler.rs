//! Per-stream dispatch on the accepting side

use async_trait::async_trait;
use revdial_proto::{read_frame, ConnectTarget, MessageType};
use revdial_transport::TunnelStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::conn::TunnelConn;
use crate::pipe;
use crate::upstream::dial_upstream;

/// Hook consulted before the upstream dial.
///
/// Runs synchronously in the handler with the tunneled connection in
/// hand, so an implementation can consume the stream itself (serve it,
/// answer it, proxy it elsewhere) and return `false` to stop the handler
/// from dialing. This is how prefixed dial targets are intercepted on the
/// host side.
#[async_trait]
pub trait DialHijacker<S: TunnelStream>: Send + Sync {
    async fn hijack(&self, conn: &mut TunnelConn<S>, proto: &str, address: &str) -> bool;
}

/// Default hijacker: every dial proceeds.
#[derive(Debug, Default)]
pub struct AllowAll;

#[async_trait]
impl<S: TunnelStream> DialHijacker<S> for AllowAll {
    async fn hijack(&self, _conn: &mut TunnelConn<S>, _proto: &str, _address: &str) -> bool {
        true
    }
}

/// Services one accepted stream: reads its control frame and either echoes
/// keepalive beats or dials the requested target and splices.
///
/// Errors never travel back over the stream; the peer observes a reset or
/// an immediate close. The stream is torn down on every exit path.
pub(crate) async fn handle_stream<S: TunnelStream>(
    mut stream: S,
    hijacker: Arc<dyn DialHijacker<S>>,
    idle_timeout: Duration,
) {
    let stream_id = stream.stream_id();

    let frame = match read_frame(&mut stream).await {
        Ok(frame) => frame,
        Err(err) => {
            warn!(stream_id, error = %err, "failed to read stream header");
            return;
        }
    };

    match frame.message_type {
        MessageType::KeepAlive => respond_keepalive(stream).await,
        MessageType::Connect => {
            let target = match ConnectTarget::parse(&frame.payload) {
                Ok(target) => target,
                Err(err) => {
                    warn!(stream_id, error = %err, "bad connect payload");
                    return;
                }
            };

            debug!(stream_id, proto = %target.proto, address = %target.address, "connect");

            let mut conn = TunnelConn::new(stream, target.proto.clone(), target.address.clone());
            if !hijacker
                .hijack(&mut conn, &target.proto, &target.address)
                .await
            {
                debug!(stream_id, "dial refused by hijacker");
                return;
            }

            // Prefixed dialers put "<prefix>::" in front of the proto; the
            // resolver only understands the bare transport name.
            let proto = target.proto.rsplit("::").next().unwrap_or(&target.proto);

            let upstream = match dial_upstream(proto, &target.address).await {
                Ok(upstream) => upstream,
                Err(err) => {
                    warn!(stream_id, address = %target.address, error = %err, "upstream dial failed");
                    return;
                }
            };

            pipe::splice(conn, upstream, idle_timeout).await;
        }
        MessageType::Unknown(tag) => {
            warn!(stream_id, tag, "unsupported message type");
        }
    }
}

/// Echo loop for the peer's heartbeat stream. Never initiates a beat;
/// reads one byte and writes it back until either side errors.
async fn respond_keepalive<S: TunnelStream>(mut stream: S) {
    let stream_id = stream.stream_id();
    let mut beat = [0u8; 1];
    loop {
        if let Err(err) = stream.read_exact(&mut beat).await {
            debug!(stream_id, error = %err, "keepalive stream ended");
            return;
        }
        if let Err(err) = stream.write_all(&beat).await {
            debug!(stream_id, error = %err, "keepalive echo failed");
            return;
        }
        if let Err(err) = stream.flush().await {
            debug!(stream_id, error = %err, "keepalive flush failed");
            return;
        }
    }
}
