//! Transport abstraction for tunnel sessions
//!
//! The tunnel engine never talks to a concrete transport. It consumes a
//! [`TunnelSession`] that can open and accept bidirectional streams and
//! close with an application error code, and a [`TunnelStream`] that is an
//! ordinary async byte channel. Any multiplexed transport that can satisfy
//! those two traits (QUIC today, conceivably WebSocket or TCP+TLS with an
//! external mux) plugs in below the engine without touching it.
//!
//! Deadlines are expressed the Rust way: callers wrap individual reads and
//! writes in `tokio::time::timeout` rather than arming a socket deadline.

pub mod upgrade;

use async_trait::async_trait;
use std::fmt::Debug;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use revdial_proto::CodecError;

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("stream closed")]
    StreamClosed,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("operation timed out")]
    Timeout,

    #[error("upgrade rejected with status {status}: {body}")]
    UpgradeRejected { status: u16, body: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// One logical bidirectional byte channel inside a session.
pub trait TunnelStream: AsyncRead + AsyncWrite + Debug + Send + Unpin + 'static {
    /// Identifier unique within the parent session.
    fn stream_id(&self) -> u64;
}

/// One multiplexed transport instance between two peers.
///
/// A session is owned by exactly one side of the registry at a time;
/// identity comparisons use the `Arc` pointer, not the session id.
#[async_trait]
pub trait TunnelSession: Debug + Send + Sync + 'static {
    type Stream: TunnelStream;

    /// Opens a new bidirectional stream. Fails when the session is dead.
    async fn open_stream(&self) -> TransportResult<Self::Stream>;

    /// Accepts the next peer-initiated stream.
    ///
    /// Returns `None` when the session closed and no more streams will
    /// arrive.
    async fn accept_stream(&self) -> TransportResult<Option<Self::Stream>>;

    /// Closes the session with an application error code. Idempotent.
    fn close(&self, error_code: u32, reason: &str);

    fn is_closed(&self) -> bool;

    fn remote_address(&self) -> SocketAddr;

    /// Stable identifier for logging and correlation.
    fn session_id(&self) -> u64;
}
