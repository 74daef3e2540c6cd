//! QUIC transport for the reverse dialer tunnel, built on quinn
//!
//! Implements the `revdial-transport` traits over native QUIC streams:
//! one [`QuicSession`] per connection, one [`QuicStream`] per
//! bidirectional stream. TLS 1.3 comes with the protocol; the tunnel
//! advertises ALPN `h3` and leaves datagram support at quinn's default
//! (enabled, currently unused).

pub mod config;
pub mod connection;
pub mod listener;
pub mod stream;

pub use config::QuicConfig;
pub use connection::QuicSession;
pub use listener::{QuicConnector, QuicListener};
pub use stream::QuicStream;
