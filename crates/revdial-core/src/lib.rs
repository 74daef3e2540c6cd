//! Reverse dialer tunnel engine
//!
//! The pieces that make a session useful once a transport has produced
//! one:
//!
//! - [`TunnelConn`] presents a tunnel stream as an ordinary connection
//!   labelled with its dial target.
//! - [`Dialer`] opens a stream, sends the CONNECT frame and hands back a
//!   connection.
//! - The stream handler answers the peer side of a stream: keepalive echo
//!   or upstream dial plus [`pipe::splice`].
//! - [`run_session`] is the per-session accept loop with token-bucket
//!   admission control and active-stream accounting.
//! - [`SessionRegistry`] maps client keys to their live sessions and picks
//!   one at random per dial.

mod conn;
mod dialer;
mod handler;
mod limiter;
pub mod pipe;
mod registry;
mod session;
mod upstream;

#[cfg(test)]
mod testutil;

pub use conn::{TunnelAddr, TunnelConn};
pub use dialer::Dialer;
pub use handler::{AllowAll, DialHijacker};
pub use limiter::RateLimiter;
pub use registry::{RegistryError, SessionRegistry, SHUTDOWN_CODE};
pub use session::{run_session, SessionConfig, StreamStats};
pub use upstream::{dial_upstream, Upstream};
