//! Wire protocol for the reverse dialer tunnel
//!
//! Every tunnel stream starts with exactly one control frame. After that
//! frame the stream is either the keepalive duplex channel (`KeepAlive`)
//! or a raw bidirectional byte pipe toward the dial target (`Connect`).
//!
//! On-wire layout:
//!
//! ```text
//! length: u32 (big endian) || type: u8 || payload: length - 1 bytes
//! ```
//!
//! The length counts the type octet plus the payload. A `Connect` payload
//! is the ASCII string `"<proto>/<address>"`; a `KeepAlive` payload is
//! empty.

mod codec;
mod message;

pub use codec::{read_frame, CodecError, Frame, MAX_FRAME_PAYLOAD};
pub use message::{ConnectTarget, MessageType};
