//! Encoding and decoding of length-prefixed control frames

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::message::MessageType;

/// Largest payload accepted or produced on the wire.
pub const MAX_FRAME_PAYLOAD: usize = 64 * 1024;

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame length of zero (missing type octet)")]
    EmptyFrame,

    #[error("frame payload of {0} bytes exceeds the {MAX_FRAME_PAYLOAD} byte cap")]
    PayloadTooLarge(usize),

    #[error("malformed connect target {0:?}")]
    BadConnectTarget(String),
}

/// A single control frame as carried at the start of every stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: MessageType,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(message_type: MessageType, payload: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            payload: payload.into(),
        }
    }

    /// A `Connect` frame targeting `proto/address`.
    pub fn connect(proto: &str, address: &str) -> Self {
        Self::new(
            MessageType::Connect,
            format!("{proto}/{address}").into_bytes(),
        )
    }

    /// A `KeepAlive` frame. The payload is always empty.
    pub fn keepalive() -> Self {
        Self::new(MessageType::KeepAlive, Bytes::new())
    }

    /// On-wire size: length prefix, type octet, payload.
    pub fn encoded_len(&self) -> usize {
        4 + 1 + self.payload.len()
    }

    /// Encodes into a single contiguous buffer. Callers write it with one
    /// call so no other frame can interleave on the same stream.
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        if self.payload.len() > MAX_FRAME_PAYLOAD {
            return Err(CodecError::PayloadTooLarge(self.payload.len()));
        }
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u32((1 + self.payload.len()) as u32);
        buf.put_u8(self.message_type.as_u8());
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }
}

/// Reads exactly one frame from the head of a stream.
///
/// Short reads at any stage surface the underlying I/O error. A length of
/// zero leaves no room for the type octet and is a framing error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let length = u32::from_be_bytes(len_buf) as usize;
    if length == 0 {
        return Err(CodecError::EmptyFrame);
    }
    if length - 1 > MAX_FRAME_PAYLOAD {
        return Err(CodecError::PayloadTooLarge(length - 1));
    }

    let mut tag = [0u8; 1];
    reader.read_exact(&mut tag).await?;

    let mut payload = vec![0u8; length - 1];
    reader.read_exact(&mut payload).await?;

    Ok(Frame {
        message_type: MessageType::from(tag[0]),
        payload: payload.into(),
    })
}
