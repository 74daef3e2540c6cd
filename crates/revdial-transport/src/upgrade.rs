//! Session upgrade exchange
//!
//! The first stream of a fresh session carries one [`UpgradeRequest`] and
//! one [`UpgradeResponse`], mirroring the CONNECT handshake of a
//! WebTransport endpoint: the request names a path and carries the
//! authorization headers, the response answers with an HTTP status code.
//! Only a status of 200 attaches the session; 400 carries an authorizer
//! error, 401 means not authorized.
//!
//! Messages are bincode-encoded behind a `u32` big-endian length prefix.

use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{TransportError, TransportResult, TunnelSession, TunnelStream};

/// HTTP status answering a successful upgrade.
pub const STATUS_OK: u16 = 200;
/// HTTP status answering an authorizer error.
pub const STATUS_BAD_REQUEST: u16 = 400;
/// HTTP status answering a rejected authorization.
pub const STATUS_UNAUTHORIZED: u16 = 401;
/// HTTP status answering a request for an unknown upgrade path.
pub const STATUS_NOT_FOUND: u16 = 404;

const MAX_UPGRADE_MESSAGE: usize = 64 * 1024;

/// Client half of the upgrade exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeRequest {
    /// Requested upgrade path, e.g. `/connect`.
    pub path: String,
    /// Authorization payload, name/value pairs in request order.
    pub headers: Vec<(String, String)>,
}

impl UpgradeRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Server half of the upgrade exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeResponse {
    pub status: u16,
    pub body: String,
}

/// Sends the upgrade request on a fresh stream and waits for the verdict.
///
/// Any status other than 200 fails with
/// [`TransportError::UpgradeRejected`].
pub async fn request_upgrade<S: TunnelSession>(
    session: &S,
    path: &str,
    headers: &[(String, String)],
) -> TransportResult<()> {
    let mut stream = session.open_stream().await?;

    let request = UpgradeRequest {
        path: path.to_string(),
        headers: headers.to_vec(),
    };
    write_message(&mut stream, &request).await?;
    stream.flush().await?;

    let response: UpgradeResponse = read_message(&mut stream).await?;
    if response.status != STATUS_OK {
        return Err(TransportError::UpgradeRejected {
            status: response.status,
            body: response.body,
        });
    }
    Ok(())
}

/// Accepts the peer's upgrade stream and decodes its request.
///
/// The caller decides the verdict and delivers it through the returned
/// [`UpgradeResponder`].
pub async fn accept_upgrade<S: TunnelSession>(
    session: &S,
) -> TransportResult<(UpgradeRequest, UpgradeResponder<S::Stream>)> {
    let mut stream = session
        .accept_stream()
        .await?
        .ok_or(TransportError::StreamClosed)?;
    let request: UpgradeRequest = read_message(&mut stream).await?;
    Ok((request, UpgradeResponder { stream }))
}

/// Pending reply to an accepted upgrade request.
#[derive(Debug)]
pub struct UpgradeResponder<S: TunnelStream> {
    stream: S,
}

impl<S: TunnelStream> UpgradeResponder<S> {
    /// Writes the verdict and finishes the upgrade stream.
    pub async fn respond(mut self, status: u16, body: &str) -> TransportResult<()> {
        let response = UpgradeResponse {
            status,
            body: body.to_string(),
        };
        write_message(&mut self.stream, &response).await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}

async fn write_message<W, T>(writer: &mut W, message: &T) -> TransportResult<()>
where
    W: tokio::io::AsyncWrite + Unpin,
    T: Serialize,
{
    let payload =
        bincode::serialize(message).map_err(|err| TransportError::Protocol(err.to_string()))?;
    if payload.len() > MAX_UPGRADE_MESSAGE {
        return Err(TransportError::Protocol(format!(
            "upgrade message of {} bytes is too large",
            payload.len()
        )));
    }
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(&payload);
    writer.write_all(&buf).await?;
    Ok(())
}

async fn read_message<R, T>(reader: &mut R) -> TransportResult<T>
where
    R: tokio::io::AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let length = u32::from_be_bytes(len_buf) as usize;
    if length > MAX_UPGRADE_MESSAGE {
        return Err(TransportError::Protocol(format!(
            "upgrade message of {length} bytes is too large"
        )));
    }
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;
    bincode::deserialize(&payload).map_err(|err| TransportError::Protocol(err.to_string()))
}
