//! Bidirectional splice between two connections

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Bytes moved per copy step. Nothing beyond one chunk is buffered per
/// direction; the transport's flow control does the rest.
pub const COPY_CHUNK: usize = 32 * 1024;

/// Default idle deadline applied to every chunk read and write.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Why one direction of a splice stopped.
#[derive(Debug)]
pub enum CopyEnd {
    Eof,
    IdleTimeout,
    ReadError(io::Error),
    WriteError(io::Error),
}

impl CopyEnd {
    /// EOF and idle expiry are the ordinary ways for a tunnel to wind down.
    pub fn is_clean(&self) -> bool {
        matches!(self, CopyEnd::Eof | CopyEnd::IdleTimeout)
    }
}

/// Result of a finished splice: the outcome of whichever direction
/// stopped first. The other direction is cancelled mid-flight.
#[derive(Debug)]
pub struct SpliceOutcome {
    pub bytes: u64,
    pub end: CopyEnd,
}

/// Splices `a` and `b` until one direction stops, then tears both down.
///
/// The first direction to finish cancels the other (the shared one-shot
/// stop); both write halves are shut down exactly once before returning.
/// Abnormal endings are logged, clean ones are not.
pub async fn splice<A, B>(a: A, b: B, idle_timeout: Duration) -> SpliceOutcome
where
    A: AsyncRead + AsyncWrite + Send + Unpin,
    B: AsyncRead + AsyncWrite + Send + Unpin,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let outcome = {
        let forward = copy_chunks(&mut a_read, &mut b_write, idle_timeout);
        let backward = copy_chunks(&mut b_read, &mut a_write, idle_timeout);
        tokio::pin!(forward, backward);
        tokio::select! {
            outcome = &mut forward => outcome,
            outcome = &mut backward => outcome,
        }
    };

    let _ = a_write.shutdown().await;
    let _ = b_write.shutdown().await;

    if outcome.end.is_clean() {
        debug!(bytes = outcome.bytes, end = ?outcome.end, "pipe finished");
    } else {
        warn!(bytes = outcome.bytes, end = ?outcome.end, "pipe aborted");
    }

    outcome
}

async fn copy_chunks<R, W>(src: &mut R, dst: &mut W, idle: Duration) -> SpliceOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut bytes = 0u64;
    loop {
        let n = match timeout(idle, src.read(&mut buf)).await {
            Err(_) => return SpliceOutcome { bytes, end: CopyEnd::IdleTimeout },
            Ok(Err(err)) => return SpliceOutcome { bytes, end: CopyEnd::ReadError(err) },
            Ok(Ok(0)) => return SpliceOutcome { bytes, end: CopyEnd::Eof },
            Ok(Ok(n)) => n,
        };
        match timeout(idle, dst.write_all(&buf[..n])).await {
            Err(_) => return SpliceOutcome { bytes, end: CopyEnd::IdleTimeout },
            Ok(Err(err)) => return SpliceOutcome { bytes, end: CopyEnd::WriteError(err) },
            Ok(Ok(())) => bytes += n as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_bidirectional_transfer() {
        let (a, a_peer) = tokio::io::duplex(64 * 1024);
        let (b, b_peer) = tokio::io::duplex(64 * 1024);

        let pipe = tokio::spawn(splice(a_peer, b_peer, DEFAULT_IDLE_TIMEOUT));

        let (mut a_read, mut a_write) = tokio::io::split(a);
        let (mut b_read, mut b_write) = tokio::io::split(b);

        let up: Vec<u8> = (0..48_000u32).map(|i| (i % 251) as u8).collect();
        let down: Vec<u8> = (0..48_000u32).map(|i| (i % 241) as u8).collect();

        // Drain the b -> a direction first; closing either side stops the
        // whole pipe, so the last phase is the one that ends with EOF.
        b_write.write_all(&down).await.unwrap();
        b_write.flush().await.unwrap();
        let mut received_down = vec![0u8; down.len()];
        a_read.read_exact(&mut received_down).await.unwrap();
        assert_eq!(received_down, down);

        a_write.write_all(&up).await.unwrap();
        a_write.shutdown().await.unwrap();
        let mut received_up = Vec::new();
        b_read.read_to_end(&mut received_up).await.unwrap();
        assert_eq!(received_up, up);

        let outcome = pipe.await.unwrap();
        assert!(outcome.end.is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_is_clean() {
        // Neither side ever writes; the pipe must wind down on its own.
        let (_a_held, a_peer) = tokio::io::duplex(1024);
        let (_b_held, b_peer) = tokio::io::duplex(1024);

        let outcome = splice(a_peer, b_peer, Duration::from_secs(30)).await;
        assert!(matches!(outcome.end, CopyEnd::IdleTimeout));
        assert!(outcome.end.is_clean());
        assert_eq!(outcome.bytes, 0);
    }

    #[tokio::test]
    async fn test_peer_close_stops_both_directions() {
        let (a, a_peer) = tokio::io::duplex(1024);
        let (b, b_peer) = tokio::io::duplex(1024);

        let pipe = tokio::spawn(splice(a_peer, b_peer, DEFAULT_IDLE_TIMEOUT));

        // Close one endpoint outright; the other should observe EOF.
        drop(a);

        let (mut b_read, _b_write) = tokio::io::split(b);
        let mut buf = Vec::new();
        b_read.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());

        let outcome = pipe.await.unwrap();
        assert!(matches!(outcome.end, CopyEnd::Eof));
    }

    #[tokio::test]
    async fn test_bounded_chunking_moves_large_payloads() {
        let (a, a_peer) = tokio::io::duplex(8 * 1024);
        let (b, b_peer) = tokio::io::duplex(8 * 1024);

        let pipe = tokio::spawn(splice(a_peer, b_peer, DEFAULT_IDLE_TIMEOUT));

        let payload: Vec<u8> = (0..(COPY_CHUNK * 4) as u32).map(|i| (i % 17) as u8).collect();

        let (_a_read, mut a_write) = tokio::io::split(a);
        let (mut b_read, _b_write) = tokio::io::split(b);

        let writer = {
            let payload = payload.clone();
            tokio::spawn(async move {
                a_write.write_all(&payload).await.unwrap();
                a_write.shutdown().await.unwrap();
            })
        };

        let mut received = vec![0u8; payload.len()];
        b_read.read_exact(&mut received).await.unwrap();
        assert_eq!(received, payload);

        writer.await.unwrap();
        let outcome = pipe.await.unwrap();
        assert!(outcome.end.is_clean());
        assert_eq!(outcome.bytes, payload.len() as u64);
    }
}
