//! Per-session accept loop

use revdial_transport::TunnelSession;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::handler::{handle_stream, DialHijacker};
use crate::limiter::RateLimiter;
use crate::pipe;

/// Knobs for a session's accept loop and its stream handlers. Set once
/// before serving.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Stream admissions per second.
    pub rate_limit: u32,
    /// Admission burst.
    pub rate_burst: u32,
    /// Idle deadline for each pipe direction.
    pub pipe_idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rate_limit: 10_000,
            rate_burst: 15_000,
            pipe_idle_timeout: pipe::DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Per-session gauge of currently running stream handlers.
#[derive(Debug, Default)]
pub struct StreamStats {
    active: AtomicI64,
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_streams(&self) -> i64 {
        self.active.load(Ordering::SeqCst)
    }
}

struct ActiveStreamGuard(Arc<StreamStats>);

impl ActiveStreamGuard {
    /// Counts a handler in. The guard counts it back out exactly once,
    /// however the handler exits.
    fn enter(stats: &Arc<StreamStats>) -> Self {
        stats.active.fetch_add(1, Ordering::SeqCst);
        Self(stats.clone())
    }
}

impl Drop for ActiveStreamGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Accepts streams on `session` until it dies.
///
/// Admission is paced by a token bucket governing stream acceptance, not
/// per-stream bytes. Each accepted stream runs its handler on a fresh
/// task, concurrent with further accepts. There is no queue in between:
/// the limiter throttles acceptance and the transport throttles
/// per-stream I/O.
pub async fn run_session<S: TunnelSession>(
    client_key: &str,
    session: Arc<S>,
    stats: Arc<StreamStats>,
    hijacker: Arc<dyn DialHijacker<S::Stream>>,
    config: &SessionConfig,
) {
    let limiter = RateLimiter::new(config.rate_limit, config.rate_burst);
    let remote = session.remote_address();

    info!(
        client_key,
        %remote,
        session_id = session.session_id(),
        "session accept loop started"
    );

    loop {
        limiter.acquire().await;

        let stream = match session.accept_stream().await {
            Ok(Some(stream)) => stream,
            Ok(None) => {
                info!(client_key, %remote, "session closed");
                return;
            }
            Err(err) => {
                warn!(client_key, %remote, error = %err, "accept stream failed");
                return;
            }
        };

        let guard = ActiveStreamGuard::enter(&stats);
        let hijacker = hijacker.clone();
        let idle_timeout = config.pipe_idle_timeout;
        tokio::spawn(async move {
            handle_stream(stream, hijacker, idle_timeout).await;
            drop(guard);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::AllowAll;
    use crate::testutil::session_pair;
    use revdial_proto::Frame;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_session_loop_dispatches_streams() {
        let (local, remote) = session_pair();
        let stats = Arc::new(StreamStats::new());

        let loop_task = tokio::spawn({
            let stats = stats.clone();
            async move {
                run_session(
                    "t1",
                    remote,
                    stats,
                    Arc::new(AllowAll),
                    &SessionConfig::default(),
                )
                .await;
            }
        });

        // Each stream gets its own keepalive responder.
        for _ in 0..3 {
            let mut stream = local.open_stream().await.unwrap();
            stream
                .write_all(&Frame::keepalive().encode().unwrap())
                .await
                .unwrap();
            stream.write_all(&[0x42]).await.unwrap();
            let mut beat = [0u8; 1];
            stream.read_exact(&mut beat).await.unwrap();
            assert_eq!(beat, [0x42]);
        }

        // Dropping the opener ends the accept loop.
        drop(local);
        loop_task.await.unwrap();

        // Handlers wind down once their streams are gone.
        for _ in 0..50 {
            if stats.active_streams() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(stats.active_streams(), 0);
    }

    #[tokio::test]
    async fn test_active_streams_tracks_open_handlers() {
        let (local, remote) = session_pair();
        let stats = Arc::new(StreamStats::new());

        let loop_task = tokio::spawn({
            let stats = stats.clone();
            async move {
                run_session(
                    "t1",
                    remote,
                    stats,
                    Arc::new(AllowAll),
                    &SessionConfig::default(),
                )
                .await;
            }
        });

        let mut stream = local.open_stream().await.unwrap();
        stream
            .write_all(&Frame::keepalive().encode().unwrap())
            .await
            .unwrap();
        stream.write_all(&[0x00]).await.unwrap();
        let mut beat = [0u8; 1];
        stream.read_exact(&mut beat).await.unwrap();

        assert_eq!(stats.active_streams(), 1);

        drop(stream);
        drop(local);
        loop_task.await.unwrap();

        for _ in 0..50 {
            if stats.active_streams() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(stats.active_streams(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_is_rate_limited() {
        let (local, remote) = session_pair();
        let stats = Arc::new(StreamStats::new());

        let config = SessionConfig {
            rate_limit: 10,
            rate_burst: 10,
            ..SessionConfig::default()
        };

        let loop_task = tokio::spawn({
            let stats = stats.clone();
            async move {
                run_session("t1", remote, stats, Arc::new(AllowAll), &config).await;
            }
        });

        // 20 keepalive streams: the first 10 are admitted from the burst,
        // the rest pace out at one per 100ms.
        let start = tokio::time::Instant::now();
        let mut streams = Vec::new();
        for _ in 0..20 {
            let mut stream = local.open_stream().await.unwrap();
            stream
                .write_all(&Frame::keepalive().encode().unwrap())
                .await
                .unwrap();
            stream.write_all(&[0x00]).await.unwrap();
            let mut beat = [0u8; 1];
            stream.read_exact(&mut beat).await.unwrap();
            streams.push(stream);
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(900), "elapsed {elapsed:?}");

        drop(streams);
        drop(local);
        loop_task.await.unwrap();
    }
}
