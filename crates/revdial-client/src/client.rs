//! Outbound session establishment and the keepalive engine

use revdial_core::{run_session, AllowAll, Dialer, DialHijacker, SessionConfig, StreamStats};
use revdial_proto::Frame;
use revdial_transport::upgrade::request_upgrade;
use revdial_transport::{TransportError, TunnelSession, TunnelStream};
use revdial_transport_quic::{QuicConfig, QuicConnector, QuicSession, QuicStream};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info};
use url::Url;

/// Client key a connected agent serves its own session loop under.
const LOCAL_CLIENT_KEY: &str = "local";

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("server URL must use the https scheme, got {0:?}")]
    NotHttps(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("not connected")]
    NotConnected,
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server URL, e.g. `https://tunnel.example.com:8443/connect`.
    pub server_url: String,

    /// Headers sent with the upgrade request (the authorizer payload).
    pub headers: Vec<(String, String)>,

    /// Interval between keepalive beats.
    pub keepalive_interval: Duration,

    /// How long to wait for each echoed beat.
    pub keepalive_timeout: Duration,

    /// Skip server certificate verification. On by default: agents
    /// typically talk to self-signed development servers. Turn off
    /// against CA-signed material.
    pub insecure: bool,

    /// Knobs for the agent-side session loop serving reverse dials.
    pub session: SessionConfig,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            headers: Vec::new(),
            keepalive_interval: Duration::from_secs(3),
            keepalive_timeout: Duration::from_secs(15),
            insecure: true,
            session: SessionConfig::default(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.keepalive_timeout = timeout;
        self
    }

    /// Verify the server certificate against the system roots.
    pub fn with_verified_tls(mut self) -> Self {
        self.insecure = false;
        self
    }
}

/// The tunnel agent.
pub struct Client {
    config: ClientConfig,
    host: String,
    port: u16,
    path: String,
    session: Arc<Mutex<Option<Arc<QuicSession>>>>,
    hijacker: Arc<dyn DialHijacker<QuicStream>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let url = Url::parse(&config.server_url).map_err(|err| ClientError::InvalidUrl {
            url: config.server_url.clone(),
            reason: err.to_string(),
        })?;

        if url.scheme() != "https" {
            return Err(ClientError::NotHttps(url.scheme().to_string()));
        }

        let host = url
            .host_str()
            .ok_or_else(|| ClientError::InvalidUrl {
                url: config.server_url.clone(),
                reason: "missing host".to_string(),
            })?
            .to_string();
        let port = url.port().unwrap_or(443);
        let path = url.path().to_string();

        Ok(Self {
            config,
            host,
            port,
            path,
            session: Arc::new(Mutex::new(None)),
            hijacker: Arc::new(AllowAll),
        })
    }

    /// Replaces the dial hijacker applied when the server reverse-dials
    /// through this agent.
    pub fn with_hijacker(mut self, hijacker: Arc<dyn DialHijacker<QuicStream>>) -> Self {
        self.hijacker = hijacker;
        self
    }

    /// Establishes the session and drives the keepalive loop.
    ///
    /// Blocks until the session dies, returning the terminating error.
    /// A no-op when already connected. Drivers typically call this in a
    /// loop with a backoff.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.session.lock().await.is_some() {
            return Ok(());
        }

        let session = self.establish().await?;

        // Serve the session loop in the background so the server can
        // reverse-dial through this agent.
        tokio::spawn({
            let session = session.clone();
            let stats = Arc::new(StreamStats::new());
            let hijacker = self.hijacker.clone();
            let session_config = self.config.session.clone();
            async move {
                run_session(LOCAL_CLIENT_KEY, session, stats, hijacker, &session_config).await;
            }
        });

        let mut keepalive_stream = session.open_stream().await?;
        let frame = Frame::keepalive().encode().map_err(TransportError::Codec)?;
        write_stream(&mut keepalive_stream, &frame).await?;

        *self.session.lock().await = Some(session.clone());

        info!(server = %self.config.server_url, "connected to tunnel server");

        let result = self
            .run_keepalive(&mut keepalive_stream)
            .await;

        *self.session.lock().await = None;
        session.close(0, "keepalive failed");

        result
    }

    /// Closes the current session, if any.
    pub async fn close(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.close(0, "client closed");
        }
    }

    /// A dialer bound to the live session.
    pub async fn get_dialer(&self) -> Result<Dialer<QuicSession>, ClientError> {
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or(ClientError::NotConnected)?;
        Ok(Dialer::new(session.clone()))
    }

    /// A dialer whose wire proto carries `"<prefix>::"`, for host-side
    /// hijackers to intercept.
    pub async fn get_prefix_dialer(&self, prefix: &str) -> Result<Dialer<QuicSession>, ClientError> {
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or(ClientError::NotConnected)?;
        Ok(Dialer::with_prefix(session.clone(), prefix))
    }

    async fn establish(&self) -> Result<Arc<QuicSession>, ClientError> {
        let addr = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(TransportError::Io)?
            .next()
            .ok_or_else(|| {
                ClientError::Transport(TransportError::Connection(format!(
                    "no addresses found for {}",
                    self.host
                )))
            })?;

        let quic = if self.config.insecure {
            QuicConfig::client_insecure()
        } else {
            QuicConfig::client_default()
        };
        let connector = QuicConnector::new(Arc::new(quic))?;

        let session = connector.connect(addr, &self.host).await?;

        request_upgrade(&session, &self.path, &self.config.headers).await?;

        Ok(Arc::new(session))
    }

    /// Beats every `keepalive_interval`: one byte out, one byte echoed
    /// back. Any error, including a missed echo, means the session is
    /// dead.
    async fn run_keepalive(&self, stream: &mut QuicStream) -> Result<(), ClientError> {
        let stream_id = stream.stream_id();
        let mut beat = [0u8; 1];
        loop {
            tokio::time::sleep(self.config.keepalive_interval).await;

            write_stream(stream, &beat).await?;
            debug!(stream_id, "sent keepalive");

            match timeout(self.config.keepalive_timeout, stream.read_exact(&mut beat)).await {
                Err(_) => return Err(ClientError::Transport(TransportError::Timeout)),
                Ok(Err(err)) => return Err(ClientError::Transport(err.into())),
                Ok(Ok(_)) => debug!(stream_id, "read keepalive"),
            }
        }
    }
}

async fn write_stream(stream: &mut QuicStream, bytes: &[u8]) -> Result<(), ClientError> {
    stream.write_all(bytes).await.map_err(TransportError::Io)?;
    stream.flush().await.map_err(TransportError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_https_url() {
        let err = Client::new(ClientConfig::new("http://example.test/connect")).unwrap_err();
        assert!(matches!(err, ClientError::NotHttps(_)));
    }

    #[test]
    fn test_rejects_unparseable_url() {
        let err = Client::new(ClientConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl { .. }));
    }

    #[test]
    fn test_url_parts_extracted() {
        let client =
            Client::new(ClientConfig::new("https://tunnel.example.com:8443/connect")).unwrap();
        assert_eq!(client.host, "tunnel.example.com");
        assert_eq!(client.port, 8443);
        assert_eq!(client.path, "/connect");
    }

    #[test]
    fn test_default_port_is_443() {
        let client = Client::new(ClientConfig::new("https://tunnel.example.com/connect")).unwrap();
        assert_eq!(client.port, 443);
    }

    #[tokio::test]
    async fn test_dialer_requires_connection() {
        let client = Client::new(ClientConfig::new("https://example.test/connect")).unwrap();
        assert!(matches!(
            client.get_dialer().await,
            Err(ClientError::NotConnected)
        ));
    }
}
