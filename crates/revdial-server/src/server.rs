//! Session intake: accept, authorize, register, serve

use revdial_core::{
    run_session, AllowAll, Dialer, DialHijacker, RegistryError, SessionConfig, SessionRegistry,
    StreamStats,
};
use revdial_transport::upgrade::{
    accept_upgrade, STATUS_BAD_REQUEST, STATUS_NOT_FOUND, STATUS_OK, STATUS_UNAUTHORIZED,
};
use revdial_transport::{TransportError, TunnelSession};
use revdial_transport_quic::{QuicConfig, QuicListener, QuicSession, QuicStream};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::{AuthDecision, Authorizer, HeaderAuthorizer};

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("certificate error: {0}")]
    Certificate(#[from] revdial_cert::SelfSignedError),
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// QUIC listen address.
    pub listen_addr: SocketAddr,

    /// Upgrade path clients must request.
    pub upgrade_path: String,

    /// TLS certificate path. Generated self-signed when missing.
    pub certificate: PathBuf,

    /// TLS private key path. Generated alongside the certificate.
    pub certificate_key: PathBuf,

    /// Per-session accept-loop and pipe knobs.
    pub session: SessionConfig,
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            upgrade_path: "/connect".to_string(),
            certificate: PathBuf::from("cert.pem"),
            certificate_key: PathBuf::from("key.pem"),
            session: SessionConfig::default(),
        }
    }

    pub fn with_upgrade_path(mut self, path: impl Into<String>) -> Self {
        self.upgrade_path = path.into();
        self
    }

    pub fn with_certificate(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.certificate = cert.into();
        self.certificate_key = key.into();
        self
    }

    pub fn with_session_config(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}

/// The tunnel server: accepts upgrades and serves registered sessions.
pub struct Server {
    config: ServerConfig,
    listener: QuicListener,
    registry: Arc<SessionRegistry<QuicSession>>,
    authorizer: Arc<dyn Authorizer>,
    hijacker: Arc<dyn DialHijacker<QuicStream>>,
}

impl Server {
    /// Binds the QUIC listener. When either TLS file is missing, a
    /// self-signed development certificate is generated and persisted
    /// first.
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        if revdial_cert::ensure_certificate(&config.certificate, &config.certificate_key)? {
            info!(
                cert = %config.certificate.display(),
                key = %config.certificate_key.display(),
                "generated new certificate files"
            );
        }

        let quic = QuicConfig::server_default(&config.certificate, &config.certificate_key);
        let listener = QuicListener::new(config.listen_addr, Arc::new(quic))?;

        Ok(Self {
            config,
            listener,
            registry: Arc::new(SessionRegistry::new()),
            authorizer: Arc::new(HeaderAuthorizer::new()),
            hijacker: Arc::new(AllowAll),
        })
    }

    /// Replaces the upgrade authorizer. Call before [`Server::run`].
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Replaces the dial hijacker applied by stream handlers.
    pub fn with_hijacker(mut self, hijacker: Arc<dyn DialHijacker<QuicStream>>) -> Self {
        self.hijacker = hijacker;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// The session registry, for callers that want to dial through
    /// registered agents.
    pub fn registry(&self) -> &Arc<SessionRegistry<QuicSession>> {
        &self.registry
    }

    /// A dialer over a random live session of this client.
    pub fn get_dialer(&self, client_key: &str) -> Result<Dialer<QuicSession>, RegistryError> {
        self.registry.get_dialer(client_key)
    }

    /// Accepts sessions until the endpoint closes. Each connection gets
    /// its own intake task; a failed upgrade never disturbs the others.
    pub async fn run(&self) -> Result<(), ServerError> {
        info!(listen_addr = %self.config.listen_addr, "server running");
        loop {
            let (session, remote) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => {
                    info!("listener closed, accept loop ending");
                    return Ok(());
                }
            };

            let upgrade_path = self.config.upgrade_path.clone();
            let session_config = self.config.session.clone();
            let authorizer = self.authorizer.clone();
            let hijacker = self.hijacker.clone();
            let registry = self.registry.clone();

            tokio::spawn(handle_connection(
                session,
                remote,
                upgrade_path,
                session_config,
                authorizer,
                hijacker,
                registry,
            ));
        }
    }

    /// Closes every registered session ("server shutdown") and stops the
    /// listener.
    pub fn shutdown(&self) {
        self.registry.remove_all();
        self.listener.close();
    }
}

async fn handle_connection(
    session: QuicSession,
    remote: SocketAddr,
    upgrade_path: String,
    session_config: SessionConfig,
    authorizer: Arc<dyn Authorizer>,
    hijacker: Arc<dyn DialHijacker<QuicStream>>,
    registry: Arc<SessionRegistry<QuicSession>>,
) {
    let session = Arc::new(session);

    let (request, responder) = match accept_upgrade(session.as_ref()).await {
        Ok(accepted) => accepted,
        Err(err) => {
            warn!(%remote, error = %err, "upgrade exchange failed");
            return;
        }
    };

    if request.path != upgrade_path {
        warn!(%remote, path = %request.path, "unknown upgrade path");
        let _ = responder.respond(STATUS_NOT_FOUND, "not found").await;
        return;
    }

    let client_key = match authorizer.authorize(&request).await {
        Ok(AuthDecision::Allow { client_key }) => client_key,
        Ok(AuthDecision::Deny) => {
            warn!(%remote, "upgrade not authorized");
            let _ = responder
                .respond(STATUS_UNAUTHORIZED, "failed authentication")
                .await;
            return;
        }
        Err(err) => {
            warn!(%remote, error = %err, "authorizer error");
            let _ = responder
                .respond(STATUS_BAD_REQUEST, &err.to_string())
                .await;
            return;
        }
    };

    if let Err(err) = responder.respond(STATUS_OK, "").await {
        warn!(%remote, client_key, error = %err, "failed to answer upgrade");
        return;
    }

    info!(%remote, client_key, session_id = session.session_id(), "session established");

    let stats = Arc::new(StreamStats::new());
    registry.add(&client_key, session.clone());
    run_session(&client_key, session.clone(), stats, hijacker, &session_config).await;
    registry.remove(&client_key, &session);

    info!(client_key, "session removed");
}
