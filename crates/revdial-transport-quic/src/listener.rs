//! QUIC listener and connector implementations

use quinn::Endpoint;
use revdial_transport::{TransportError, TransportResult};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::QuicConfig;
use crate::connection::QuicSession;

/// Accepts inbound QUIC sessions.
#[derive(Debug)]
pub struct QuicListener {
    endpoint: Endpoint,
}

impl QuicListener {
    pub fn new(bind_addr: SocketAddr, config: Arc<QuicConfig>) -> TransportResult<Self> {
        config.validate()?;

        let server_config = config.build_server_config()?;

        let endpoint = Endpoint::server(server_config, bind_addr).map_err(TransportError::Io)?;

        let local_addr = endpoint.local_addr().map_err(TransportError::Io)?;

        info!(%local_addr, "QUIC listener bound");

        Ok(Self { endpoint })
    }

    /// Accepts the next fully established session.
    ///
    /// Failed handshakes are logged and skipped; the error case means the
    /// endpoint itself is gone.
    pub async fn accept(&self) -> TransportResult<(QuicSession, SocketAddr)> {
        loop {
            match self.endpoint.accept().await {
                Some(connecting) => {
                    let remote = connecting.remote_address();

                    debug!(%remote, "incoming QUIC connection");

                    match connecting.await {
                        Ok(connection) => {
                            info!(%remote, "QUIC connection established");
                            return Ok((QuicSession::new(connection), remote));
                        }
                        Err(e) => {
                            error!(%remote, error = %e, "QUIC handshake failed");
                            continue;
                        }
                    }
                }
                None => {
                    return Err(TransportError::Connection(
                        "QUIC endpoint closed".to_string(),
                    ));
                }
            }
        }
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.endpoint.local_addr().map_err(TransportError::Io)
    }

    /// Stop accepting new sessions.
    pub fn close(&self) {
        self.endpoint.close(0u32.into(), b"listener closed");
        info!("QUIC listener closed");
    }
}

/// Establishes outbound QUIC sessions.
#[derive(Debug)]
pub struct QuicConnector {
    endpoint: Endpoint,
}

impl QuicConnector {
    pub fn new(config: Arc<QuicConfig>) -> TransportResult<Self> {
        config.validate()?;

        let client_config = config.build_client_config()?;

        let bind: SocketAddr = (std::net::Ipv4Addr::UNSPECIFIED, 0).into();
        let mut endpoint = Endpoint::client(bind).map_err(TransportError::Io)?;

        endpoint.set_default_client_config(client_config);

        debug!("QUIC connector created");

        Ok(Self { endpoint })
    }

    pub async fn connect(
        &self,
        addr: SocketAddr,
        server_name: &str,
    ) -> TransportResult<QuicSession> {
        debug!(%addr, server_name, "connecting to QUIC server");

        let connecting = self
            .endpoint
            .connect(addr, server_name)
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let connection = connecting
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        info!(%addr, server_name, "QUIC connection established");

        Ok(QuicSession::new(connection))
    }
}
