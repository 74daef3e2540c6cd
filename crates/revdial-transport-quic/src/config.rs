//! QUIC transport configuration

use revdial_transport::{TransportError, TransportResult};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default ALPN protocol carried by the tunnel endpoints.
pub const DEFAULT_ALPN: &str = "h3";

/// Default cap on concurrent bidirectional streams per session.
pub const DEFAULT_MAX_STREAMS: u64 = 100_000;

/// QUIC-specific configuration
#[derive(Debug, Clone)]
pub struct QuicConfig {
    /// Server certificate path (for servers)
    pub server_cert_path: Option<PathBuf>,

    /// Server private key path (for servers)
    pub server_key_path: Option<PathBuf>,

    /// Whether clients verify the server's TLS certificate
    pub verify_server_cert: bool,

    /// ALPN protocols offered/accepted
    pub alpn_protocols: Vec<String>,

    /// Transport-level keep-alive interval
    pub keep_alive_interval: Duration,

    /// Maximum idle timeout before the transport declares the peer gone
    pub max_idle_timeout: Duration,

    /// Maximum number of concurrent bidirectional streams
    pub max_concurrent_streams: u64,
}

impl QuicConfig {
    /// Client configuration verifying against the system roots.
    pub fn client_default() -> Self {
        Self {
            server_cert_path: None,
            server_key_path: None,
            verify_server_cert: true,
            alpn_protocols: vec![DEFAULT_ALPN.to_string()],
            keep_alive_interval: Duration::from_secs(5),
            max_idle_timeout: Duration::from_secs(30),
            max_concurrent_streams: DEFAULT_MAX_STREAMS,
        }
    }

    /// Client configuration that skips certificate verification.
    ///
    /// Intended for development against self-signed server certificates;
    /// never use it in production.
    pub fn client_insecure() -> Self {
        Self {
            verify_server_cert: false,
            ..Self::client_default()
        }
    }

    /// Server configuration reading TLS material from the given paths.
    pub fn server_default(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            server_cert_path: Some(cert_path.into()),
            server_key_path: Some(key_path.into()),
            verify_server_cert: true,
            alpn_protocols: vec![DEFAULT_ALPN.to_string()],
            keep_alive_interval: Duration::from_secs(5),
            max_idle_timeout: Duration::from_secs(30),
            max_concurrent_streams: DEFAULT_MAX_STREAMS,
        }
    }

    /// Set custom keep-alive interval
    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Set custom idle timeout
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.max_idle_timeout = timeout;
        self
    }

    /// Set maximum concurrent streams
    pub fn with_max_streams(mut self, max: u64) -> Self {
        self.max_concurrent_streams = max;
        self
    }

    /// Set custom ALPN protocols
    pub fn with_alpn_protocols(mut self, protocols: Vec<String>) -> Self {
        self.alpn_protocols = protocols;
        self
    }

    pub fn validate(&self) -> TransportResult<()> {
        if self.keep_alive_interval.is_zero() {
            return Err(TransportError::Configuration(
                "keep-alive interval must be > 0".to_string(),
            ));
        }
        if self.max_idle_timeout < self.keep_alive_interval * 2 {
            return Err(TransportError::Configuration(
                "idle timeout must be at least 2x the keep-alive interval".to_string(),
            ));
        }
        Ok(())
    }

    /// Build quinn ClientConfig
    pub(crate) fn build_client_config(&self) -> TransportResult<quinn::ClientConfig> {
        let mut client_crypto = if self.verify_server_cert {
            let mut roots = quinn::rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            quinn::rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        } else {
            quinn::rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(SkipVerification::new())
                .with_no_client_auth()
        };

        client_crypto.alpn_protocols = self
            .alpn_protocols
            .iter()
            .map(|s| s.as_bytes().to_vec())
            .collect();

        let mut client_config = quinn::ClientConfig::new(Arc::new(
            quinn::crypto::rustls::QuicClientConfig::try_from(client_crypto)
                .map_err(|e| TransportError::Tls(e.to_string()))?,
        ));

        client_config.transport_config(Arc::new(self.build_transport_config()?));

        Ok(client_config)
    }

    /// Build quinn ServerConfig
    pub(crate) fn build_server_config(&self) -> TransportResult<quinn::ServerConfig> {
        let cert_path = self.server_cert_path.as_ref().ok_or_else(|| {
            TransportError::Configuration("server cert path required".to_string())
        })?;
        let key_path = self.server_key_path.as_ref().ok_or_else(|| {
            TransportError::Configuration("server key path required".to_string())
        })?;

        let certs = load_certs(cert_path)?;
        let key = load_private_key(key_path)?;

        let mut server_crypto = quinn::rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| TransportError::Tls(format!("invalid cert/key: {e}")))?;

        server_crypto.alpn_protocols = self
            .alpn_protocols
            .iter()
            .map(|s| s.as_bytes().to_vec())
            .collect();

        let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(
            quinn::crypto::rustls::QuicServerConfig::try_from(server_crypto)
                .map_err(|e| TransportError::Tls(e.to_string()))?,
        ));

        server_config.transport_config(Arc::new(self.build_transport_config()?));

        Ok(server_config)
    }

    fn build_transport_config(&self) -> TransportResult<quinn::TransportConfig> {
        let mut transport = quinn::TransportConfig::default();
        transport.keep_alive_interval(Some(self.keep_alive_interval));
        transport.max_idle_timeout(Some(self.max_idle_timeout.try_into().map_err(|_| {
            TransportError::Configuration("idle timeout out of range".to_string())
        })?));
        transport.max_concurrent_bidi_streams(
            self.max_concurrent_streams
                .try_into()
                .map_err(|_| TransportError::Configuration("max streams out of range".to_string()))?,
        );
        Ok(transport)
    }
}

// Helper functions for loading certificates

fn load_certs(
    path: &Path,
) -> TransportResult<Vec<quinn::rustls::pki_types::CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| TransportError::Tls(format!("failed to open cert file: {e}")))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TransportError::Tls(format!("failed to parse certs: {e}")))
}

fn load_private_key(
    path: &Path,
) -> TransportResult<quinn::rustls::pki_types::PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| TransportError::Tls(format!("failed to open key file: {e}")))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TransportError::Tls(format!("failed to parse key: {e}")))?
        .ok_or_else(|| TransportError::Tls("no private key found".to_string()))
}

// Certificate verifier that skips verification (development only)
#[derive(Debug)]
struct SkipVerification;

impl SkipVerification {
    fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl quinn::rustls::client::danger::ServerCertVerifier for SkipVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &quinn::rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[quinn::rustls::pki_types::CertificateDer<'_>],
        _server_name: &quinn::rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: quinn::rustls::pki_types::UnixTime,
    ) -> Result<quinn::rustls::client::danger::ServerCertVerified, quinn::rustls::Error> {
        Ok(quinn::rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &quinn::rustls::pki_types::CertificateDer<'_>,
        _dss: &quinn::rustls::DigitallySignedStruct,
    ) -> Result<quinn::rustls::client::danger::HandshakeSignatureValid, quinn::rustls::Error> {
        Ok(quinn::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &quinn::rustls::pki_types::CertificateDer<'_>,
        _dss: &quinn::rustls::DigitallySignedStruct,
    ) -> Result<quinn::rustls::client::danger::HandshakeSignatureValid, quinn::rustls::Error> {
        Ok(quinn::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<quinn::rustls::SignatureScheme> {
        use quinn::rustls::SignatureScheme;
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::ED448,
        ]
    }
}
