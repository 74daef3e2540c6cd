//! Self-signed certificate generation for development deployments
//!
//! The tunnel server wants TLS material at startup. When the configured
//! certificate or key file is missing, it falls back to generating a
//! self-signed certificate and persisting both PEM files next to each
//! other, so a bare `revdial-server` run just works. Production setups
//! should point the server at CA-signed material instead.

use rcgen::{CertificateParams, DistinguishedName};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::path::Path;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SelfSignedError {
    #[error("certificate generation failed: {0}")]
    GenerationFailed(String),

    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("failed to persist certificate files: {0}")]
    PersistFailed(#[from] std::io::Error),
}

/// A freshly generated self-signed certificate with its private key.
pub struct SelfSignedCertificate {
    /// Certificate in DER format (binary)
    pub cert_der: CertificateDer<'static>,

    /// Private key in DER format (binary)
    pub key_der: PrivateKeyDer<'static>,

    /// Certificate in PEM format (text)
    pub pem_cert: String,

    /// Private key in PEM format (text)
    pub pem_key: String,
}

impl SelfSignedCertificate {
    /// Save certificate and key to PEM files
    pub fn save_to_files(&self, cert_path: &Path, key_path: &Path) -> std::io::Result<()> {
        std::fs::write(cert_path, &self.pem_cert)?;
        std::fs::write(key_path, &self.pem_key)?;
        Ok(())
    }
}

/// Generate a self-signed server certificate.
///
/// Organization "WT Org", 365-day validity, server-auth EKU, with
/// localhost and loopback SANs so local development connects cleanly.
pub fn generate_self_signed_cert() -> Result<SelfSignedCertificate, SelfSignedError> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(rcgen::DnType::OrganizationName, "WT Org");
    params.distinguished_name = dn;

    params.subject_alt_names = vec![
        rcgen::SanType::DnsName(rcgen::Ia5String::try_from("localhost").unwrap()),
        rcgen::SanType::IpAddress(std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1))),
        rcgen::SanType::IpAddress(std::net::IpAddr::V6(std::net::Ipv6Addr::new(
            0, 0, 0, 0, 0, 0, 0, 1,
        ))),
    ];

    params.key_usages = vec![
        rcgen::KeyUsagePurpose::DigitalSignature,
        rcgen::KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![rcgen::ExtendedKeyUsagePurpose::ServerAuth];

    // Validity: 365 days from now
    let not_before = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap();
    params.not_before = time::OffsetDateTime::from_unix_timestamp(not_before.as_secs() as i64)
        .map_err(|e| SelfSignedError::GenerationFailed(e.to_string()))?;

    let not_after = not_before + std::time::Duration::from_secs(365 * 24 * 60 * 60);
    params.not_after = time::OffsetDateTime::from_unix_timestamp(not_after.as_secs() as i64)
        .map_err(|e| SelfSignedError::GenerationFailed(e.to_string()))?;

    params.serial_number = Some(rcgen::SerialNumber::from(rand::random::<u64>()));

    let key_pair =
        rcgen::KeyPair::generate().map_err(|e| SelfSignedError::KeyGenerationFailed(e.to_string()))?;

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| SelfSignedError::GenerationFailed(e.to_string()))?;

    let cert_pem = cert.pem();
    let key_pem = key_pair.serialize_pem();
    let cert_der = cert.der().to_vec();
    let key_der = key_pair.serialize_der();

    Ok(SelfSignedCertificate {
        cert_der: CertificateDer::from(cert_der),
        key_der: PrivateKeyDer::try_from(key_der)
            .map_err(|e| SelfSignedError::KeyGenerationFailed(format!("{e:?}")))?,
        pem_cert: cert_pem,
        pem_key: key_pem,
    })
}

/// Ensure certificate material exists at the given paths.
///
/// Generates and persists a self-signed pair when either file is missing.
/// Returns `true` when new files were written.
pub fn ensure_certificate(cert_path: &Path, key_path: &Path) -> Result<bool, SelfSignedError> {
    if cert_path.exists() && key_path.exists() {
        return Ok(false);
    }
    let cert = generate_self_signed_cert()?;
    cert.save_to_files(cert_path, key_path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_self_signed_cert() {
        let cert = generate_self_signed_cert().unwrap();

        assert!(!cert.cert_der.is_empty());
        assert!(cert.pem_cert.contains("BEGIN CERTIFICATE"));
        assert!(cert.pem_key.contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn test_cert_can_be_used_with_rustls() {
        let cert = generate_self_signed_cert().unwrap();

        let certs = vec![cert.cert_der];
        let key = cert.key_der;

        let server_config = rustls::ServerConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(certs, key);

        assert!(server_config.is_ok());
    }

    #[test]
    fn test_ensure_certificate_writes_missing_files() {
        let dir = std::env::temp_dir();
        let unique = uuid::Uuid::new_v4();
        let cert_path = dir.join(format!("revdial-test-{unique}.crt"));
        let key_path = dir.join(format!("revdial-test-{unique}.key"));

        let generated = ensure_certificate(&cert_path, &key_path).unwrap();
        assert!(generated);
        assert!(cert_path.exists());
        assert!(key_path.exists());

        // Second call reuses the existing pair.
        let generated = ensure_certificate(&cert_path, &key_path).unwrap();
        assert!(!generated);

        let _ = std::fs::remove_file(&cert_path);
        let _ = std::fs::remove_file(&key_path);
    }
}
