// Certificate source reader - retrieve a certificate from a file or a live
// TLS endpoint and extract its identity and validity
//
// The remote probe completes a TLS handshake, takes the leaf certificate the
// peer presented, and closes the connection without speaking any application
// protocol. Certificate trust is deliberately not verified here: a monitor
// has to be able to read expired or self-signed certificates.

use crate::error::ReadError;
use crate::inventory::CertificateSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use x509_parser::prelude::*;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Point-in-time view of a monitored certificate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateSnapshot {
    pub subject: String,
    pub issuer: String,
    /// Expiry instant, normalized to UTC
    pub not_after: DateTime<Utc>,
    pub serial: Option<String>,
}

/// Read the certificate a descriptor points at
///
/// No retries happen at this layer; a transient failure surfaces as a
/// [`ReadError`] and the evaluation for this cycle reports the certificate
/// as unreadable.
pub async fn read_certificate(
    source: &CertificateSource,
) -> Result<CertificateSnapshot, ReadError> {
    match source {
        CertificateSource::LocalFile { path } => read_local(path).await,
        CertificateSource::RemoteHost { host, port } => read_remote(host, *port).await,
    }
}

async fn read_local(path: &Path) -> Result<CertificateSnapshot, ReadError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ReadError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(ReadError::ParseFailure {
                details: format!("failed to read {}: {}", path.display(), e),
            });
        }
    };

    snapshot_from_bytes(&bytes)
}

async fn read_remote(host: &str, port: u16) -> Result<CertificateSnapshot, ReadError> {
    let endpoint = CertificateSource::RemoteHost {
        host: host.to_string(),
        port,
    }
    .to_string();
    let unreachable = |details: String| ReadError::Unreachable {
        endpoint: endpoint.clone(),
        details,
    };

    // Connect with a (host, port) pair so IPv6 literals resolve correctly
    let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port)))
        .await
        .map_err(|_| unreachable(format!("connect timed out after {:?}", CONNECT_TIMEOUT)))?
        .map_err(|e| unreachable(e.to_string()))?;

    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerifier))
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|_| unreachable("invalid server name".to_string()))?;

    let tls_stream = timeout(HANDSHAKE_TIMEOUT, connector.connect(server_name, stream))
        .await
        .map_err(|_| unreachable(format!("handshake timed out after {:?}", HANDSHAKE_TIMEOUT)))?
        .map_err(|e| unreachable(e.to_string()))?;

    let (_io, connection) = tls_stream.into_inner();
    let leaf = connection
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or_else(|| ReadError::ParseFailure {
            details: "server presented no certificate".to_string(),
        })?;

    snapshot_from_bytes(leaf.as_ref())
}

/// Parse a certificate from PEM (first block) or raw DER bytes
fn snapshot_from_bytes(bytes: &[u8]) -> Result<CertificateSnapshot, ReadError> {
    if let Ok((_, pem)) = x509_parser::pem::parse_x509_pem(bytes) {
        let cert = pem.parse_x509().map_err(|e| ReadError::ParseFailure {
            details: format!("{:?}", e),
        })?;
        return snapshot_from_cert(&cert);
    }

    let (_, cert) = X509Certificate::from_der(bytes).map_err(|e| ReadError::ParseFailure {
        details: format!("{:?}", e),
    })?;
    snapshot_from_cert(&cert)
}

fn snapshot_from_cert(cert: &X509Certificate<'_>) -> Result<CertificateSnapshot, ReadError> {
    let not_after = DateTime::<Utc>::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| ReadError::ParseFailure {
            details: "not_after timestamp out of range".to_string(),
        })?;

    Ok(CertificateSnapshot {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        not_after,
        serial: Some(format!("{:x}", cert.serial)),
    })
}

/// Certificate verifier that accepts any peer certificate
///
/// Trust decisions are out of scope for the monitor; it only reads what the
/// peer presents.
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::CertificateSource;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn self_signed_pem(common_name: &str) -> String {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let mut name = DistinguishedName::new();
        name.push(DnType::CommonName, common_name);
        params.distinguished_name = name;
        params.self_signed(&key).unwrap().pem()
    }

    #[tokio::test]
    async fn test_read_local_missing_file() {
        let source = CertificateSource::LocalFile {
            path: PathBuf::from("/nonexistent/cert.pem"),
        };

        let err = read_certificate(&source).await.unwrap_err();
        assert!(matches!(err, ReadError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_read_local_garbage() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"this is not a certificate").unwrap();

        let source = CertificateSource::LocalFile {
            path: file.path().to_path_buf(),
        };

        let err = read_certificate(&source).await.unwrap_err();
        assert!(matches!(err, ReadError::ParseFailure { .. }));
    }

    #[tokio::test]
    async fn test_read_local_pem() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(self_signed_pem("monitor-test").as_bytes())
            .unwrap();

        let source = CertificateSource::LocalFile {
            path: file.path().to_path_buf(),
        };

        let snapshot = read_certificate(&source).await.unwrap();
        assert!(snapshot.subject.contains("monitor-test"));
        // Self-signed: issuer equals subject
        assert_eq!(snapshot.issuer, snapshot.subject);
        assert!(snapshot.not_after > Utc::now());
        assert!(snapshot.serial.is_some());
    }

    #[tokio::test]
    async fn test_read_remote_connection_refused() {
        // Port 1 on loopback is assumed closed
        let source = CertificateSource::RemoteHost {
            host: "127.0.0.1".to_string(),
            port: 1,
        };

        let err = read_certificate(&source).await.unwrap_err();
        assert!(matches!(err, ReadError::Unreachable { .. }));
    }

    #[test]
    fn test_snapshot_from_der() {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let mut name = DistinguishedName::new();
        name.push(DnType::CommonName, "der-test");
        params.distinguished_name = name;
        let cert = params.self_signed(&key).unwrap();

        let snapshot = snapshot_from_bytes(cert.der()).unwrap();
        assert!(snapshot.subject.contains("der-test"));
    }
}
