//! TLS listener setup.
//!
//! Certificates and keys are PEM, loaded from [`TlsSource`] when the server
//! starts listening. The acceptor only offers `h2` via ALPN.

use std::io::BufReader;
use std::sync::Arc;

use rustls::crypto::ring;
use rustls::ServerConfig as RustlsConfig;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use crate::config::TlsSource;
use crate::error::ServerError;

/// ALPN identifier for HTTP/2 over TLS.
pub const ALPN_H2: &[u8] = b"h2";

/// Loads `source` and builds an acceptor.
pub async fn load_acceptor(source: &TlsSource) -> Result<TlsAcceptor, ServerError> {
    let (cert_name, key_name) = source.describe();
    let cert_pem = source
        .cert()
        .load()
        .await
        .map_err(|e| ServerError::tls(format!("cannot read certificate {cert_name}: {e}")))?;
    let key_pem = source
        .key()
        .load()
        .await
        .map_err(|e| ServerError::tls(format!("cannot read private key {key_name}: {e}")))?;

    let config = server_config(&cert_pem, &key_pem)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Builds a rustls server configuration from PEM data.
///
/// # Errors
///
/// Returns [`ServerError::Tls`] if no certificate or key is found, or if
/// rustls rejects them.
pub fn server_config(cert_pem: &[u8], key_pem: &[u8]) -> Result<RustlsConfig, ServerError> {
    let certs = parse_certs(cert_pem)?;
    let key = parse_key(key_pem)?;

    let mut config = RustlsConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| ServerError::tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::tls(format!("certificate rejected: {e}")))?;
    config.alpn_protocols = vec![ALPN_H2.to_vec()];
    Ok(config)
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::tls(format!("invalid certificate PEM: {e}")))?;
    if certs.is_empty() {
        return Err(ServerError::tls("no certificate found in PEM data"));
    }
    Ok(certs)
}

fn parse_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, ServerError> {
    rustls_pemfile::private_key(&mut BufReader::new(pem))
        .map_err(|e| ServerError::tls(format!("invalid private key PEM: {e}")))?
        .ok_or_else(|| ServerError::tls("no private key found in PEM data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn self_signed() -> (String, String) {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        (certified.cert.pem(), certified.key_pair.serialize_pem())
    }

    #[test]
    fn test_server_config_offers_h2() {
        let (cert, key) = self_signed();
        let config = server_config(cert.as_bytes(), key.as_bytes()).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"h2".to_vec()]);
    }

    #[test]
    fn test_missing_certificate_rejected() {
        let (_, key) = self_signed();
        let err = server_config(b"", key.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("no certificate"));
    }

    #[test]
    fn test_missing_key_rejected() {
        let (cert, _) = self_signed();
        let err = server_config(cert.as_bytes(), cert.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("no private key"));
    }

    #[tokio::test]
    async fn test_load_acceptor_from_files() {
        let (cert, key) = self_signed();
        let mut cert_file = tempfile::NamedTempFile::new().unwrap();
        let mut key_file = tempfile::NamedTempFile::new().unwrap();
        cert_file.write_all(cert.as_bytes()).unwrap();
        key_file.write_all(key.as_bytes()).unwrap();

        let source = TlsSource::from_paths(cert_file.path(), key_file.path());
        assert!(load_acceptor(&source).await.is_ok());
    }

    #[tokio::test]
    async fn test_load_acceptor_missing_file() {
        let source = TlsSource::from_paths("/nonexistent/cert.pem", "/nonexistent/key.pem");
        let err = load_acceptor(&source).await.err().unwrap();
        assert!(err.to_string().contains("/nonexistent/cert.pem"));
    }
}
