//! TLS utilities for the proxy server.
//!
//! Server side: the [`TlsTerminator`] seam used to decrypt intercepted
//! connections, with a PEM-file implementation. Client side: a no-op
//! certificate verifier for upstreams with self-signed certificates.

use crate::error::ProxyError;
use crate::listener::BoxedIo;
use async_trait::async_trait;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::DigitallySignedStruct;
use std::io;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// Install the ring crypto provider as the process default.
///
/// Harmless when a provider is already installed.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Terminates TLS on an intercepted connection and yields the plaintext stream.
///
/// `target_host` is the CONNECT target for tunneled connections, or `None`
/// for connections accepted directly.
#[async_trait]
pub trait TlsTerminator: Send + Sync + 'static {
    async fn terminate(&self, io: BoxedIo, target_host: Option<&str>) -> io::Result<BoxedIo>;
}

/// Terminates every connection with one certificate loaded from PEM files.
pub struct PemTlsTerminator {
    acceptor: TlsAcceptor,
}

impl PemTlsTerminator {
    pub fn from_pem_files(cert_path: &str, key_path: &str) -> Result<Self, ProxyError> {
        Ok(Self {
            acceptor: create_tls_acceptor(cert_path, key_path)?,
        })
    }
}

#[async_trait]
impl TlsTerminator for PemTlsTerminator {
    async fn terminate(&self, io: BoxedIo, _target_host: Option<&str>) -> io::Result<BoxedIo> {
        let stream = self.acceptor.accept(io).await?;
        Ok(Box::new(stream))
    }
}

/// Create TLS acceptor from certificate and key files.
///
/// The acceptor advertises both `h2` and `http/1.1` so gRPC clients can
/// negotiate HTTP/2 through the interception.
pub fn create_tls_acceptor(cert_path: &str, key_path: &str) -> Result<TlsAcceptor, ProxyError> {
    install_crypto_provider();

    // Load certificate chain
    let cert_file = std::fs::File::open(cert_path).map_err(|e| {
        ProxyError::Tls(format!("Failed to open certificate file '{cert_path}': {e}"))
    })?;
    let mut cert_reader = std::io::BufReader::new(cert_file);
    let certs: Vec<CertificateDer> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|e| ProxyError::Tls(format!("Failed to parse certificate file: {e}")))?;

    if certs.is_empty() {
        return Err(ProxyError::Tls(format!(
            "No certificates found in certificate file: {cert_path}"
        )));
    }

    // Load private key
    let key_file = std::fs::File::open(key_path).map_err(|e| {
        ProxyError::Tls(format!("Failed to open private key file '{key_path}': {e}"))
    })?;
    let mut key_reader = std::io::BufReader::new(key_file);

    // Try reading as PKCS8, RSA, or EC private key
    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| ProxyError::Tls(format!("Failed to parse private key file: {e}")))?
        .ok_or_else(|| ProxyError::Tls(format!("No private key found in key file: {key_path}")))?;

    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ProxyError::Tls(format!("Failed to build TLS configuration: {e}")))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// No-op certificate verifier for development/testing with self-signed certificates.
///
/// # Warning
/// This disables all TLS security checks - use only in development!
#[derive(Debug)]
pub struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::RSA_PSS_SHA256,
        ]
    }
}
