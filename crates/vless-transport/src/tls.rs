//! TLS transport over plain TCP.

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use serde::Deserialize;
use tracing::debug;
use vless_config::TcpConfig;
use vless_core::defaults::{DEFAULT_TLS_ALPN, DEFAULT_TLS_HANDSHAKE_TIMEOUT_SECS};

use crate::error::TransportError;
use crate::plain::PlainConnector;
use crate::{BoxStream, ConnectFuture, TransportConnector, split_host_port};

/// Client-side TLS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientTlsConfig {
    /// TLS SNI hostname. Defaults to the host portion of the server address.
    pub sni: Option<String>,

    /// ALPN protocol list.
    #[serde(default = "default_alpn")]
    pub alpn: Vec<String>,

    /// Skip certificate verification (for testing only).
    #[serde(default)]
    pub skip_verify: bool,

    /// Custom CA certificate path (PEM).
    pub ca: Option<String>,
}

impl Default for ClientTlsConfig {
    fn default() -> Self {
        Self {
            sni: None,
            alpn: default_alpn(),
            skip_verify: false,
            ca: None,
        }
    }
}

fn default_alpn() -> Vec<String> {
    DEFAULT_TLS_ALPN.iter().map(|s| s.to_string()).collect()
}

/// TLS connector: TCP connect, then a TLS handshake bounded by a timeout.
#[derive(Clone)]
pub struct TlsConnector {
    tcp: PlainConnector,
    connector: tokio_rustls::TlsConnector,
    sni: ServerName<'static>,
    handshake_timeout: Duration,
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector")
            .field("sni", &self.sni)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

impl TlsConnector {
    /// Builds a connector for `server` (`host:port`).
    pub fn new(
        tls: &ClientTlsConfig,
        tcp: TcpConfig,
        server: &str,
    ) -> Result<Self, TransportError> {
        let config = build_tls_config(tls)?;
        Ok(Self {
            tcp: PlainConnector::new(tcp),
            connector: tokio_rustls::TlsConnector::from(Arc::new(config)),
            sni: resolve_sni(tls, server)?,
            handshake_timeout: Duration::from_secs(DEFAULT_TLS_HANDSHAKE_TIMEOUT_SECS),
        })
    }
}

impl TransportConnector for TlsConnector {
    fn connect<'a>(&'a self, addr: &'a str) -> ConnectFuture<'a> {
        Box::pin(async move {
            let tcp = self.tcp.connect_tcp(addr).await?;
            debug!(remote = %addr, sni = ?self.sni, "starting TLS handshake");

            let tls = tokio::time::timeout(
                self.handshake_timeout,
                self.connector.connect(self.sni.clone(), tcp),
            )
            .await
            .map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::TimedOut, "TLS handshake timed out")
            })??;

            Ok(Box::new(tls) as BoxStream)
        })
    }
}

/// Builds the rustls client config: custom CA or webpki roots, ALPN, and
/// no verification at all when `skip_verify` is set.
pub fn build_tls_config(tls: &ClientTlsConfig) -> Result<rustls::ClientConfig, TransportError> {
    let builder = rustls::ClientConfig::builder();
    let mut config = if tls.skip_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth()
    } else {
        builder
            .with_root_certificates(load_roots(tls.ca.as_deref())?)
            .with_no_client_auth()
    };
    config.alpn_protocols = tls.alpn.iter().map(|p| p.as_bytes().to_vec()).collect();
    Ok(config)
}

fn load_roots(ca: Option<&str>) -> Result<rustls::RootCertStore, TransportError> {
    let mut roots = rustls::RootCertStore::empty();
    let Some(path) = ca else {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        return Ok(roots);
    };

    let pem = std::fs::read(path)
        .map_err(|e| TransportError::Config(format!("failed to read CA cert {path}: {e}")))?;
    for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
        let cert =
            cert.map_err(|e| TransportError::Config(format!("failed to parse CA cert: {e}")))?;
        roots
            .add(cert)
            .map_err(|e| TransportError::Config(format!("failed to add CA cert: {e}")))?;
    }
    if roots.is_empty() {
        return Err(TransportError::Config(format!("no certificates in {path}")));
    }
    Ok(roots)
}

/// SNI for `server`: the configured name, else the server's host part.
pub fn resolve_sni(
    tls: &ClientTlsConfig,
    server: &str,
) -> Result<ServerName<'static>, TransportError> {
    let host = match tls.sni.as_deref() {
        Some(sni) => sni,
        None => split_host_port(server).map_or(server, |(host, _)| host),
    };
    ServerName::try_from(host.to_string())
        .map_err(|e| TransportError::Config(format!("invalid SNI hostname {host}: {e}")))
}

/// Certificate verifier that accepts any certificate (for skip_verify mode).
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::CryptoProvider::get_default()
            .map(|provider| {
                provider
                    .signature_verification_algorithms
                    .supported_schemes()
            })
            .unwrap_or_default()
    }
}
