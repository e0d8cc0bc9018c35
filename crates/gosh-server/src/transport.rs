//! Transport wrapping of accepted TCP connections.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::debug;

use gosh_core::error::{Error, Result};

/// Turns an accepted TCP connection into a session transport.
#[async_trait]
pub trait TransportFactory: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn accept(&self, tcp: TcpStream, peer: SocketAddr) -> Result<Self::Stream>;
}

/// TLS server side of the transport.
#[derive(Clone)]
pub struct TlsTransportFactory {
    acceptor: TlsAcceptor,
}

impl TlsTransportFactory {
    /// Load the certificate chain and private key from PEM files.
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let read = |path: &Path| {
            std::fs::read(path).map_err(|e| Error::Key {
                message: format!("cannot read {}: {}", path.display(), e),
            })
        };
        Self::from_pem(&read(cert_path)?, &read(key_path)?)
    }

    /// Build from PEM data.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let certs = load_certs(cert_pem)?;
        let key = load_key(key_pem)?;

        let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(tls_error)?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(tls_error)?;

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(config)),
        })
    }
}

#[async_trait]
impl TransportFactory for TlsTransportFactory {
    type Stream = tokio_rustls::server::TlsStream<TcpStream>;

    async fn accept(&self, tcp: TcpStream, peer: SocketAddr) -> Result<Self::Stream> {
        let stream = self.acceptor.accept(tcp).await.map_err(|e| Error::Transport {
            message: format!("TLS handshake with {} failed: {}", peer, e),
        })?;
        debug!(peer = %peer, "TLS handshake complete");
        Ok(stream)
    }
}

fn load_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = std::io::BufReader::new(pem);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Key {
            message: format!("failed to parse certificate: {}", e),
        })?;

    if certs.is_empty() {
        return Err(Error::Key {
            message: "no certificates found in PEM data".to_string(),
        });
    }
    Ok(certs)
}

fn load_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    let mut reader = std::io::BufReader::new(pem);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| Error::Key {
            message: format!("failed to parse private key: {}", e),
        })?
        .ok_or_else(|| Error::Key {
            message: "no private key found in PEM data".to_string(),
        })
}

fn tls_error(e: tokio_rustls::rustls::Error) -> Error {
    Error::Key {
        message: format!("invalid TLS configuration: {}", e),
    }
}
