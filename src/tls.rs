//! TLS entrypoint: SNI certificate resolution backed by the certificate
//! actor, and the accept loop that feeds handshaken connections into the
//! axum app.
//!
//! Resolution fails closed: a hostname without an installed certificate
//! aborts the handshake instead of falling back to some other cert.

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::ServerConfig;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::debug;

use crate::error::PorticoError;
use crate::proxy::ClientAddr;
use crate::rules::matcher::normalize_host;

/// Hostname → certified key map shared between the certificate actor
/// (writer) and the SNI resolver (reader).
pub struct TlsKeyMap {
    keys: RwLock<HashMap<String, Arc<CertifiedKey>>>,
}

impl fmt::Debug for TlsKeyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("TlsKeyMap").field("hosts", &keys.len()).finish()
    }
}

impl TlsKeyMap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            keys: RwLock::new(HashMap::new()),
        })
    }

    /// Parse a PEM bundle and make it live for `host`. Replaces any
    /// previously installed key.
    pub fn install(&self, host: &str, cert_pem: &str, key_pem: &str) -> Result<(), PorticoError> {
        let certs = rustls_pemfile::certs(&mut cert_pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PorticoError::InvalidPem(format!("{host}: {e}")))?;
        if certs.is_empty() {
            return Err(PorticoError::InvalidPem(format!(
                "{host}: no certificates in PEM bundle"
            )));
        }
        let key = rustls_pemfile::private_key(&mut key_pem.as_bytes())
            .map_err(|e| PorticoError::InvalidPem(format!("{host}: {e}")))?
            .ok_or_else(|| PorticoError::InvalidPem(format!("{host}: no private key in PEM")))?;
        let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)
            .map_err(|e| PorticoError::InvalidPem(format!("{host}: unsupported key: {e}")))?;
        let certified = Arc::new(CertifiedKey::new(certs, signing_key));

        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        keys.insert(normalize_host(host), certified);
        Ok(())
    }

    pub fn contains(&self, host: &str) -> bool {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.contains_key(&normalize_host(host))
    }

    fn get(&self, host: &str) -> Option<Arc<CertifiedKey>> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.get(&normalize_host(host)).cloned()
    }
}

struct SniResolver {
    keys: Arc<TlsKeyMap>,
}

impl fmt::Debug for SniResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SniResolver").finish_non_exhaustive()
    }
}

impl ResolvesServerCert for SniResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        client_hello.server_name().and_then(|sni| self.keys.get(sni))
    }
}

pub fn server_config(keys: Arc<TlsKeyMap>) -> Result<ServerConfig, PorticoError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(SniResolver { keys }));
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

/// Accept loop for the TLS entrypoint. Each connection handshakes, gets the
/// peer address attached as an extension, and is served by the app.
pub async fn serve(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    app: Router,
) -> Result<(), PorticoError> {
    let acceptor = TlsAcceptor::from(config);
    loop {
        let (stream, peer) = listener.accept().await?;
        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(s) => s,
                Err(e) => {
                    // Unknown SNI lands here: no certificate, no handshake.
                    debug!(peer = %peer, "TLS handshake failed: {e}");
                    return;
                }
            };
            let service = hyper::service::service_fn(
                move |mut req: hyper::Request<hyper::body::Incoming>| {
                    req.extensions_mut().insert(ClientAddr(peer));
                    let mut app = app.clone();
                    async move { tower::Service::call(&mut app, req).await }
                },
            );
            if let Err(e) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                .serve_connection_with_upgrades(TokioIo::new(tls_stream), service)
                .await
            {
                debug!(peer = %peer, "connection closed with error: {e}");
            }
        });
    }
}
