use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::services::ServeDir;
use url::Url;

use crate::certs::CertHandle;
use crate::config::Config;
use crate::handlers::dispatch::{acme_challenge, plain_dispatch, secure_dispatch};
use crate::proxy::UpstreamClient;
use crate::rules::RouterTable;

/// How the frontend service is materialized: proxied to an upstream, or
/// served straight from the built asset directory.
#[derive(Clone)]
pub enum FrontendService {
    Proxy(Url),
    Static(ServeDir),
}

/// Shared state for the traffic entrypoints.
#[derive(Clone)]
pub struct EdgeState {
    pub table: Arc<RouterTable>,
    pub http: UpstreamClient,
    pub certs: CertHandle,
    pub backend_upstream: Url,
    pub adminer_upstream: Url,
    pub frontend: FrontendService,
    /// Dashboard sub-app, dispatched to for `proxy.<domain>` traffic.
    pub dashboard: Router,
}

impl EdgeState {
    pub fn new(
        cfg: &Config,
        table: Arc<RouterTable>,
        http: UpstreamClient,
        certs: CertHandle,
        dashboard: Router,
    ) -> Self {
        let frontend = match (
            &cfg.services.frontend_upstream,
            &cfg.services.frontend_static_root,
        ) {
            (Some(upstream), _) => FrontendService::Proxy(upstream.clone()),
            (None, Some(root)) => FrontendService::Static(ServeDir::new(root)),
            // validate() guarantees exactly one is configured.
            (None, None) => FrontendService::Static(ServeDir::new(".")),
        };
        Self {
            table,
            http,
            certs,
            backend_upstream: cfg.services.backend_upstream.clone(),
            adminer_upstream: cfg.services.adminer_upstream.clone(),
            frontend,
            dashboard,
        }
    }
}

/// App for the TLS entrypoint: everything goes through table dispatch.
pub fn secure_app(state: EdgeState) -> Router {
    Router::new().fallback(secure_dispatch).with_state(state)
}

/// App for the plaintext entrypoint: challenge tokens are answered, anything
/// else is redirected to https.
pub fn plain_app(state: EdgeState) -> Router {
    Router::new()
        .route("/.well-known/acme-challenge/{token}", get(acme_challenge))
        .fallback(plain_dispatch)
        .with_state(state)
}
