//! Per-request dispatch for the two traffic entrypoints.
//!
//! The plaintext entrypoint serves ACME challenges and otherwise redirects
//! everything to the canonical https URL. The TLS entrypoint canonicalizes
//! `www.` hosts, consults the routing table, and hands the request to the
//! selected service.

use axum::{
    Json,
    body::Body,
    extract::{Path, Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::net::SocketAddr;
use tower::ServiceExt;
use url::Url;

use crate::middleware::redirect::{canonical_target, redirect_response};
use crate::proxy::ClientAddr;
use crate::router::{EdgeState, FrontendService};
use crate::rules::RouteTarget;

/// TLS entrypoint fallback: all routed traffic lands here.
pub async fn secure_dispatch(State(state): State<EdgeState>, req: Request) -> Response {
    let host = request_host(&req);
    if host.is_empty() {
        return missing_host();
    }
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    // www canonicalization happens before routing, so the www host never
    // needs its own routes.
    if let Some(target) = canonical_target(true, &host, &path_and_query) {
        return redirect_response(&target);
    }

    let path = req.uri().path().to_string();
    let peer = req.extensions().get::<ClientAddr>().map(|addr| addr.0);

    match state.table.select(&host, &path) {
        Some(RouteTarget::Backend) => {
            let upstream = state.backend_upstream.clone();
            proxy(&state, &upstream, peer, req).await
        }
        Some(RouteTarget::Adminer) => {
            let upstream = state.adminer_upstream.clone();
            proxy(&state, &upstream, peer, req).await
        }
        Some(RouteTarget::Frontend) => match state.frontend.clone() {
            FrontendService::Proxy(upstream) => proxy(&state, &upstream, peer, req).await,
            FrontendService::Static(dir) => match dir.oneshot(req).await {
                Ok(resp) => resp.map(Body::new),
                Err(never) => match never {},
            },
        },
        Some(RouteTarget::Dashboard) => match state.dashboard.clone().oneshot(req).await {
            Ok(resp) => resp.into_response(),
            Err(never) => match never {},
        },
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "no route for host", "host": host})),
        )
            .into_response(),
    }
}

/// Plaintext entrypoint fallback: unconditional redirect to the canonical
/// https URL (the challenge route is registered ahead of this).
pub async fn plain_dispatch(req: Request) -> Response {
    let host = request_host(&req);
    if host.is_empty() {
        return missing_host();
    }
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    match canonical_target(false, &host, &path_and_query) {
        Some(target) => redirect_response(&target),
        None => missing_host(),
    }
}

/// Serve the key authorization for an in-flight HTTP-01 challenge token.
pub async fn acme_challenge(
    State(state): State<EdgeState>,
    Path(token): Path<String>,
) -> Response {
    match state.certs.challenge_response(&token).await {
        Ok(Some(key_auth)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            key_auth,
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "unknown challenge token"})),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn proxy(
    state: &EdgeState,
    upstream: &Url,
    peer: Option<SocketAddr>,
    req: Request,
) -> Response {
    match state.http.forward(upstream, "https", peer, req).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

fn request_host(req: &Request) -> String {
    if let Some(host) = req.headers().get(header::HOST).and_then(|v| v.to_str().ok()) {
        return host.to_string();
    }
    req.uri()
        .authority()
        .map(|a| a.as_str().to_string())
        .unwrap_or_default()
}

fn missing_host() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "missing or invalid Host header"})),
    )
        .into_response()
}
